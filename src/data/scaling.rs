use crate::activation::activation::ActivationFunction;

/// Linear map of targets into the output activation's range.
///
/// Fitted on the training split and applied unchanged to the test split, so
/// both share one scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetScaler {
    min: f64,
    max: f64,
    lo: f64,
    hi: f64,
}

impl TargetScaler {
    /// `None` when `output` is unbounded and targets are used as-is.
    pub fn for_activation(output: ActivationFunction, targets: &[f64]) -> Option<TargetScaler> {
        let (lo, hi) = output.output_range()?;
        Some(TargetScaler::fit(targets, lo, hi))
    }

    pub fn fit(targets: &[f64], lo: f64, hi: f64) -> TargetScaler {
        let min = targets.iter().copied().fold(f64::INFINITY, f64::min);
        let max = targets.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        TargetScaler { min, max, lo, hi }
    }

    fn span(&self) -> f64 {
        let span = self.max - self.min;
        if span > 0.0 { span } else { 1.0 }
    }

    /// Values outside the fitted range are clamped into `[lo, hi]`.
    pub fn transform(&self, y: f64) -> f64 {
        let t = self.lo + (y - self.min) / self.span() * (self.hi - self.lo);
        t.clamp(self.lo, self.hi)
    }

    pub fn inverse(&self, t: f64) -> f64 {
        self.min + (t - self.lo) / (self.hi - self.lo) * self.span()
    }

    pub fn transform_all(&self, targets: &mut [f64]) {
        targets.iter_mut().for_each(|y| *y = self.transform(*y));
    }
}
