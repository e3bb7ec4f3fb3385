use std::time::Instant;

use log::{debug, info};
use rand::{rngs::StdRng, SeedableRng};

use crate::checkpoint::store::{best_epoch_slot, BEST, LAST};
use crate::data::batcher::Batcher;
use crate::error::{Result, TrainError};
use crate::loss::mse::MseLoss;
use crate::network::model::Model;
use crate::optim::sgd::Sgd;
use crate::train::epoch_stats::EpochStats;
use crate::train::report::Reporter;
use crate::train::session::Session;

/// What a `train_loop` call accomplished.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub epochs_run: usize,
    /// Index of the last epoch committed to the checkpoint store.
    pub last_epoch: Option<usize>,
    pub best_test_loss: f64,
    pub learning_rate: f64,
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Runs epochs `session.start_epoch..session.end_epoch`, one at a time.
///
/// Each epoch trains over the shuffled `train` batches, feeds the mean train
/// loss to the plateau scheduler, evaluates over the `test` batches, then
/// persists in this order:
/// 1. both loss histories (full rewrite),
/// 2. `best` and `best_epoch_<n>` when the test loss strictly improved,
/// 3. `last`, which commits the epoch.
///
/// Only after that is the epoch reported and the next one started. Any batch
/// or persistence failure stops the run immediately.
pub fn train_loop<M: Model, R: Reporter>(
    session: &mut Session<M>,
    train: &Batcher<'_>,
    test: &Batcher<'_>,
    reporter: &mut R,
) -> Result<RunSummary> {
    let mut last_epoch = None;

    for epoch in session.start_epoch..session.end_epoch {
        let t_start = Instant::now();
        let mut rng = epoch_rng(session.seed, epoch);

        // ── Training pass ─────────────────────────────────────────────────
        let train_loss = run_one_epoch(&mut session.model, &mut session.optimizer, train, &mut rng, epoch)?;
        if let Some(lr) = session.scheduler.step(train_loss, &mut session.optimizer) {
            info!("epoch {}: plateau reached, learning rate reduced to {lr:e}", epoch + 1);
        }

        // ── Evaluation pass ───────────────────────────────────────────────
        let test_loss = compute_eval_loss(&mut session.model, test, &mut rng, epoch)?;

        // ── Persist ───────────────────────────────────────────────────────
        session.history.push(train_loss, test_loss);
        session.store().write_history(&session.history).map_err(|e| e.at_epoch(epoch))?;

        let improved = test_loss < session.best_test_loss;
        if improved {
            session.best_test_loss = test_loss;
        }
        let record = session.checkpoint(epoch);
        if improved {
            session.store().write(BEST, &record).map_err(|e| e.at_epoch(epoch))?;
            session.store().write(&best_epoch_slot(epoch), &record).map_err(|e| e.at_epoch(epoch))?;
            debug!("epoch {}: new best test loss {test_loss:.6}", epoch + 1);
        }
        session.store().write(LAST, &record).map_err(|e| e.at_epoch(epoch))?;
        last_epoch = Some(epoch);

        // ── Report ────────────────────────────────────────────────────────
        reporter.record(&EpochStats {
            epoch,
            end_epoch: session.end_epoch,
            train_loss,
            test_loss,
            learning_rate: session.optimizer.learning_rate,
            improved,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        });
    }

    Ok(RunSummary {
        epochs_run: session.end_epoch - session.start_epoch,
        last_epoch,
        best_test_loss: session.best_test_loss,
        learning_rate: session.optimizer.learning_rate,
    })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Shuffling and dropout randomness for `epoch`, derived only from the run
/// seed and the epoch index so a resumed run replays it exactly.
fn epoch_rng(seed: u64, epoch: usize) -> StdRng {
    StdRng::seed_from_u64(seed ^ (epoch as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn batch_error(epoch: usize, batch: usize, reason: impl ToString) -> TrainError {
    TrainError::BatchComputation { epoch, batch, reason: reason.to_string() }
}

/// One full pass of mini-batch SGD over the training data.
/// Returns the mean of the per-batch losses.
fn run_one_epoch<M: Model>(
    model: &mut M,
    optimizer: &mut Sgd,
    batches: &Batcher<'_>,
    rng: &mut StdRng,
    epoch: usize,
) -> Result<f64> {
    model.train_mode();
    let mut losses = Vec::with_capacity(batches.num_batches());

    for (b, batch) in batches.shuffled(rng).enumerate() {
        model.zero_grad();

        let predicted = model.forward(&batch.features, rng).map_err(|e| batch_error(epoch, b, e))?;
        MseLoss::check_shapes(&predicted, &batch.targets).map_err(|e| batch_error(epoch, b, e))?;

        let loss = MseLoss::loss(&predicted, &batch.targets);
        if !loss.is_finite() {
            return Err(batch_error(epoch, b, format!("training loss diverged ({loss})")));
        }

        let grad = MseLoss::derivative(&predicted, &batch.targets);
        model.backward(&grad).map_err(|e| batch_error(epoch, b, e))?;
        optimizer.step(model.parameters()).map_err(|e| batch_error(epoch, b, e))?;

        losses.push(loss);
    }

    mean(&losses).ok_or_else(|| batch_error(epoch, 0, "no training batches"))
}

/// Mean per-batch loss over the evaluation data, in eval mode.
fn compute_eval_loss<M: Model>(
    model: &mut M,
    batches: &Batcher<'_>,
    rng: &mut StdRng,
    epoch: usize,
) -> Result<f64> {
    model.eval_mode();
    let mut losses = Vec::with_capacity(batches.num_batches());

    for (b, batch) in batches.ordered().enumerate() {
        let predicted = model.forward(&batch.features, rng).map_err(|e| batch_error(epoch, b, e))?;
        MseLoss::check_shapes(&predicted, &batch.targets).map_err(|e| batch_error(epoch, b, e))?;

        let loss = MseLoss::loss(&predicted, &batch.targets);
        if !loss.is_finite() {
            return Err(batch_error(epoch, b, format!("evaluation loss diverged ({loss})")));
        }
        losses.push(loss);
    }

    mean(&losses).ok_or_else(|| batch_error(epoch, 0, "no evaluation batches"))
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
