use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::mpsc;

use log::{info, warn};

use crate::error::{Result, TrainError};
use crate::train::epoch_stats::EpochStats;

/// Sink for per-epoch summaries. Side-effecting only; the training loop never
/// reads anything back.
pub trait Reporter {
    fn record(&mut self, stats: &EpochStats);
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn record(&mut self, stats: &EpochStats) {
        (**self).record(stats)
    }
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn record(&mut self, stats: &EpochStats) {
        (**self).record(stats)
    }
}

/// Collects every record, in order.
impl Reporter for Vec<EpochStats> {
    fn record(&mut self, stats: &EpochStats) {
        self.push(stats.clone());
    }
}

/// Streams records to another thread. A dropped receiver is not an error for
/// training; records are simply discarded.
impl Reporter for mpsc::Sender<EpochStats> {
    fn record(&mut self, stats: &EpochStats) {
        let _ = self.send(stats.clone());
    }
}

/// One log line per epoch at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn record(&mut self, s: &EpochStats) {
        info!(
            "Epoch {}/{}: loss={:.6}, val_loss={:.6}, lr={:e}{} ({} ms)",
            s.epoch + 1,
            s.end_epoch,
            s.train_loss,
            s.test_loss,
            s.learning_rate,
            if s.improved { " *best*" } else { "" },
            s.elapsed_ms,
        );
    }
}

/// Appends one row per epoch to a CSV file, for plotting loss against epoch.
pub struct CsvReporter {
    writer: csv::Writer<File>,
}

impl CsvReporter {
    /// With `truncate` the file starts over; otherwise rows are appended and
    /// the header is only written to an empty file.
    pub fn create(path: impl AsRef<Path>, truncate: bool) -> Result<CsvReporter> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(!truncate)
            .truncate(truncate)
            .open(path)
            .map_err(|e| TrainError::persistence("open metrics file", path, e))?;
        let empty = file
            .metadata()
            .map_err(|e| TrainError::persistence("stat metrics file", path, e))?
            .len() == 0;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if empty {
            writer
                .write_record(["epoch", "train_loss", "test_loss", "learning_rate", "improved", "elapsed_ms"])
                .and_then(|_| writer.flush().map_err(csv::Error::from))
                .map_err(|e| TrainError::persistence("write metrics header", path, e.into()))?;
        }
        Ok(CsvReporter { writer })
    }
}

impl Reporter for CsvReporter {
    fn record(&mut self, s: &EpochStats) {
        let row = [
            s.epoch.to_string(),
            s.train_loss.to_string(),
            s.test_loss.to_string(),
            s.learning_rate.to_string(),
            u8::from(s.improved).to_string(),
            s.elapsed_ms.to_string(),
        ];
        let written = self.writer.write_record(&row).and_then(|_| self.writer.flush().map_err(csv::Error::from));
        if let Err(e) = written {
            warn!("could not write metrics row for epoch {}: {e}", s.epoch);
        }
    }
}

/// Forwards each record to every inner reporter, in order.
#[derive(Default)]
pub struct Fanout {
    reporters: Vec<Box<dyn Reporter>>,
}

impl Fanout {
    pub fn new() -> Fanout {
        Fanout::default()
    }

    pub fn with(mut self, reporter: impl Reporter + 'static) -> Fanout {
        self.reporters.push(Box::new(reporter));
        self
    }
}

impl Reporter for Fanout {
    fn record(&mut self, stats: &EpochStats) {
        for r in self.reporters.iter_mut() {
            r.record(stats);
        }
    }
}
