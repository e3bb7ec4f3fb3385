use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;
use serde::{de::DeserializeOwned, Serialize};

use crate::checkpoint::record::{CheckpointRecord, LossHistory};
use crate::error::{Result, TrainError};

/// Slot overwritten at the end of every epoch.
pub const LAST: &str = "last";
/// Slot overwritten whenever the test loss strictly improves.
pub const BEST: &str = "best";

const TRAIN_HISTORY: &str = "train_loss";
const TEST_HISTORY: &str = "test_loss";

/// Per-improvement archive name for the best record of `epoch`.
pub fn best_epoch_slot(epoch: usize) -> String {
    format!("best_epoch_{epoch}")
}

/// Directory-backed store of named checkpoint records and the two loss
/// history series.
///
/// Layout:
/// ```text
/// <dir>/last.ckpt.json
/// <dir>/best.ckpt.json
/// <dir>/best_epoch_<n>.ckpt.json
/// <dir>/train_loss.json
/// <dir>/test_loss.json
/// ```
///
/// Every write goes to a temporary sibling, is synced, then renamed over the
/// target, so a reader sees either the previous content or the new content.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> CheckpointStore {
        CheckpointStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deletes every record and history, leaving an empty directory.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(TrainError::persistence("clear", &self.dir, e)),
        }
        fs::create_dir_all(&self.dir)
            .map_err(|e| TrainError::persistence("create checkpoint dir", &self.dir, e))?;
        debug!("cleared checkpoint directory {}", self.dir.display());
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.record_path(name).is_file()
    }

    pub fn write(&self, name: &str, record: &CheckpointRecord) -> Result<()> {
        check_name(name)?;
        self.write_atomic(&self.record_path(name), record)?;
        debug!("wrote checkpoint '{name}' (epoch {})", record.epoch_index);
        Ok(())
    }

    pub fn read(&self, name: &str) -> Result<CheckpointRecord> {
        check_name(name)?;
        self.read_json(name, &self.record_path(name))
    }

    /// Rewrites both history slots with the full series.
    pub fn write_history(&self, history: &LossHistory) -> Result<()> {
        self.write_atomic(&self.history_path(TRAIN_HISTORY), &history.train_losses)?;
        self.write_atomic(&self.history_path(TEST_HISTORY), &history.test_losses)
    }

    pub fn read_history(&self) -> Result<LossHistory> {
        Ok(LossHistory {
            train_losses: self.read_json(TRAIN_HISTORY, &self.history_path(TRAIN_HISTORY))?,
            test_losses: self.read_json(TEST_HISTORY, &self.history_path(TEST_HISTORY))?,
        })
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.ckpt.json"))
    }

    fn history_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{slot}.json"))
    }

    fn write_atomic<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let tmp = self.dir.join(format!(".{file_name}.tmp"));

        let written = (|| -> io::Result<()> {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            writer.flush()?;
            writer.get_ref().sync_all()
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(TrainError::persistence("write", &tmp, e));
        }

        fs::rename(&tmp, path).map_err(|e| TrainError::persistence("rename", path, e))?;
        sync_dir(&self.dir).map_err(|e| TrainError::persistence("sync", &self.dir, e))
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str, path: &Path) -> Result<T> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TrainError::CheckpointMissing { name: name.to_string() });
            }
            Err(e) => return Err(TrainError::persistence("read", path, e)),
        };
        serde_json::from_reader(BufReader::new(file)).map_err(|e| TrainError::corrupt(name, e))
    }
}

fn check_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(TrainError::Configuration(format!("invalid checkpoint slot name '{name}'")))
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
