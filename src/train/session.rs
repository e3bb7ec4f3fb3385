use log::{info, warn};
use rand::{rngs::StdRng, SeedableRng};

use crate::checkpoint::record::{CheckpointRecord, LossHistory};
use crate::checkpoint::store::{CheckpointStore, LAST};
use crate::error::{Result, TrainError};
use crate::network::model::Model;
use crate::network::network::Network;
use crate::network::spec::NetworkSpec;
use crate::optim::scheduler::PlateauScheduler;
use crate::optim::sgd::Sgd;
use crate::train::train_config::RunConfiguration;

/// Everything the epoch loop owns for the lifetime of a run: the model and
/// its optimizer/scheduler, the epoch range still to execute, the best test
/// loss so far and the full loss history.
///
/// Built once per process by [`Session::start`], which decides between a
/// fresh run and a resumed one.
pub struct Session<M: Model = Network> {
    pub model: M,
    pub optimizer: Sgd,
    pub scheduler: PlateauScheduler,
    /// First epoch this process will execute.
    pub start_epoch: usize,
    /// Exclusive end of this process's epoch range.
    pub end_epoch: usize,
    pub best_test_loss: f64,
    pub history: LossHistory,
    pub seed: u64,
    store: CheckpointStore,
}

impl Session<Network> {
    /// Fresh or resumed session for the network described by `spec`.
    pub fn start(config: &RunConfiguration, spec: &NetworkSpec, store: CheckpointStore) -> Result<Self> {
        spec.validate().map_err(TrainError::Configuration)?;
        Session::start_with(config, store, |rng| Network::new(spec, rng))
    }
}

impl<M: Model> Session<M> {
    /// `build` creates an untrained model; on resume its weights are then
    /// replaced by the checkpointed ones.
    pub fn start_with<F>(config: &RunConfiguration, store: CheckpointStore, build: F) -> Result<Self>
    where
        F: FnOnce(&mut StdRng) -> M,
    {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        if config.is_first_run {
            Self::fresh(config, store, build(&mut rng))
        } else {
            Self::resume(config, store, build(&mut rng))
        }
    }

    fn fresh(config: &RunConfiguration, store: CheckpointStore, model: M) -> Result<Self> {
        store.clear()?;
        info!(
            "fresh run in {}: {} epochs, lr={}, batch_size={}",
            store.dir().display(),
            config.epochs_requested,
            config.learning_rate,
            config.batch_size,
        );

        Ok(Session {
            model,
            optimizer: Sgd::with_momentum(config.learning_rate, config.momentum),
            scheduler: PlateauScheduler::new(config.scheduler.clone()),
            start_epoch: 0,
            end_epoch: config.epochs_requested,
            best_test_loss: f64::INFINITY,
            history: LossHistory::default(),
            seed: config.seed,
            store,
        })
    }

    fn resume(config: &RunConfiguration, store: CheckpointStore, mut model: M) -> Result<Self> {
        let record = store.read(LAST)?;
        model.load_state(record.model).map_err(|e| TrainError::corrupt(LAST, e))?;

        let optimizer = Sgd::from_state(record.optimizer);
        optimizer.check_buffers(&model.parameters()).map_err(|e| TrainError::corrupt(LAST, e))?;
        record.scheduler.config.validate().map_err(|e| TrainError::corrupt(LAST, e))?;
        if optimizer.learning_rate != config.learning_rate {
            warn!(
                "resuming with checkpointed lr={:e}; configured lr={:e} is ignored",
                optimizer.learning_rate, config.learning_rate
            );
        }
        if optimizer.momentum != config.momentum {
            warn!(
                "resuming with checkpointed momentum={}; configured momentum={} is ignored",
                optimizer.momentum, config.momentum
            );
        }

        if record.scheduler.config != config.scheduler {
            warn!(
                "resuming with checkpointed scheduler settings {:?}; configured {:?} are ignored",
                record.scheduler.config, config.scheduler
            );
        }

        let completed = record.epoch_index + 1;
        let history = reconcile_history(store.read_history()?, completed)?;

        let best = history.best_test_loss();
        if best != record.best_test_loss {
            return Err(TrainError::corrupt(
                LAST,
                format!(
                    "best test loss {} disagrees with loss history minimum {}",
                    record.best_test_loss, best
                ),
            ));
        }

        let start_epoch = completed;
        let end_epoch = start_epoch + config.epochs_requested;
        info!(
            "resuming after epoch {} (best test loss {:.6}); running epochs {}..{}",
            record.epoch_index, record.best_test_loss, start_epoch, end_epoch
        );

        Ok(Session {
            model,
            optimizer,
            scheduler: PlateauScheduler::from_state(record.scheduler),
            start_epoch,
            end_epoch,
            best_test_loss: record.best_test_loss,
            history,
            seed: config.seed,
            store,
        })
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Snapshot of the current state, labelled as the end of `epoch_index`.
    pub fn checkpoint(&self, epoch_index: usize) -> CheckpointRecord {
        CheckpointRecord {
            epoch_index,
            model: self.model.save_state(),
            optimizer: self.optimizer.state(),
            scheduler: self.scheduler.state().clone(),
            best_test_loss: self.best_test_loss,
        }
    }
}

/// Makes the stored history agree with the number of epochs the `last`
/// record says were completed.
///
/// Both series are rewritten before `last` at the end of each epoch, one file
/// after the other, so a process killed in between can leave either series
/// one uncommitted entry ahead. Each series is cut back to `completed` on its
/// own and that epoch runs again. A series with fewer entries than completed
/// epochs can't be explained by an interrupted write.
fn reconcile_history(mut history: LossHistory, completed: usize) -> Result<LossHistory> {
    for (series, len) in [("train", history.train_losses.len()), ("test", history.test_losses.len())] {
        if len < completed {
            return Err(TrainError::corrupt(
                "loss history",
                format!("{len} {series} losses for {completed} completed epochs"),
            ));
        }
        if len > completed {
            warn!(
                "dropping {} {series} loss entries from an epoch that never committed its checkpoint",
                len - completed
            );
        }
    }
    history.truncate(completed);
    Ok(history)
}
