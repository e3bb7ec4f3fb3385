mod common;

use std::fs;

use ferrite_regress::checkpoint::store::{best_epoch_slot, BEST, LAST};
use ferrite_regress::{
    train_loop, Batcher, CheckpointStore, Dataset, EpochStats, LossHistory, PlateauConfig, RunSummary, Session,
    TrainError,
};
use ferrite_regress::data::train_test_split;

use common::{config, small_spec, synthetic};

struct Fixture {
    _tmp: tempfile::TempDir,
    dir: std::path::PathBuf,
    train: Dataset,
    test: Dataset,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("checkpoints");
    let (train, test) = train_test_split(&synthetic(40), 0.25, 3).unwrap();
    Fixture { _tmp: tmp, dir, train, test }
}

fn run(fx: &Fixture, cfg: &ferrite_regress::RunConfiguration) -> (Session, Vec<EpochStats>, RunSummary) {
    let spec = small_spec(fx.train.feature_dimension);
    let mut session = Session::start(cfg, &spec, CheckpointStore::new(&fx.dir)).unwrap();
    let mut stats = Vec::new();
    let summary = train_loop(
        &mut session,
        &Batcher::new(&fx.train, cfg.batch_size),
        &Batcher::new(&fx.test, cfg.batch_size),
        &mut stats,
    )
    .unwrap();
    (session, stats, summary)
}

fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v < values[best] {
            best = i;
        }
    }
    best
}

#[test]
fn fresh_run_of_three_single_batch_epochs() {
    let fx = fixture();
    let (session, stats, summary) = run(&fx, &config(3, 1000));

    let store = CheckpointStore::new(&fx.dir);
    let history = store.read_history().unwrap();
    assert_eq!(history.train_losses.len(), 3);
    assert_eq!(history.test_losses.len(), 3);
    assert_eq!(history, session.history);

    assert_eq!(store.read(LAST).unwrap().epoch_index, 2);
    let best = store.read(BEST).unwrap();
    assert_eq!(best.epoch_index, argmin(&history.test_losses));
    assert_eq!(best.best_test_loss, history.best_test_loss());

    assert_eq!(stats.iter().map(|s| s.epoch).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(summary.last_epoch, Some(2));
    assert_eq!(summary.epochs_run, 3);
}

#[test]
fn resume_continues_numbering_and_keeps_history() {
    let fx = fixture();
    let (_, _, _) = run(&fx, &config(3, 8));
    let before = CheckpointStore::new(&fx.dir).read_history().unwrap();

    let resume_cfg = config(2, 8).resuming();
    let spec = small_spec(fx.train.feature_dimension);
    let session = Session::start(&resume_cfg, &spec, CheckpointStore::new(&fx.dir)).unwrap();
    assert_eq!((session.start_epoch, session.end_epoch), (3, 5));
    drop(session);

    let (session, stats, _) = run(&fx, &resume_cfg);
    assert_eq!(stats.iter().map(|s| s.epoch).collect::<Vec<_>>(), vec![3, 4]);

    let after = CheckpointStore::new(&fx.dir).read_history().unwrap();
    assert_eq!(after.len(), 5);
    assert_eq!(after.test_losses.len(), 5);
    assert_eq!(&after.train_losses[..3], &before.train_losses[..]);
    assert_eq!(&after.test_losses[..3], &before.test_losses[..]);
    assert_eq!(CheckpointStore::new(&fx.dir).read(LAST).unwrap().epoch_index, 4);
    assert_eq!(session.best_test_loss, after.best_test_loss());
}

#[test]
fn resumed_run_replays_an_uninterrupted_one() {
    let mut cfg = config(6, 8);
    // Demand large relative improvements so the learning rate actually drops.
    cfg.scheduler = PlateauConfig { patience: 0, threshold: 0.9, ..PlateauConfig::default() };

    let straight = fixture();
    let (straight_session, straight_stats, _) = run(&straight, &cfg);

    let split = fixture();
    let mut first = cfg.clone();
    first.epochs_requested = 3;
    let (_, mut split_stats, _) = run(&split, &first);
    let mut second = cfg.clone().resuming();
    second.epochs_requested = 3;
    let (split_session, more_stats, _) = run(&split, &second);
    split_stats.extend(more_stats);

    let lrs = |s: &[EpochStats]| s.iter().map(|e| e.learning_rate).collect::<Vec<_>>();
    assert_eq!(lrs(&straight_stats), lrs(&split_stats));
    assert!(lrs(&straight_stats)[5] < cfg.learning_rate);

    assert_eq!(straight_session.history, split_session.history);
    assert_eq!(straight_session.scheduler, split_session.scheduler);
    assert_eq!(straight_session.optimizer.state(), split_session.optimizer.state());
    assert_eq!(
        CheckpointStore::new(&straight.dir).read(LAST).unwrap(),
        CheckpointStore::new(&split.dir).read(LAST).unwrap()
    );
}

#[test]
fn best_is_archived_only_on_strict_improvement() {
    let fx = fixture();
    let (_, stats, _) = run(&fx, &config(8, 8));
    let store = CheckpointStore::new(&fx.dir);
    let history = store.read_history().unwrap();

    let mut running = f64::INFINITY;
    for (epoch, &loss) in history.test_losses.iter().enumerate() {
        let improved = loss < running;
        running = running.min(loss);
        assert_eq!(store.exists(&best_epoch_slot(epoch)), improved, "epoch {epoch}");
        assert_eq!(stats[epoch].improved, improved);
    }
    assert_eq!(store.read(BEST).unwrap().best_test_loss, running);
}

#[test]
fn tied_test_loss_does_not_replace_best() {
    // Training is deterministic, so a second fixture tells us exactly what
    // epoch 1's test loss will be.
    let reference = fixture();
    let (_, reference_stats, _) = run(&reference, &config(2, 8));
    let epoch1_loss = reference_stats[1].test_loss;

    let fx = fixture();
    let (mut session, _, _) = run(&fx, &config(1, 8));
    let best_before = CheckpointStore::new(&fx.dir).read(BEST).unwrap();

    session.best_test_loss = epoch1_loss;
    session.start_epoch = 1;
    session.end_epoch = 2;
    let mut stats: Vec<EpochStats> = Vec::new();
    train_loop(
        &mut session,
        &Batcher::new(&fx.train, 8),
        &Batcher::new(&fx.test, 8),
        &mut stats,
    )
    .unwrap();
    assert_eq!(stats[0].test_loss, epoch1_loss);
    assert!(!stats[0].improved);
    assert!(!CheckpointStore::new(&fx.dir).exists(&best_epoch_slot(1)));
    assert_eq!(CheckpointStore::new(&fx.dir).read(BEST).unwrap(), best_before);
}

#[test]
fn fresh_run_wipes_previous_checkpoints() {
    let fx = fixture();
    run(&fx, &config(2, 8));
    let spec = small_spec(fx.train.feature_dimension);
    let _session = Session::start(&config(2, 8), &spec, CheckpointStore::new(&fx.dir)).unwrap();

    let store = CheckpointStore::new(&fx.dir);
    for slot in [LAST, BEST, best_epoch_slot(0).as_str()] {
        assert!(matches!(store.read(slot), Err(TrainError::CheckpointMissing { .. })), "{slot}");
    }
    assert!(matches!(store.read_history(), Err(TrainError::CheckpointMissing { .. })));
}

#[test]
fn resume_without_checkpoint_is_refused() {
    let fx = fixture();
    let spec = small_spec(fx.train.feature_dimension);
    let err = Session::start(&config(2, 8).resuming(), &spec, CheckpointStore::new(&fx.dir)).err().unwrap();
    assert!(matches!(err, TrainError::CheckpointMissing { ref name } if name == LAST));
}

#[test]
fn invalid_configuration_leaves_store_untouched() {
    let fx = fixture();
    run(&fx, &config(1, 8));
    let spec = small_spec(fx.train.feature_dimension);
    let err = Session::start(&config(0, 8), &spec, CheckpointStore::new(&fx.dir)).err().unwrap();
    assert!(matches!(err, TrainError::Configuration(_)));
    assert!(CheckpointStore::new(&fx.dir).exists(LAST));
}

#[test]
fn uncommitted_history_entry_is_discarded_on_resume() {
    let fx = fixture();
    run(&fx, &config(2, 8));
    let store = CheckpointStore::new(&fx.dir);
    let mut history = store.read_history().unwrap();
    history.push(9.0, 9.0);
    store.write_history(&history).unwrap();

    let (session, stats, _) = run(&fx, &config(1, 8).resuming());
    assert_eq!(stats[0].epoch, 2);
    assert_eq!(session.history.len(), 3);
    assert_ne!(session.history.test_losses[2], 9.0);
}

#[test]
fn kill_between_history_files_is_recoverable() {
    let fx = fixture();
    run(&fx, &config(2, 8));
    let store = CheckpointStore::new(&fx.dir);
    let committed = store.read_history().unwrap();

    // Only the train series got the third epoch's entry.
    let mut train = committed.train_losses.clone();
    train.push(9.0);
    fs::write(fx.dir.join("train_loss.json"), serde_json::to_vec(&train).unwrap()).unwrap();

    let (session, stats, _) = run(&fx, &config(1, 8).resuming());
    assert_eq!(stats[0].epoch, 2);
    assert_eq!(session.history.train_losses.len(), 3);
    assert_eq!(session.history.test_losses.len(), 3);
    assert_eq!(session.history.train_losses[..2], committed.train_losses[..]);
    assert_ne!(session.history.train_losses[2], 9.0);
    assert_eq!(store.read_history().unwrap(), session.history);
}

fn edit_last(fx: &Fixture, edit: impl FnOnce(&mut serde_json::Value)) {
    let path = fx.dir.join("last.ckpt.json");
    let mut record: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    edit(&mut record);
    fs::write(&path, serde_json::to_vec(&record).unwrap()).unwrap();
}

fn resume_error(fx: &Fixture) -> TrainError {
    let spec = small_spec(fx.train.feature_dimension);
    Session::start(&config(1, 8).resuming(), &spec, CheckpointStore::new(&fx.dir)).err().unwrap()
}

#[test]
fn missing_momentum_buffer_is_corrupt_at_startup() {
    let fx = fixture();
    run(&fx, &config(1, 8));
    edit_last(&fx, |r| {
        r["optimizer"]["velocities"].as_array_mut().unwrap().pop();
    });
    match resume_error(&fx) {
        TrainError::CheckpointCorrupt { name, .. } => assert_eq!(name, LAST),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn misshapen_momentum_buffer_is_corrupt_at_startup() {
    let fx = fixture();
    run(&fx, &config(1, 8));
    edit_last(&fx, |r| {
        let velocities = r["optimizer"]["velocities"].as_array_mut().unwrap();
        velocities.swap(0, 1);
    });
    assert!(matches!(resume_error(&fx), TrainError::CheckpointCorrupt { .. }));
}

#[test]
fn invalid_stored_scheduler_settings_are_corrupt() {
    let fx = fixture();
    run(&fx, &config(1, 8));
    edit_last(&fx, |r| r["scheduler"]["config"]["factor"] = serde_json::json!(5.0));
    assert!(matches!(resume_error(&fx), TrainError::CheckpointCorrupt { .. }));
}

#[test]
fn resume_keeps_checkpointed_scheduler_settings() {
    let fx = fixture();
    run(&fx, &config(1, 8));
    let mut cfg = config(1, 8).resuming();
    cfg.scheduler.patience = 3;
    let spec = small_spec(fx.train.feature_dimension);
    let session = Session::start(&cfg, &spec, CheckpointStore::new(&fx.dir)).unwrap();
    assert_eq!(session.scheduler.state().config, PlateauConfig::default());
}

#[test]
fn short_history_is_corrupt() {
    let fx = fixture();
    run(&fx, &config(2, 8));
    let store = CheckpointStore::new(&fx.dir);
    let mut history = store.read_history().unwrap();
    history.truncate(1);
    store.write_history(&history).unwrap();

    let spec = small_spec(fx.train.feature_dimension);
    let err = Session::start(&config(1, 8).resuming(), &spec, store).err().unwrap();
    assert!(matches!(err, TrainError::CheckpointCorrupt { .. }));
}

#[test]
fn checkpoint_from_another_architecture_is_corrupt() {
    let fx = fixture();
    run(&fx, &config(1, 8));
    let mut other = small_spec(fx.train.feature_dimension);
    other.layers[0].size = 9;
    other.layers[1].input_size = 9;
    let err = Session::start(&config(1, 8).resuming(), &other, CheckpointStore::new(&fx.dir)).err().unwrap();
    assert!(matches!(err, TrainError::CheckpointCorrupt { .. }));
}

#[test]
fn unreadable_last_record_is_corrupt() {
    let fx = fixture();
    run(&fx, &config(1, 8));
    fs::write(fx.dir.join("last.ckpt.json"), b"{\"epoch_index\": 0}").unwrap();
    let spec = small_spec(fx.train.feature_dimension);
    let err = Session::start(&config(1, 8).resuming(), &spec, CheckpointStore::new(&fx.dir)).err().unwrap();
    assert!(matches!(err, TrainError::CheckpointCorrupt { .. }));
}

#[test]
fn persistence_failure_stops_before_reporting() {
    let fx = fixture();
    let cfg = config(3, 8);
    let spec = small_spec(fx.train.feature_dimension);
    let mut session = Session::start(&cfg, &spec, CheckpointStore::new(&fx.dir)).unwrap();

    // Replace the checkpoint directory with a plain file.
    fs::remove_dir_all(&fx.dir).unwrap();
    fs::write(&fx.dir, b"not a directory").unwrap();

    let mut stats: Vec<EpochStats> = Vec::new();
    let err = train_loop(
        &mut session,
        &Batcher::new(&fx.train, 8),
        &Batcher::new(&fx.test, 8),
        &mut stats,
    )
    .unwrap_err();
    assert!(matches!(err, TrainError::Persistence { epoch: Some(0), .. }), "{err}");
    assert!(stats.is_empty());
}

#[test]
fn diverging_batch_aborts_the_run() {
    let fx = fixture();
    let mut train = fx.train.clone();
    train.targets[0] = 1e200;
    let cfg = config(2, 1000);
    let spec = small_spec(train.feature_dimension);
    let mut session = Session::start(&cfg, &spec, CheckpointStore::new(&fx.dir)).unwrap();

    let mut stats: Vec<EpochStats> = Vec::new();
    let err = train_loop(&mut session, &Batcher::new(&train, 1000), &Batcher::new(&fx.test, 1000), &mut stats)
        .unwrap_err();
    assert!(matches!(err, TrainError::BatchComputation { epoch: 0, batch: 0, .. }), "{err}");
    assert!(!CheckpointStore::new(&fx.dir).exists(LAST));
    assert!(stats.is_empty());
}

#[test]
fn feature_width_mismatch_is_a_batch_error() {
    let fx = fixture();
    let cfg = config(1, 8);
    let spec = small_spec(fx.train.feature_dimension + 1);
    let mut session = Session::start(&cfg, &spec, CheckpointStore::new(&fx.dir)).unwrap();
    let err = train_loop(
        &mut session,
        &Batcher::new(&fx.train, 8),
        &Batcher::new(&fx.test, 8),
        &mut Vec::<EpochStats>::new(),
    )
    .unwrap_err();
    assert!(matches!(err, TrainError::BatchComputation { epoch: 0, .. }));
}

#[test]
fn history_grows_by_one_per_epoch_across_many_resumes() {
    let fx = fixture();
    run(&fx, &config(1, 8));
    for extra in [2, 1, 3] {
        run(&fx, &config(extra, 8).resuming());
    }
    let history: LossHistory = CheckpointStore::new(&fx.dir).read_history().unwrap();
    assert_eq!(history.len(), 7);
    assert_eq!(CheckpointStore::new(&fx.dir).read(LAST).unwrap().epoch_index, 6);
}
