mod common;

use std::fs;

use common::{Item, ScriptedLearner};
use crop_disease::dataset::MemorySource;
use crop_disease::inference::{submission_path, write_submission, InferenceRunner};
use crop_disease::training::{Checkpoint, CheckpointStore, ValidationSummary};
use crop_disease::CropError;
use tempfile::TempDir;

fn test_items() -> Vec<Item> {
    [("a.jpg", 10), ("b.jpg", 50), ("c.jpg", 44)]
        .into_iter()
        .map(|(id, label)| Item {
            id: id.to_string(),
            label,
        })
        .collect()
}

fn store_with_best(dir: &TempDir) -> (CheckpointStore, Checkpoint) {
    let store = CheckpointStore::new(dir.path().join("weights"), dir.path().join("best"), "mock");
    let checkpoint = Checkpoint::new(
        4,
        "mock",
        vec![7, 7, 7],
        vec![1],
        0.9,
        0,
        ValidationSummary {
            loss: 0.3,
            top1: 0.9,
            top2: 0.95,
        },
    );
    store.save(&checkpoint, true).unwrap();
    (store, checkpoint)
}

#[test]
fn predictions_are_remapped_in_input_order() {
    let dir = TempDir::new().unwrap();
    let (store, checkpoint) = store_with_best(&dir);
    let mut learner = ScriptedLearner::default();
    let mut source = MemorySource::new(test_items(), 1, None).unwrap();

    let records = InferenceRunner::new(store, 0).run(&mut learner, &mut source).unwrap();

    let pairs: Vec<(&str, usize)> = records
        .iter()
        .map(|r| (r.image_id.as_str(), r.disease_class))
        .collect();
    assert_eq!(pairs, vec![("a.jpg", 10), ("b.jpg", 52), ("c.jpg", 46)]);

    assert_eq!(learner.loaded_state, Some(checkpoint.state_dict));
    assert_eq!(*learner.predictions.borrow(), vec!["a.jpg", "b.jpg", "c.jpg"]);

    let path = submission_path(&dir.path().join("submit"), "baseline");
    write_submission(&path, &records).unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        r#"[{"image_id":"a.jpg","disease_class":10},{"image_id":"b.jpg","disease_class":52},{"image_id":"c.jpg","disease_class":46}]"#
    );
}

#[test]
fn batch_size_does_not_change_the_report() {
    let dir = TempDir::new().unwrap();
    let (store, _) = store_with_best(&dir);
    let runner = InferenceRunner::new(store, 0);

    let mut single = MemorySource::new(test_items(), 1, None).unwrap();
    let mut paired = MemorySource::new(test_items(), 2, None).unwrap();

    let a = runner.run(&mut ScriptedLearner::default(), &mut single).unwrap();
    let b = runner.run(&mut ScriptedLearner::default(), &mut paired).unwrap();
    assert_eq!(a, b);
}

#[test]
fn probabilities_are_normalized() {
    let dir = TempDir::new().unwrap();
    let (store, _) = store_with_best(&dir);
    let learner = ScriptedLearner::default();
    let mut source = MemorySource::new(test_items(), 3, None).unwrap();

    let predictions = InferenceRunner::new(store, 0).predict(&learner, &mut source).unwrap();

    assert_eq!(predictions.len(), 3);
    for record in &predictions {
        let total: f32 = record.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }
    assert_eq!(predictions[1].predicted_class(), Some(50));
}

#[test]
fn missing_best_checkpoint_is_reported() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::new(dir.path().join("weights"), dir.path().join("best"), "mock");
    let mut source = MemorySource::new(test_items(), 1, None).unwrap();

    let err = InferenceRunner::new(store, 0)
        .run(&mut ScriptedLearner::default(), &mut source)
        .unwrap_err();
    assert!(matches!(err, CropError::CheckpointNotFound(_)));
}
