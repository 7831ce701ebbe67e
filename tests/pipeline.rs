#![cfg(feature = "ndarray")]

use std::fs;
use std::path::Path;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use crop_disease::config::{PathsConfig, RunConfig};
use crop_disease::inference::submission::read_submission;
use crop_disease::pipeline;
use crop_disease::training::LrSchedule;
use image::{Rgb, RgbImage};
use tempfile::TempDir;

type TestBackend = Autodiff<NdArray>;

fn write_png(path: &Path, color: [u8; 3]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_pixel(8, 8, Rgb(color)).save(path).unwrap();
}

fn tiny_run(dir: &TempDir, per_class: usize) -> RunConfig {
    let root = dir.path();
    for i in 0..per_class {
        write_png(&root.join(format!("train/0/red_{i}.png")), [200, 20 + i as u8, 20]);
        write_png(&root.join(format!("train/1/blue_{i}.png")), [20, 20 + i as u8, 200]);
    }
    write_png(&root.join("test/x.png"), [210, 30, 30]);
    write_png(&root.join("test/y.png"), [30, 30, 210]);

    RunConfig {
        num_classes: 2,
        image_size: 16,
        epochs: 2,
        batch_size: 4,
        validation_fraction: 0.34,
        log_pause_ms: 0,
        show_progress: false,
        schedule: LrSchedule::Constant,
        paths: PathsConfig {
            train_data: root.join("train"),
            test_data: root.join("test"),
            weights: root.join("weights"),
            best_models: root.join("best"),
            submit: root.join("submit"),
            logs: root.join("logs"),
        },
        model: crop_disease::config::ModelSettings {
            base_filters: 2,
            dropout: 0.1,
        },
        ..RunConfig::default()
    }
}

#[test]
fn full_run_writes_checkpoints_logs_and_submission() {
    let dir = TempDir::new().unwrap();
    let config = tiny_run(&dir, 6);

    let report = pipeline::run::<TestBackend>(&config, Default::default()).unwrap();

    assert_eq!(report.training.epochs_run, 2);
    assert_eq!(report.training.evaluations, 2);
    assert_eq!(report.predictions, 2);

    let records = read_submission(&report.submission).unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.image_id.as_str()).collect();
    assert_eq!(ids, vec!["x.png", "y.png"]);
    assert!(records.iter().all(|r| r.disease_class < 2));

    assert!(dir.path().join("weights/crop_cnn/0/_checkpoint.json").is_file());
    let log = fs::read_to_string(dir.path().join("logs/log_train.txt")).unwrap();
    assert!(log.contains("** start training here! **"));
}

#[test]
fn leftover_best_checkpoint_is_ignored_without_improvement() {
    let dir = TempDir::new().unwrap();
    // One image per class leaves the validation split empty, so no epoch can improve
    let config = tiny_run(&dir, 1);
    let stale = dir.path().join("best/crop_cnn/0/model_best.json");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "{\"left\": \"over\"}").unwrap();

    let report = pipeline::run::<TestBackend>(&config, Default::default()).unwrap();

    assert!(report.training.history.iter().all(|epoch| !epoch.is_best));
    assert_eq!(report.predictions, 2);
    assert_eq!(fs::read_to_string(&stale).unwrap(), "{\"left\": \"over\"}");
}
