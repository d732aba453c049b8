//! End-to-end runs of the pipeline stages against synthetic image trees.

use brainmri::components::analyze::AnalyzeImageData;
use brainmri::components::transfer::History;
use brainmri::events::CollectingEventSink;
use brainmri::prelude::*;
use brainmri::testing::{write_image_tree, ImageTreeSpec, RecordingStage};
use brainmri::utils::load_json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn write_documents(root: &Path) -> (PathBuf, PathBuf) {
    let r = root.display();
    let config = format!(
        r"root_dir: {r}/artifacts
info:
  root_dir: {r}/artifacts/info
  data_folder: {r}/images
  image_quality_and_format: {r}/artifacts/info/image_quality_and_format.txt
  image_counts_path: {r}/artifacts/info/image_counts.txt
  image_metadata_path: {r}/artifacts/info/image_metadata.csv
  image_samples_path: {r}/artifacts/info/image_samples.png
  image_stats_results_path: {r}/artifacts/info/image_stats.txt
  plots_path: {r}/artifacts/info/plots
  samples_per_class: 2
prepare_datasets:
  data_dir: {r}/images
  save_dir: {r}/artifacts/prepare_datasets
data_augmentation:
  training_dir: {r}/artifacts/prepare_datasets/train_dataset
  preview_path: {r}/artifacts/base_model/augmentation_preview.png
base_model:
  root_dir: {r}/artifacts/base_model
callbacks:
  root_dir: {r}/artifacts/callbacks
transfer_learning:
  root_dir: {r}/artifacts/training
  train_dir: {r}/artifacts/prepare_datasets/train_dataset
  val_dir: {r}/artifacts/prepare_datasets/val_dataset
  base_model_path: {r}/artifacts/base_model/base_model
  callback_path: {r}/artifacts/callbacks/callbacks.json
"
    );
    let params = "prepare_datasets:
  validation_split: 0.25
  image_size: [32, 32]
  batch_size: 4
  seed: 7
base_model:
  weights: none
  input_shape: [32, 32, 3]
  fine_tune_at: 10
  use_augmentation: true
  backbone: tiny
callbacks:
  patience: 4
  factor: 0.5
  min_lr: 0.00001
transfer_learning:
  epochs: 2
  batch_size: 4
  learning_rate: 0.001
";
    let config_path = root.join("config.yaml");
    let params_path = root.join("params.yaml");
    std::fs::write(&config_path, config).unwrap();
    std::fs::write(&params_path, params).unwrap();
    (config_path, params_path)
}

fn image_tree(root: &Path, yes: usize, no: usize) -> Vec<PathBuf> {
    write_image_tree(
        &root.join("images"),
        &[
            ImageTreeSpec::png("no", no).with_size(40, 36),
            ImageTreeSpec::png("yes", yes).with_size(48, 40),
        ],
    )
    .unwrap()
}

#[test]
fn test_configuration_manager_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (config, params) = write_documents(dir.path());
    ConfigurationManager::new(&config, &params).unwrap();
    ConfigurationManager::new(&config, &params).unwrap();
    assert!(dir.path().join("artifacts/callbacks").is_dir());
}

#[test]
fn test_balance_report_follows_class_counts() {
    let dir = tempfile::tempdir().unwrap();
    let written = image_tree(dir.path(), 10, 10);
    let (config, params) = write_documents(dir.path());
    let manager = ConfigurationManager::new(&config, &params).unwrap();
    let analyze = manager.get_analyze_data_config().unwrap();
    let counts_path = analyze.image_counts_path.clone();

    AnalyzeImageData::new(analyze.clone()).analyze().unwrap();
    let report = std::fs::read_to_string(&counts_path).unwrap();
    assert!(report.contains("well-balanced"), "{report}");

    for path in written.iter().filter(|p| p.parent().unwrap().ends_with("yes")).take(5) {
        std::fs::remove_file(path).unwrap();
    }
    AnalyzeImageData::new(analyze).analyze().unwrap();
    let report = std::fs::read_to_string(&counts_path).unwrap();
    assert!(report.contains("moderate class imbalance"), "{report}");
}

#[tokio::test]
async fn test_stages_after_a_failure_never_run() {
    let dir = tempfile::tempdir().unwrap();
    let (config, params) = write_documents(dir.path());
    let manager = ConfigurationManager::new(&config, &params).unwrap();
    let after = Arc::new(RecordingStage::new("after"));
    let sink = Arc::new(CollectingEventSink::new());

    // Nothing was prepared, so training cannot load its datasets.
    let pipeline = PipelineBuilder::new(PIPELINE_NAME)
        .stage(Arc::new(TransferLearningStage::from_config(&manager).unwrap()))
        .unwrap()
        .stage(after.clone())
        .unwrap()
        .with_event_sink(sink.clone())
        .build()
        .unwrap();

    let err = pipeline.run().await.unwrap_err();
    assert_eq!(err.kind(), "io");
    assert_eq!(after.call_count(), 0);
    assert_eq!(sink.events_of_type("stage.failed").len(), 1);
    assert!(sink.events_of_type("stage.completed").is_empty());
}

#[tokio::test]
async fn test_offline_pipeline_trains_and_writes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    image_tree(dir.path(), 8, 8);
    let (config, params) = write_documents(dir.path());
    let manager = ConfigurationManager::new(&config, &params).unwrap();
    let sink = Arc::new(CollectingEventSink::new());

    let stages: Vec<Arc<dyn Stage>> = vec![
        Arc::new(AnalyzeDataStage::from_config(&manager).unwrap()),
        Arc::new(PrepareDatasetsStage::from_config(&manager).unwrap()),
        Arc::new(BaseModelStage::from_config(&manager).unwrap()),
        Arc::new(CallbacksStage::from_config(&manager).unwrap()),
        Arc::new(TransferLearningStage::from_config(&manager).unwrap()),
    ];
    let summary = PipelineBuilder::new(PIPELINE_NAME)
        .stages(stages)
        .unwrap()
        .with_event_sink(sink.clone())
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.results.len(), 5);
    assert_eq!(sink.events_of_type("stage.completed").len(), 5);

    let artifacts = dir.path().join("artifacts");
    for file in [
        "info/image_metadata.csv",
        "info/image_counts.txt",
        "prepare_datasets/class_names.txt",
        "prepare_datasets/train_dataset/element_spec.json",
        "prepare_datasets/val_dataset/element_spec.json",
        "base_model/base_model.json",
        "base_model/base_model.mpk",
        "callbacks/callbacks.json",
        "callbacks/logs/training_log.csv",
        "training/model.json",
        "training/model.mpk",
        "training/accuracy.svg",
        "training/loss.svg",
    ] {
        assert!(artifacts.join(file).is_file(), "missing {file}");
    }

    let class_names = std::fs::read_to_string(artifacts.join("prepare_datasets/class_names.txt")).unwrap();
    assert_eq!(class_names, "no\nyes");
    let history: History = load_json(&artifacts.join("training/history.json")).unwrap();
    assert!((1..=2).contains(&history.epochs()));
}
