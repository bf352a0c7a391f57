use llm_bench_cli::batch::{load_tasks, plan_reruns, run_jobs};
use llm_bench_cli::TaskLoader;
use llm_bench_client::mock::MockInferenceClient;
use llm_bench_core::{ExperimentConfig, ExperimentRepository, RetrySettings, TaskDefinition};
use llm_bench_storage::FileResultStore;
use llm_bench_workflow::{CancellationToken, ExperimentRunner, TaskRegistry};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), contents).unwrap();
}

fn config(model: &str) -> ExperimentConfig {
    ExperimentConfig::builder(model)
        .retry(RetrySettings {
            max_retries: 0,
            ..Default::default()
        })
        .build()
        .unwrap()
}

/// Two good tasks, one with unparseable input.
fn tasks_root() -> TempDir {
    let root = TempDir::new().unwrap();
    let good = root.path().join("labels");
    write(&good, "input.jsonl", "{\"id\": 1}\n{\"id\": 2}\n");
    write(&good, "ground_truth.json", "[\"yes\", \"no\"]");

    let plain = root.path().join("plain");
    write(&plain, "input.json", "[{\"id\": 1}]");

    let broken = root.path().join("broken");
    write(&broken, "input.json", "{not json");
    root
}

#[test]
fn test_bad_task_is_skipped_not_fatal() {
    let root = tasks_root();
    let loader = TaskLoader::new(root.path(), TaskRegistry::new());

    let names = loader.list().unwrap();
    let (tasks, failures) = load_tasks(&loader, &names);

    let loaded: Vec<&str> = tasks.iter().map(|t| t.name()).collect();
    assert_eq!(loaded, vec!["labels", "plain"]);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].task, "broken");
    assert!(failures[0].error.contains("Failed to parse"));
}

#[tokio::test]
async fn test_summary_spans_every_task() {
    let root = tasks_root();
    let loader = TaskLoader::new(root.path(), TaskRegistry::new());
    let (tasks, failures) = load_tasks(&loader, &loader.list().unwrap());

    let runner = ExperimentRunner::new(Arc::new(MockInferenceClient::always("yes")));
    let jobs: Vec<(&TaskDefinition, ExperimentConfig)> =
        tasks.iter().map(|task| (task, config("m"))).collect();
    let mut report = run_jobs(&runner, &jobs, None, &CancellationToken::new()).await;
    report.failures.extend(failures);

    let summary = report.summary();
    assert_eq!(summary.tasks_completed, 2);
    assert_eq!(summary.tasks_incomplete, 0);
    assert_eq!(summary.tasks_failed, 1);
    assert_eq!(summary.total_samples, 3);
    // "labels" scores 0.5; "plain" has no ground truth and is left out
    assert_eq!(summary.average_accuracy, Some(0.5));
}

#[tokio::test]
async fn test_rerun_replays_saved_configurations() {
    let root = tasks_root();
    let results = TempDir::new().unwrap();
    let loader = TaskLoader::new(root.path(), TaskRegistry::new());
    let store = FileResultStore::open(results.path()).await.unwrap();
    let runner = ExperimentRunner::new(Arc::new(MockInferenceClient::always("yes")));

    let labels = loader.load("labels").unwrap();
    let saved_config = ExperimentConfig {
        temperature: 0.4,
        ..config("m")
    };
    let first = run_jobs(
        &runner,
        &[(&labels, saved_config.clone())],
        Some(&store as &dyn ExperimentRepository),
        &CancellationToken::new(),
    )
    .await;
    assert!(first.unsaved.is_empty());

    // ground truth changes between runs
    write(&root.path().join("labels"), "ground_truth.json", "[\"yes\", \"yes\"]");

    let mut saved = Vec::new();
    for entry in store.latest().await.unwrap() {
        let record = store.find_by_id(&entry.experiment_id).await.unwrap().unwrap();
        saved.push((record.task_name, record.config));
    }
    let plan = plan_reruns(saved, None);
    assert_eq!(plan, vec![("labels".to_string(), saved_config)]);

    let reloaded = loader.load("labels").unwrap();
    let jobs: Vec<_> = plan.into_iter().map(|(_, config)| (&reloaded, config)).collect();
    let second = run_jobs(
        &runner,
        &jobs,
        Some(&store as &dyn ExperimentRepository),
        &CancellationToken::new(),
    )
    .await;

    let id = &first.experiments[0].experiment_id;
    assert_eq!(&second.experiments[0].experiment_id, id);
    assert_eq!(second.experiments[0].metrics.average_score, Some(1.0));
    assert_eq!(store.history().await.unwrap().len(), 2);
    let latest = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(latest.metrics.average_score, Some(1.0));
}
