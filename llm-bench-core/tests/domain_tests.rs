use llm_bench_core::domain::*;
use llm_bench_core::{CoreError, ErrorKind};
use rstest::rstest;
use serde_json::json;

fn sample(n: i64) -> Sample {
    Sample::from_pairs([("id", json!(n)), ("name", json!(format!("row {}", n)))])
}

// ===== Samples =====

#[test]
fn test_sample_preserves_field_order() {
    let sample = Sample::from_pairs([("zeta", json!(1)), ("alpha", json!(2)), ("mid", json!(3))]);
    let keys: Vec<&String> = sample.fields().keys().collect();
    assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    assert!(sample.to_pretty_json().find("zeta").unwrap() < sample.to_pretty_json().find("alpha").unwrap());
}

#[test]
fn test_sample_try_from_value() {
    assert!(Sample::try_from(json!({"a": 1})).is_ok());
    assert!(Sample::try_from(json!([1, 2])).is_err());
}

// ===== Ground Truth =====

#[rstest]
#[case(json!("plain text"), "plain text")]
#[case(json!({"a": "x"}), r#"{"a":"x"}"#)]
#[case(json!(42), "42")]
#[case(json!(null), "")]
fn test_ground_truth_to_text(#[case] value: serde_json::Value, #[case] expected: &str) {
    assert_eq!(GroundTruth::new(value).to_text(), expected);
}

// ===== Task Definition =====

#[test]
fn test_task_defaults() {
    let task = TaskDefinition::new("column_enumeration", vec![sample(1), sample(2)]);

    assert_eq!(task.name(), "column_enumeration");
    assert_eq!(task.len(), 2);
    assert!(!task.has_ground_truth());
    assert_eq!(task.prompt_template(), DEFAULT_PROMPT_TEMPLATE);
    assert!(task.schema().is_none());
    assert!(task.scorer().is_none());
    assert!(task.formatter().is_none());
}

#[test]
fn test_ground_truth_length_mismatch_is_rejected() {
    let result = TaskDefinition::new("t", vec![sample(1), sample(2), sample(3)])
        .with_ground_truth(vec![GroundTruth::text("a"), GroundTruth::text("b")]);

    match result {
        Err(CoreError::PartialTaskMismatch { samples, ground_truth }) => {
            assert_eq!(samples, 3);
            assert_eq!(ground_truth, 2);
        }
        other => panic!("expected PartialTaskMismatch, got {:?}", other.map(|t| t.name().to_string())),
    }
}

#[test]
fn test_ground_truth_alignment() {
    let task = TaskDefinition::new("t", vec![sample(1), sample(2)])
        .with_ground_truth(vec![GroundTruth::text("first"), GroundTruth::new(json!(null))])
        .unwrap();

    assert_eq!(task.ground_truth_for(0).and_then(GroundTruth::as_text), Some("first"));
    assert!(task.ground_truth_for(1).is_none(), "null rows are unscorable");
    assert!(task.ground_truth_for(5).is_none());
}

// ===== Results =====

#[test]
fn test_scoring_failure_still_counts_as_success() {
    let mut result = SampleResult::failed(
        0,
        sample(1),
        None,
        SampleError::new(ErrorKind::Transient, "timeout"),
        4,
        10,
    );
    assert!(!result.succeeded());

    result.error = Some(SampleError::new(ErrorKind::ScoringFailure, "scorer panicked"));
    assert!(result.succeeded());
}

#[test]
fn test_prediction_serialization_shape() {
    let structured = Prediction::Structured(json!({"a": 1}));
    assert_eq!(
        serde_json::to_value(&structured).unwrap(),
        json!({"kind": "structured", "value": {"a": 1}})
    );

    let text = Prediction::Text("hi".into());
    assert_eq!(
        serde_json::to_value(&text).unwrap(),
        json!({"kind": "text", "value": "hi"})
    );
}

#[test]
fn test_run_status_serialization() {
    let aborted = RunStatus::Aborted {
        kind: ErrorKind::AuthFailure,
        message: "bad key".into(),
    };
    let value = serde_json::to_value(&aborted).unwrap();
    assert_eq!(value["state"], "aborted");
    assert_eq!(value["kind"], "auth_failure");

    let restored: RunStatus = serde_json::from_value(value).unwrap();
    assert_eq!(restored, aborted);
}
