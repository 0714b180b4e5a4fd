//! Integration tests for telemetry initialization and span helpers.

use chatq::config::LogFormat;
use chatq::model::{JobId, JobState, SubmitterId};
use chatq::telemetry::{TelemetryConfig, init_telemetry};

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process; a second
    // attempt returns Err, which is acceptable here.
    let config = TelemetryConfig {
        endpoint: None,
        service_name: "chatq-test".to_string(),
        log_level: "debug".to_string(),
        log_format: LogFormat::Json,
    };
    let _guard = init_telemetry(config);
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut config = TelemetryConfig::new("chatq-test");
    config.log_level = "chatq=notalevel".to_string();
    // Only meaningful when RUST_LOG does not override the level.
    if std::env::var_os("RUST_LOG").is_none() {
        assert!(init_telemetry(config).is_err());
    }
}

#[test]
fn telemetry_config_defaults() {
    let config = TelemetryConfig::new("chatq");
    assert!(config.endpoint.is_none());
    assert_eq!(config.log_level, "info");
    assert_eq!(config.log_format, LogFormat::Text);
}

#[test]
fn genai_chat_span_creates() {
    let span = chatq::telemetry::genai::start_chat_span("gpt-3.5-turbo", "openai");
    let _entered = span.enter();
}

#[test]
fn job_span_creates_and_records_transitions() {
    let id = JobId::new();
    let span = chatq::telemetry::job::start_job_span(&id, &SubmitterId::from("alice"));
    chatq::telemetry::job::record_state_transition(&span, JobState::Queued, JobState::Generating);
    chatq::telemetry::job::record_state_transition(
        &span,
        JobState::Generating,
        JobState::DeliveringTextOnly,
    );
}

#[test]
fn metric_instruments_record_without_provider() {
    use opentelemetry::KeyValue;

    chatq::telemetry::metrics::admissions().add(1, &[KeyValue::new("result", "accepted")]);
    chatq::telemetry::metrics::jobs_released().add(1, &[KeyValue::new("outcome", "text")]);
    chatq::telemetry::metrics::stage_failures().add(1, &[KeyValue::new("stage", "speech")]);
    chatq::telemetry::metrics::stage_duration_ms().record(12.5, &[KeyValue::new("stage", "speech")]);
}
