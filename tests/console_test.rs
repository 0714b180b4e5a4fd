//! Integration tests for the console transport.

mod common;

use std::sync::Arc;

use chatq::config::Timeouts;
use chatq::console::{ConsoleHandle, SharedOutput, parse_line, run_console};
use chatq::delivery::EventHandle;
use chatq::event::EventBus;
use chatq::model::SubmitterId;
use chatq::queue::WorkQueue;
use common::*;
use tempfile::TempDir;
use tokio::sync::Mutex;

fn output() -> SharedOutput<Vec<u8>> {
    Arc::new(Mutex::new(Vec::new()))
}

async fn written(output: &SharedOutput<Vec<u8>>) -> String {
    String::from_utf8(output.lock().await.clone()).unwrap()
}

// ---------------------------------------------------------------------------
// Line parsing
// ---------------------------------------------------------------------------

#[test]
fn parses_name_and_message() {
    let (who, text) = parse_line("alice: what's the stack?").unwrap();
    assert_eq!(who, SubmitterId::from("alice"));
    assert_eq!(text, "what's the stack?");
}

#[test]
fn only_first_colon_separates() {
    let (who, text) = parse_line("  bob :  time is 10:30 ").unwrap();
    assert_eq!(who.0, "bob");
    assert_eq!(text, "time is 10:30");
}

#[test]
fn ignores_blank_comment_and_malformed_lines() {
    for line in ["", "   ", "# note: not a message", "no separator", ": orphan", "carol:   "] {
        assert!(parse_line(line).is_none(), "{line:?} should be ignored");
    }
}

// ---------------------------------------------------------------------------
// Admission replies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn replies_with_admission_decisions() {
    let (queue, _rx) = WorkQueue::new(capacity(1), EventBus::default());
    let out = output();
    let outbox = TempDir::new().unwrap();

    let input: &[u8] = b"alice: hi\n# skipped\nbob: yo\nalice: again\n";
    run_console(input, Arc::clone(&out), queue, outbox.path().to_path_buf())
        .await
        .unwrap();

    assert_eq!(
        written(&out).await,
        "[@alice] Your position in the queue: 1\n\
         [@bob] Queue is full!\n\
         [@alice] You already have a message in the queue!\n"
    );
}

#[tokio::test]
async fn closed_queue_stops_the_console() {
    let (queue, rx) = WorkQueue::new(capacity(1), EventBus::default());
    drop(rx);

    let input: &[u8] = b"alice: hi\n";
    let result = run_console(input, output(), queue, TempDir::new().unwrap().path().into()).await;
    assert!(result.is_err());
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn attachments_are_saved_to_the_outbox() {
    let out = output();
    let outbox = TempDir::new().unwrap();
    let handle = ConsoleHandle::new(
        SubmitterId::from("alice/../x"),
        Arc::clone(&out),
        outbox.path().join("media"),
    );

    handle
        .reply_with_attachment(b"mp3-bytes".to_vec(), "response.mp3")
        .await
        .unwrap();

    let saved: Vec<_> = std::fs::read_dir(outbox.path().join("media"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(saved.len(), 1);
    let name = saved[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("alice_.._x-"), "{name}");
    assert!(name.ends_with("-response.mp3"), "{name}");
    assert_eq!(std::fs::read(&saved[0]).unwrap(), b"mp3-bytes");

    let text = written(&out).await;
    assert!(text.starts_with("[@alice/../x] attachment: "), "{text}");
}

#[tokio::test]
async fn worker_replies_reach_the_console() {
    let mut h = harness(
        2,
        Arc::new(ScriptedGenerator::new(Script::Echo)),
        None,
        Timeouts::default(),
    );
    let out = output();
    let outbox = TempDir::new().unwrap();

    let input: &[u8] = b"alice: hi\n";
    run_console(input, Arc::clone(&out), h.queue.clone(), outbox.path().into())
        .await
        .unwrap();
    tokio::spawn(h.worker.run());
    wait_released(&mut h.events, 1).await;

    assert_eq!(
        written(&out).await,
        "[@alice] Your position in the queue: 1\n[@alice] echo: hi\n"
    );
}
