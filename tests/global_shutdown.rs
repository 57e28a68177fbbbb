//! Writers registered with the process-wide shutdown registry.

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use femtobatch::{BatchWriterBuilder, Markers, WriterState, run_shutdown_hooks};
use rstest::rstest;
use serial_test::serial;
use test_utils::RecordingTransmitter;

fn writer(transmitter: &Arc<RecordingTransmitter>) -> femtobatch::FemtoBatchWriter {
    BatchWriterBuilder::new()
        .with_transmitter(transmitter.clone())
        .with_markers(Markers::json_array())
        .with_flush_interval(Duration::from_secs(60))
        .with_probe_on_init(false)
        .build()
        .expect("valid writer")
}

#[rstest]
#[serial]
fn shutdown_hooks_drain_every_writer() {
    let first = Arc::new(RecordingTransmitter::healthy());
    let second = Arc::new(RecordingTransmitter::healthy());
    let a = writer(&first);
    let b = writer(&second);
    a.write(b"a").expect("write a");
    b.write(b"b").expect("write b");

    assert!(run_shutdown_hooks() >= 2);
    assert_eq!(a.state(), WriterState::FinallyDisabled);
    assert_eq!(b.state(), WriterState::FinallyDisabled);
    assert_eq!(first.sorted_records(), ["a"]);
    assert_eq!(second.sorted_records(), ["b"]);
}

#[rstest]
#[serial]
fn hooks_run_once() {
    let transmitter = Arc::new(RecordingTransmitter::healthy());
    let w = writer(&transmitter);
    w.write(b"a").expect("write");

    assert!(run_shutdown_hooks() >= 1);
    assert_eq!(run_shutdown_hooks(), 0);
    assert_eq!(w.state(), WriterState::FinallyDisabled);
}

#[rstest]
#[serial]
fn uninitialized_writer_registers_nothing() {
    let transmitter = Arc::new(RecordingTransmitter::healthy());
    let w = writer(&transmitter);
    run_shutdown_hooks();
    assert_eq!(run_shutdown_hooks(), 0);
    assert_eq!(w.state(), WriterState::NotInitialized);
    drop(w);
    assert_eq!(transmitter.attempts(), 0);
}
