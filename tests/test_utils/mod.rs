#![allow(dead_code)]

pub mod mock_server;
pub mod recording;

use std::thread;
use std::time::{Duration, Instant};

pub use mock_server::{CapturedRequest, spawn_server};
pub use recording::{RecordingTransmitter, Step};

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Split a JSON-array batch body such as `[a,b]` into its records.
pub fn json_records(body: &str) -> Vec<String> {
    let inner = body
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(body);
    if inner.is_empty() {
        return Vec::new();
    }
    inner.split(',').map(str::to_string).collect()
}
