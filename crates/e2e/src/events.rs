//! Line-delimited JSON event stream emitted by the suite runner
//!
//! Each protocol line is a two-element array `[kind, payload]`. Anything else
//! on the stream is ordinary log output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Counts carried by an `end` event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndStats {
    #[serde(default)]
    pub tests: u64,
    #[serde(default)]
    pub passes: u64,
    #[serde(default)]
    pub pending: u64,
    #[serde(default)]
    pub failures: u64,
}

/// A decoded protocol line
#[derive(Debug, Clone, PartialEq)]
pub enum TestEvent {
    End(EndStats),
    /// Failing test descriptor; kept opaque
    Fail(Value),
    /// `start`, `pass` or `pending`: valid protocol, nothing to aggregate
    Progress,
}

/// Best-effort decode of one log line
pub fn decode_line(line: &str) -> Option<TestEvent> {
    let trimmed = line.trim();
    if !trimmed.starts_with('[') {
        return None;
    }

    let (kind, payload): (String, Value) = serde_json::from_str(trimmed).ok()?;
    match kind.as_str() {
        "end" => serde_json::from_value(payload).ok().map(TestEvent::End),
        "fail" => Some(TestEvent::Fail(payload)),
        "start" | "pass" | "pending" => Some(TestEvent::Progress),
        _ => None,
    }
}
