//! Execution tracing for diagnosing slow launches.
//!
//! A [`Tracer`] collects begin/end events for named spans in the Chrome
//! trace-event format. Spans are scoped: [`Tracer::span`] returns a guard
//! that records the end event when dropped, so a span closes on every exit
//! path, including early returns and errors. Each span is also entered as a
//! `tracing` span so log lines carry the same context.
//!
//! At the end of a run the buffer is written to
//! `<logDir>/traces/launch.<buildId>.trace`.

use crate::error::{LauncherError, Result};
use crate::fs::atomic_write;
use crate::status::BuildId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::debug_span;
use tracing::span::EnteredSpan;

/// Phase of a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "B")]
    Begin,
    #[serde(rename = "E")]
    End,
}

/// One entry of a Chrome trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub name: String,
    pub ph: Phase,
    /// Microseconds since the tracer was created.
    pub ts: u64,
    pub pid: u32,
    pub tid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

#[derive(Debug)]
struct TraceBuffer {
    started: Instant,
    events: Vec<TraceEvent>,
}

/// Shared handle to a run's trace buffer.
#[derive(Debug, Clone)]
pub struct Tracer {
    buffer: Arc<Mutex<TraceBuffer>>,
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(TraceBuffer {
                started: Instant::now(),
                events: Vec::new(),
            })),
        }
    }

    /// Open a span that closes when the returned guard is dropped.
    pub fn span(&self, name: &str) -> Span {
        self.span_with_args(name, None)
    }

    /// Open a span carrying extra arguments on its begin event.
    pub fn span_with_args(&self, name: &str, args: Option<Value>) -> Span {
        self.record(name, Phase::Begin, args);
        Span {
            tracer: self.clone(),
            name: name.to_string(),
            _entered: debug_span!("trace", span = %name).entered(),
        }
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.lock().events.clone()
    }

    /// Path of the trace artifact for `build_id` inside `dir`.
    pub fn artifact_path(dir: &Path, build_id: &BuildId) -> PathBuf {
        dir.join(format!("launch.{}.trace", build_id))
    }

    /// Serialize the recorded events to `dir`, keyed by `build_id`.
    pub fn write_to_dir(&self, dir: &Path, build_id: &BuildId) -> Result<PathBuf> {
        let events = self.events();
        let json = serde_json::to_vec(&events)
            .map_err(|e| LauncherError::Engine(format!("failed to serialize trace: {}", e)))?;

        let path = Self::artifact_path(dir, build_id);
        atomic_write(&path, &json)?;
        Ok(path)
    }

    fn record(&self, name: &str, ph: Phase, args: Option<Value>) {
        let mut buffer = self.lock();
        let ts = u64::try_from(buffer.started.elapsed().as_micros()).unwrap_or(u64::MAX);
        let pid = std::process::id();
        buffer.events.push(TraceEvent {
            name: name.to_string(),
            ph,
            ts,
            pid,
            tid: pid,
            args,
        });
    }

    fn lock(&self) -> MutexGuard<'_, TraceBuffer> {
        // A panic while holding the lock cannot leave the buffer inconsistent.
        self.buffer
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

/// Guard for an open span.
#[derive(Debug)]
pub struct Span {
    tracer: Tracer,
    name: String,
    _entered: EnteredSpan,
}

impl Drop for Span {
    fn drop(&mut self) {
        self.tracer.record(&self.name, Phase::End, None);
    }
}
