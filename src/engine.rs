//! Execution engine interface and shared-handle plumbing.
//!
//! The engine is an opaque, serial, stateful collaborator: a flat named-buffer
//! storage namespace plus a sequential command executor. The control plane
//! never inspects engine internals; it writes inputs, runs argument lists,
//! reads outputs, and deletes what it staged. All operations are awaited
//! fully before the next dependent call is issued, and there is no
//! cancellation: once an execution starts it runs to completion or failure.

use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::OnceCell;

use crate::error::ConvertError;

/// Event stream kinds an engine can be observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Log,
    Progress,
}

/// Push event emitted by the engine during an execution.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Log { message: String },
    /// Normalized 0.0-1.0.
    Progress { ratio: f64 },
}

pub type EventHandler = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Opaque handle for removing a previously attached handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Asynchronous command/storage engine. One instance per process, shared by
/// all operations; callers must never issue two executions concurrently.
#[allow(async_fn_in_trait)]
pub trait ExecutionEngine {
    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), ConvertError>;

    /// Run one command. Nonzero exit surfaces as `ConvertError::ExecFailed`.
    async fn exec(&self, args: &[String]) -> Result<(), ConvertError>;

    /// Read a named entry; `ConvertError::NotFound` when absent.
    async fn read_file(&self, name: &str) -> Result<Vec<u8>, ConvertError>;

    async fn delete_file(&self, name: &str) -> Result<(), ConvertError>;

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// Scoped engine subscription. Listeners are attached immediately before an
/// engine call and must not outlive it, so the guard detaches on drop even
/// when the call fails.
pub struct Subscription<'e, E: ExecutionEngine> {
    engine: &'e E,
    id: SubscriptionId,
}

impl<'e, E: ExecutionEngine> Subscription<'e, E> {
    pub fn attach(engine: &'e E, kind: EventKind, handler: EventHandler) -> Self {
        let id = engine.subscribe(kind, handler);
        Self { engine, id }
    }
}

impl<E: ExecutionEngine> Drop for Subscription<'_, E> {
    fn drop(&mut self) {
        self.engine.unsubscribe(self.id);
    }
}

/// Single-flight lazy holder for an expensive-to-initialize shared handle
/// (execution engine, image codec). Concurrent first callers await the same
/// in-progress load instead of racing to initialize twice; a failed load
/// leaves the cell empty so a later call can retry.
pub struct EngineCell<T> {
    cell: OnceCell<T>,
}

impl<T> EngineCell<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<&T, ConvertError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ConvertError>>,
    {
        self.cell.get_or_try_init(load).await
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }
}

impl<T> Default for EngineCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Diagnostic record surfaced to the UI. Append-only per job or probe run;
/// the core never retains these.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticEvent {
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u32>,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Info,
    Error,
    Progress,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl DiagnosticEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Info,
            message: message.into(),
            percent: None,
            timestamp_ms: now_ms(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            message: message.into(),
            percent: None,
            timestamp_ms: now_ms(),
        }
    }

    pub fn progress(ratio: f64) -> Self {
        let percent = (ratio.clamp(0.0, 1.0) * 100.0).round() as u32;
        Self {
            kind: DiagnosticKind::Progress,
            message: format!("{}%", percent),
            percent: Some(percent),
            timestamp_ms: now_ms(),
        }
    }
}

/// Consumer callback for diagnostic events.
pub type DiagnosticSink = Arc<dyn Fn(DiagnosticEvent) + Send + Sync>;

pub(crate) fn emit(sink: Option<&DiagnosticSink>, event: DiagnosticEvent) {
    if let Some(sink) = sink {
        sink(event);
    }
}
