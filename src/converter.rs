//! Top-level conversion facade.
//!
//! Owns the lazily loaded engine handle, the probe cache, and the job gate
//! that keeps engine executions strictly sequential. Every operation that
//! can reach `exec` takes the gate first; the engine itself never sees two
//! in-flight commands.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::Mutex;

use crate::engine::{DiagnosticEvent, DiagnosticSink, EngineCell, ExecutionEngine, emit};
use crate::error::ConvertError;
use crate::ffmpeg::job::{JobOutput, JobRunner, StreamCopyJob};
use crate::ffmpeg::probe::{FileMetadata, ProbeCache};
use crate::settings::{ControlMode, EncodeSettings};

/// Deferred engine construction. Invoked at most once per successful load;
/// invoked again only after a failed load.
pub type EngineLoader<E> =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<E, ConvertError>> + Send>> + Send + Sync>;

pub struct Converter<E: ExecutionEngine> {
    loader: EngineLoader<E>,
    cell: EngineCell<E>,
    probe_cache: ProbeCache,
    /// Serializes engine executions across concurrent callers.
    job_gate: Mutex<()>,
    sink: Option<DiagnosticSink>,
}

impl<E: ExecutionEngine> Converter<E> {
    pub fn new(loader: EngineLoader<E>) -> Self {
        Self {
            loader,
            cell: EngineCell::new(),
            probe_cache: ProbeCache::new(),
            job_gate: Mutex::new(()),
            sink: None,
        }
    }

    pub fn with_sink(loader: EngineLoader<E>, sink: DiagnosticSink) -> Self {
        Self {
            sink: Some(sink),
            ..Self::new(loader)
        }
    }

    /// Shared engine handle, loading it on first use. Concurrent first
    /// callers await the same load; a failed load can be retried.
    pub async fn engine(&self) -> Result<&E, ConvertError> {
        let first = self.cell.get().is_none();
        if first {
            emit(self.sink.as_ref(), DiagnosticEvent::info("Loading engine..."));
        }
        let engine = self.cell.get_or_load(|| (self.loader)()).await?;
        if first {
            emit(self.sink.as_ref(), DiagnosticEvent::info("Engine ready"));
        }
        Ok(engine)
    }

    /// Probe source metadata, consulting the cache first.
    pub async fn probe(
        &self,
        input_name: &str,
        input_bytes: &[u8],
    ) -> Result<FileMetadata, ConvertError> {
        let engine = self.engine().await?;
        let _gate = self.job_gate.lock().await;
        self.probe_cache
            .get_or_probe(engine, input_name, input_bytes)
            .await
    }

    /// Run a full conversion job. Size mode probes the source first for the
    /// duration the bitrate budget needs.
    pub async fn convert(
        &self,
        settings: &EncodeSettings,
        input_name: &str,
        input_bytes: &[u8],
    ) -> Result<JobOutput, ConvertError> {
        let engine = self.engine().await?;
        let _gate = self.job_gate.lock().await;

        let metadata = if settings.effective_mode() == ControlMode::Size {
            self.probe_cache
                .get_or_probe(engine, input_name, input_bytes)
                .await?
        } else {
            FileMetadata::default()
        };

        let mut runner = JobRunner::new(engine, self.sink.clone());
        runner
            .run(settings, input_name, input_bytes, &metadata)
            .await
    }

    /// Strip the audio stream without re-encoding.
    pub async fn remove_audio(
        &self,
        input_name: &str,
        input_bytes: &[u8],
    ) -> Result<JobOutput, ConvertError> {
        self.stream_copy(input_name, input_bytes, StreamCopyJob::RemoveAudio)
            .await
    }

    /// Cut `[start, end]` out of the source without re-encoding. Timestamps
    /// are passed through to the engine verbatim (`HH:MM:SS` or seconds).
    pub async fn clip(
        &self,
        input_name: &str,
        input_bytes: &[u8],
        start: &str,
        end: &str,
    ) -> Result<JobOutput, ConvertError> {
        self.stream_copy(input_name, input_bytes, StreamCopyJob::Clip { start, end })
            .await
    }

    async fn stream_copy(
        &self,
        input_name: &str,
        input_bytes: &[u8],
        job: StreamCopyJob<'_>,
    ) -> Result<JobOutput, ConvertError> {
        let engine = self.engine().await?;
        let _gate = self.job_gate.lock().await;
        let mut runner = JobRunner::new(engine, self.sink.clone());
        runner.run_stream_copy(input_name, input_bytes, job).await
    }
}
