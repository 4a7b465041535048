//! Shared fixtures: a scriptable in-memory engine and a deterministic image
//! codec.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use mediaconv_core::engine::{EngineEvent, EventHandler, EventKind, SubscriptionId};
use mediaconv_core::error::ConvertError;
use mediaconv_core::image::{ImageCodecEngine, ImageEncodeOptions, ImageFormat, PixelImage};
use mediaconv_core::{Converter, EngineLoader, ExecutionEngine};

pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// In-memory engine with scripted exec behavior.
///
/// Diagnostic runs (argument lists carrying `-hide_banner`) replay the
/// configured probe lines through the log subscription and exit nonzero,
/// like a real banner dump with no output file. Every other exec writes a
/// marker payload under its final argument unless told to fail or to skip
/// the output. Exec entry/exit is tracked so tests can assert that no two
/// executions ever overlap.
#[derive(Clone)]
pub struct MockEngine {
    inner: Arc<MockEngineInner>,
}

impl std::fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngine").finish_non_exhaustive()
    }
}

struct MockEngineInner {
    storage: Mutex<HashMap<String, Vec<u8>>>,
    handlers: Mutex<HashMap<u64, (EventKind, EventHandler)>>,
    next_sub_id: AtomicU64,
    execs: Mutex<Vec<Vec<String>>>,
    probe_lines: Vec<String>,
    /// 1-based exec sequence number that fails with `ExecFailed`.
    fail_exec_at: Option<usize>,
    /// Exec succeeds but leaves no output entry behind.
    skip_output: bool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockEngine {
    pub fn new(probe_lines: &[&str]) -> Self {
        Self::build(probe_lines, None, false)
    }

    pub fn failing_at(probe_lines: &[&str], exec_seq: usize) -> Self {
        Self::build(probe_lines, Some(exec_seq), false)
    }

    pub fn without_outputs(probe_lines: &[&str]) -> Self {
        Self::build(probe_lines, None, true)
    }

    fn build(probe_lines: &[&str], fail_exec_at: Option<usize>, skip_output: bool) -> Self {
        Self {
            inner: Arc::new(MockEngineInner {
                storage: Mutex::new(HashMap::new()),
                handlers: Mutex::new(HashMap::new()),
                next_sub_id: AtomicU64::new(1),
                execs: Mutex::new(Vec::new()),
                probe_lines: probe_lines.iter().map(|s| s.to_string()).collect(),
                fail_exec_at,
                skip_output,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn exec_history(&self) -> Vec<Vec<String>> {
        self.inner.execs.lock().clone()
    }

    pub fn exec_count(&self) -> usize {
        self.inner.execs.lock().len()
    }

    pub fn storage_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.storage.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn listener_count(&self) -> usize {
        self.inner.handlers.lock().len()
    }

    pub fn max_concurrent_execs(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    fn emit_log(&self, message: &str) {
        let event = EngineEvent::Log {
            message: message.to_string(),
        };
        let handlers = self.inner.handlers.lock();
        for (kind, handler) in handlers.values() {
            if *kind == EventKind::Log {
                handler(&event);
            }
        }
    }
}

impl ExecutionEngine for MockEngine {
    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), ConvertError> {
        self.inner
            .storage
            .lock()
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn exec(&self, args: &[String]) -> Result<(), ConvertError> {
        let seq = {
            let mut execs = self.inner.execs.lock();
            execs.push(args.to_vec());
            execs.len()
        };

        let entered = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner
            .max_in_flight
            .fetch_max(entered, Ordering::SeqCst);
        // Let a would-be concurrent exec overlap if the caller allows it.
        tokio::task::yield_now().await;
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        if args.iter().any(|a| a == "-hide_banner") {
            for line in &self.inner.probe_lines {
                self.emit_log(line);
            }
            return Err(ConvertError::exec_failed(1, "At least one output file must be specified"));
        }

        if self.inner.fail_exec_at == Some(seq) {
            return Err(ConvertError::exec_failed(1, "Conversion failed!"));
        }

        if !self.inner.skip_output {
            if let Some(output) = args.last() {
                self.inner
                    .storage
                    .lock()
                    .insert(output.clone(), format!("encoded:{}", seq).into_bytes());
            }
        }
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, ConvertError> {
        self.inner
            .storage
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| ConvertError::NotFound(name.to_string()))
    }

    async fn delete_file(&self, name: &str) -> Result<(), ConvertError> {
        match self.inner.storage.lock().remove(name) {
            Some(_) => Ok(()),
            None => Err(ConvertError::NotFound(name.to_string())),
        }
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        let id = self.inner.next_sub_id.fetch_add(1, Ordering::SeqCst);
        self.inner.handlers.lock().insert(id, (kind, handler));
        SubscriptionId(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.handlers.lock().remove(&id.0);
    }
}

/// Probe banner for a 60 second source with an AAC stream.
pub fn standard_probe_lines() -> Vec<&'static str> {
    vec![
        "  Duration: 00:01:00.00, start: 0.000000, bitrate: 1500 kb/s",
        "  Stream #0:0[0x1](und): Video: h264 (High), yuv420p, 1920x1080",
        "  Stream #0:1[0x2](und): Audio: aac, 48000 Hz, stereo, 128 kb/s",
    ]
}

pub fn converter_for(engine: MockEngine) -> Converter<MockEngine> {
    let loader: EngineLoader<MockEngine> = Box::new(move || {
        let engine = engine.clone();
        Box::pin(async move { Ok(engine) })
    });
    Converter::new(loader)
}

/// Image codec whose output size is a pure function of quality.
pub struct FakeImageCodec {
    format: ImageFormat,
    size_for: Box<dyn Fn(u32) -> u64 + Send + Sync>,
    encodes: AtomicUsize,
    last_speed_hint: Mutex<Option<Option<u32>>>,
}

impl FakeImageCodec {
    pub fn new(
        format: ImageFormat,
        size_for: impl Fn(u32) -> u64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            format,
            size_for: Box::new(size_for),
            encodes: AtomicUsize::new(0),
            last_speed_hint: Mutex::new(None),
        }
    }

    pub fn encode_count(&self) -> usize {
        self.encodes.load(Ordering::SeqCst)
    }

    pub fn last_speed_hint(&self) -> Option<Option<u32>> {
        *self.last_speed_hint.lock()
    }
}

impl ImageCodecEngine for FakeImageCodec {
    fn format(&self) -> ImageFormat {
        self.format
    }

    async fn decode(&self, _bytes: &[u8]) -> Result<PixelImage, ConvertError> {
        Ok(PixelImage {
            width: 4,
            height: 4,
            rgba: vec![0u8; 64],
        })
    }

    async fn encode(
        &self,
        _image: &PixelImage,
        options: ImageEncodeOptions,
    ) -> Result<Vec<u8>, ConvertError> {
        self.encodes.fetch_add(1, Ordering::SeqCst);
        *self.last_speed_hint.lock() = Some(options.speed_hint);
        Ok(vec![0u8; (self.size_for)(options.quality) as usize])
    }
}
