pub mod converter;
pub mod engine;
pub mod error;
pub mod ffmpeg;
pub mod image;
pub mod settings;

pub use converter::{Converter, EngineLoader};
pub use engine::{DiagnosticEvent, DiagnosticKind, DiagnosticSink, ExecutionEngine};
pub use error::ConvertError;
pub use settings::{AudioCodec, ControlMode, EncodeSettings, OutputFormat};
