//! Crate error type. Implements Display and Serialize so failures can cross
//! a UI boundary as plain strings.

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Engine or codec failed to load. Fatal to all subsequent operations
    /// until the caller retries the load.
    #[error("engine initialization failed: {0}")]
    Initialization(String),

    /// Compiler or search was given a format with no mapped codec.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Engine reported a nonzero exit for an execution.
    #[error("encode failed (code {code}): {log}")]
    ExecFailed { code: i32, log: String },

    /// Named entry absent from the engine's storage namespace.
    #[error("`{0}` not found in engine storage")]
    NotFound(String),

    /// Execution reported success but the output entry is absent. Kept
    /// distinct from `ExecFailed`: it indicates a contract violation by the
    /// engine, not an encoding error.
    #[error("execution succeeded but output `{0}` is missing")]
    OutputMissing(String),
}

impl ConvertError {
    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    pub fn exec_failed(code: i32, log: impl Into<String>) -> Self {
        Self::ExecFailed {
            code,
            log: log.into(),
        }
    }
}

impl serde::Serialize for ConvertError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
