//! Runtime configuration for a `Network`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tensor::ExecutionMode;

/// Settings threaded through every `Network::predict` call.
///
/// # Example
///
/// ```json
/// {
///   "debug": true,
///   "execution_mode": "parallel",
///   "num_threads": 4
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Emit a debug record with every layer's output shape during `predict`.
    pub debug: bool,

    /// How each layer computes its output buffer.
    pub execution_mode: ExecutionMode,

    /// Size of a dedicated rayon pool for parallel execution. `None` uses the
    /// global pool.
    pub num_threads: Option<usize>,
}

impl NetworkConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn num_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }
}
