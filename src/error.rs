use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("uninitialized state: {0}")]
    UninitializedState(String),

    #[error("failed to load parameters of layer {layer}: {reason}")]
    ParameterLoad { layer: usize, reason: String },

    #[error("index {index:?} out of bounds for tensor of shape {shape:?}")]
    IndexOutOfBounds { index: [usize; 4], shape: [usize; 4] },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub fn configuration(m: impl Into<String>) -> Error {
    Error::Configuration(m.into())
}

pub fn shape_mismatch(m: impl Into<String>) -> Error {
    Error::ShapeMismatch(m.into())
}

pub fn uninitialized(m: impl Into<String>) -> Error {
    Error::UninitializedState(m.into())
}
