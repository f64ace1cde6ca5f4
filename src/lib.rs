pub mod architecture;
pub mod config;
pub mod error;
pub mod layer;
pub mod network;
pub mod tensor;

pub use config::NetworkConfig;
pub use error::{Error, Result};
pub use layer::{Layer, LayerKind};
pub use network::Network;
pub use tensor::{ExecutionMode, Shape, Tensor};
