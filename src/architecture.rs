//! JSON description of a network's layer stack.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::NetworkConfig;
use crate::error::Result;
use crate::layer::{Layer, LayerKind};
use crate::network::Network;

fn default_stride() -> usize {
    1
}

/// One layer of an architecture file, tagged by `"type"`.
///
/// ```json
/// { "type": "conv2d", "in_channels": 1, "out_channels": 6, "kernel_size": 5, "padding": 2 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LayerConfig {
    #[serde(rename = "conv2d")]
    Conv2d {
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        #[serde(default = "default_stride")]
        stride: usize,
        #[serde(default)]
        padding: usize,
    },
    #[serde(rename = "linear")]
    Linear { in_features: usize, out_features: usize },
    #[serde(rename = "max_pool2d")]
    MaxPool2d {
        kernel_size: usize,
        #[serde(default = "default_stride")]
        stride: usize,
        #[serde(default)]
        padding: usize,
    },
    #[serde(rename = "relu")]
    ReLU,
    #[serde(rename = "softmax")]
    SoftMax,
    #[serde(rename = "flatten")]
    Flatten,
}

impl LayerConfig {
    pub fn build(&self) -> Result<Layer> {
        match *self {
            LayerConfig::Conv2d { in_channels, out_channels, kernel_size, stride, padding } => {
                Layer::conv2d(in_channels, out_channels, kernel_size, stride, padding)
            }
            LayerConfig::Linear { in_features, out_features } => Layer::linear(in_features, out_features),
            LayerConfig::MaxPool2d { kernel_size, stride, padding } => {
                Layer::max_pool2d(kernel_size, stride, padding)
            }
            LayerConfig::ReLU => Ok(Layer::relu()),
            LayerConfig::SoftMax => Ok(Layer::softmax()),
            LayerConfig::Flatten => Ok(Layer::flatten()),
        }
    }
}

impl From<&LayerKind> for LayerConfig {
    fn from(kind: &LayerKind) -> Self {
        match kind {
            LayerKind::Conv2d(conv) => LayerConfig::Conv2d {
                in_channels: conv.in_channels(),
                out_channels: conv.out_channels(),
                kernel_size: conv.kernel_size(),
                stride: conv.stride(),
                padding: conv.padding(),
            },
            LayerKind::Linear(linear) => LayerConfig::Linear {
                in_features: linear.in_features(),
                out_features: linear.out_features(),
            },
            LayerKind::MaxPool2d(pool) => LayerConfig::MaxPool2d {
                kernel_size: pool.kernel_size(),
                stride: pool.stride(),
                padding: pool.padding(),
            },
            LayerKind::ReLU => LayerConfig::ReLU,
            LayerKind::SoftMax => LayerConfig::SoftMax,
            LayerKind::Flatten => LayerConfig::Flatten,
        }
    }
}

/// Ordered layer stack; layers run in the order they appear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    pub layers: Vec<LayerConfig>,
}

impl ArchitectureConfig {
    pub fn build(&self, config: NetworkConfig) -> Result<Network> {
        let mut network = Network::new(config)?;
        for layer in &self.layers {
            network.add(layer.build()?);
        }
        Ok(network)
    }
}

pub fn load_architecture<P: AsRef<Path>>(path: P) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
