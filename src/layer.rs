use std::fmt;
use std::io::{self, Read, Write};

use crate::error::{configuration, shape_mismatch, uninitialized, Result};
use crate::tensor::{ExecutionMode, Shape, Tensor};

pub mod conv2d;
pub mod flatten;
pub mod linear;
pub mod max_pool2d;
pub mod relu;
pub mod softmax;

pub use conv2d::Conv2d;
pub use linear::Linear;
pub use max_pool2d::MaxPool2d;

/// Layer variant together with its construction-time configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Conv2d(Conv2d),
    Linear(Linear),
    MaxPool2d(MaxPool2d),
    ReLU,
    SoftMax,
    Flatten,
}

impl LayerKind {
    pub fn name(&self) -> &'static str {
        match self {
            LayerKind::Conv2d(_) => "Conv2d",
            LayerKind::Linear(_) => "Linear",
            LayerKind::MaxPool2d(_) => "MaxPool2d",
            LayerKind::ReLU => "ReLU",
            LayerKind::SoftMax => "SoftMax",
            LayerKind::Flatten => "Flatten",
        }
    }

    /// Weight and bias shapes for parameterized kinds.
    pub fn parameter_shapes(&self) -> Option<(Shape, Shape)> {
        match self {
            LayerKind::Conv2d(conv) => Some((conv.weight_shape(), conv.bias_shape())),
            LayerKind::Linear(linear) => Some((linear.weight_shape(), linear.bias_shape())),
            _ => None,
        }
    }

    pub fn output_shape(&self, input: Shape) -> Result<Shape> {
        match self {
            LayerKind::Conv2d(conv) => conv.output_shape(input),
            LayerKind::Linear(linear) => linear.output_shape(input),
            LayerKind::MaxPool2d(pool) => Ok(pool.output_shape(input)),
            LayerKind::ReLU => Ok(input),
            LayerKind::SoftMax => softmax::output_shape(input),
            LayerKind::Flatten => Ok(flatten::output_shape(input)),
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Conv2d> for LayerKind {
    fn from(conv: Conv2d) -> Self {
        LayerKind::Conv2d(conv)
    }
}

impl From<Linear> for LayerKind {
    fn from(linear: Linear) -> Self {
        LayerKind::Linear(linear)
    }
}

impl From<MaxPool2d> for LayerKind {
    fn from(pool: MaxPool2d) -> Self {
        LayerKind::MaxPool2d(pool)
    }
}

/// Output length of a sliding window along one spatial axis.
///
/// `floor((input + 2 * padding - kernel) / stride) + 1`, or 0 when the kernel
/// does not fit inside the padded input. The window must have passed
/// `validate_window`.
pub(crate) fn window_output_len(input: usize, kernel: usize, stride: usize, padding: usize) -> usize {
    let padded = input.saturating_add(2 * padding);
    if padded < kernel {
        0
    } else {
        (padded - kernel) / stride + 1
    }
}

pub(crate) fn validate_window(kernel_size: usize, stride: usize, padding: usize) -> Result<()> {
    if kernel_size == 0 {
        return Err(configuration("kernel size must be at least 1"));
    }
    if stride == 0 {
        return Err(configuration("stride must be at least 1"));
    }
    if padding.checked_mul(2).and_then(|p| p.checked_add(kernel_size)).is_none() {
        return Err(configuration(format!("padding {} is out of range", padding)));
    }
    Ok(())
}

/// A network layer: its kind plus the input, weights, bias and output tensors
/// that make up its working state.
#[derive(Debug, Clone)]
pub struct Layer {
    kind: LayerKind,
    input: Option<Tensor>,
    weights: Option<Tensor>,
    bias: Option<Tensor>,
    output: Option<Tensor>,
}

impl Layer {

    pub fn new(kind: impl Into<LayerKind>) -> Layer {
        Layer { kind: kind.into(), input: None, weights: None, bias: None, output: None }
    }

    pub fn conv2d(in_channels: usize, out_channels: usize, kernel_size: usize, stride: usize, padding: usize) -> Result<Layer> {
        Ok(Layer::new(Conv2d::new(in_channels, out_channels, kernel_size, stride, padding)?))
    }

    pub fn linear(in_features: usize, out_features: usize) -> Result<Layer> {
        Ok(Layer::new(Linear::new(in_features, out_features)?))
    }

    pub fn max_pool2d(kernel_size: usize, stride: usize, padding: usize) -> Result<Layer> {
        Ok(Layer::new(MaxPool2d::new(kernel_size, stride, padding)?))
    }

    pub fn relu() -> Layer {
        Layer::new(LayerKind::ReLU)
    }

    pub fn softmax() -> Layer {
        Layer::new(LayerKind::SoftMax)
    }

    pub fn flatten() -> Layer {
        Layer::new(LayerKind::Flatten)
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub fn input(&self) -> Option<&Tensor> {
        self.input.as_ref()
    }

    pub fn weights(&self) -> Option<&Tensor> {
        self.weights.as_ref()
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    pub fn output(&self) -> Option<&Tensor> {
        self.output.as_ref()
    }

    pub fn set_input(&mut self, input: Tensor) {
        self.input = Some(input);
    }

    pub fn is_parameterized(&self) -> bool {
        self.kind.parameter_shapes().is_some()
    }

    /// Number of weight and bias values the layer expects.
    pub fn parameter_count(&self) -> usize {
        match self.kind.parameter_shapes() {
            Some((w, b)) => w.iter().product::<usize>() + b.iter().product::<usize>(),
            None => 0,
        }
    }

    pub fn set_parameters(&mut self, weights: Tensor, bias: Tensor) -> Result<()> {
        let (weight_shape, bias_shape) = self.kind.parameter_shapes().ok_or_else(|| {
            configuration(format!("{} layer has no parameters", self.kind))
        })?;
        if weights.shape() != weight_shape {
            return Err(shape_mismatch(format!(
                "{} expects weights of shape {:?}, got {:?}",
                self.kind, weight_shape, weights.shape()
            )));
        }
        if bias.shape() != bias_shape {
            return Err(shape_mismatch(format!(
                "{} expects bias of shape {:?}, got {:?}",
                self.kind, bias_shape, bias.shape()
            )));
        }
        self.weights = Some(weights);
        self.bias = Some(bias);
        Ok(())
    }

    /// Seeded Xavier-uniform weights and zero bias. No-op for kinds without parameters.
    pub fn randomize(&mut self, seed: u64) -> Result<()> {
        let (weight_shape, bias_shape) = match self.kind.parameter_shapes() {
            Some(shapes) => shapes,
            None => return Ok(()),
        };
        let [out, fan_in, kh, kw] = weight_shape;
        let receptive = kh * kw;
        let limit = (6.0f32 / ((fan_in * receptive + out * receptive) as f32)).sqrt();
        let data = Tensor::random(weight_shape, seed)
            .into_data()
            .into_iter()
            .map(|v| v * limit)
            .collect();
        let weights = Tensor::from_vec(weight_shape, data)?;
        self.set_parameters(weights, Tensor::filled(bias_shape, 0.0))
    }

    pub fn forward(&mut self, mode: ExecutionMode) -> Result<()> {
        let input = self.input.as_ref().ok_or_else(|| {
            uninitialized(format!("{} forward called before its input was set", self.kind))
        })?;

        let output = match &self.kind {
            LayerKind::Conv2d(conv) => {
                let (weights, bias) = self.parameters()?;
                conv.forward(input, weights, bias, mode)?
            }
            LayerKind::Linear(linear) => {
                let (weights, bias) = self.parameters()?;
                linear.forward(input, weights, bias, mode)?
            }
            LayerKind::MaxPool2d(pool) => pool.forward(input, mode),
            LayerKind::ReLU => relu::forward(input, mode),
            LayerKind::SoftMax => softmax::forward(input, mode)?,
            LayerKind::Flatten => flatten::forward(input)?,
        };

        self.output = Some(output);
        Ok(())
    }

    fn parameters(&self) -> Result<(&Tensor, &Tensor)> {
        match (&self.weights, &self.bias) {
            (Some(weights), Some(bias)) => Ok((weights, bias)),
            _ => Err(uninitialized(format!(
                "{} forward called before its weights and bias were loaded",
                self.kind
            ))),
        }
    }

    /// Reads this layer's weights then bias from `reader` as little-endian
    /// `f32` values without touching the layer. `None` for parameterless kinds.
    pub fn read_parameters<R: Read>(&self, reader: &mut R) -> Result<Option<(Tensor, Tensor)>> {
        let (weight_shape, bias_shape) = match self.kind.parameter_shapes() {
            Some(shapes) => shapes,
            None => return Ok(None),
        };
        let weights = read_tensor(reader, weight_shape)?;
        let bias = read_tensor(reader, bias_shape)?;
        Ok(Some((weights, bias)))
    }

    /// Populates weights then bias from `reader` and returns the number of
    /// bytes consumed. The layer is left untouched when the read fails.
    pub fn load_parameters<R: Read>(&mut self, reader: &mut R) -> Result<usize> {
        match self.read_parameters(reader)? {
            Some((weights, bias)) => {
                let consumed = parameter_bytes(&weights, &bias);
                self.weights = Some(weights);
                self.bias = Some(bias);
                Ok(consumed)
            }
            None => Ok(0),
        }
    }

    /// Writes the segment `load_parameters` reads back; returns bytes written.
    pub fn write_parameters<W: Write>(&self, writer: &mut W) -> Result<usize> {
        if !self.is_parameterized() {
            return Ok(0);
        }
        let (weights, bias) = self.parameters()?;
        let mut written = 0;
        for value in weights.data().iter().chain(bias.data()) {
            writer.write_all(&value.to_le_bytes())?;
            written += std::mem::size_of::<f32>();
        }
        Ok(written)
    }

    pub fn print(&self) {
        println!("{}", self);
    }
}

pub(crate) fn parameter_bytes(weights: &Tensor, bias: &Tensor) -> usize {
    (weights.len() + bias.len()) * std::mem::size_of::<f32>()
}

fn read_tensor<R: Read>(reader: &mut R, shape: Shape) -> Result<Tensor> {
    let size: usize = shape.iter().product();
    let mut bytes = vec![0u8; size * std::mem::size_of::<f32>()];
    reader.read_exact(&mut bytes)?;

    let mut data = Vec::with_capacity(size);
    for (i, chunk) in bytes.chunks_exact(4).enumerate() {
        let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if !value.is_finite() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("non-finite value {} at position {}", value, i),
            )
            .into());
        }
        data.push(value);
    }
    Tensor::from_vec(shape, data)
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        let slots = [
            ("input", &self.input),
            ("weights", &self.weights),
            ("bias", &self.bias),
            ("output", &self.output),
        ];
        for (label, tensor) in slots {
            if let Some(tensor) = tensor {
                if !tensor.is_empty() {
                    write!(f, "\n  {}: {}", label, tensor)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn window_output_len_floors() {
        assert_eq!(window_output_len(28, 3, 1, 1), 28);
        assert_eq!(window_output_len(28, 3, 1, 0), 26);
        assert_eq!(window_output_len(5, 2, 2, 0), 2);
        assert_eq!(window_output_len(2, 3, 1, 0), 0);
        assert_eq!(window_output_len(2, 3, 1, 1), 2);
    }

    #[test]
    fn overflowing_padding_is_rejected() {
        assert!(validate_window(3, 1, usize::MAX / 2 + 1).is_err());
        assert!(validate_window(3, 1, usize::MAX / 2).is_err());
        assert!(validate_window(1, 1, usize::MAX / 2).is_ok());
        assert_eq!(window_output_len(usize::MAX, 1, 1, 1), usize::MAX);
    }

    #[test]
    fn forward_without_input_is_uninitialized() {
        let mut layer = Layer::relu();
        let err = layer.forward(ExecutionMode::Sequential).unwrap_err();
        assert!(matches!(err, Error::UninitializedState(_)));
    }

    #[test]
    fn forward_without_weights_is_uninitialized() {
        let mut layer = Layer::linear(4, 2).unwrap();
        layer.set_input(Tensor::new(1, 4, 1, 1));
        let err = layer.forward(ExecutionMode::Sequential).unwrap_err();
        assert!(matches!(err, Error::UninitializedState(_)));
    }

    #[test]
    fn set_parameters_rejects_wrong_shapes() {
        let mut layer = Layer::conv2d(2, 3, 3, 1, 0).unwrap();
        let err = layer
            .set_parameters(Tensor::new(3, 2, 2, 2), Tensor::new(1, 3, 1, 1))
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
        assert!(layer.weights().is_none());
    }

    #[test]
    fn parameter_segment_roundtrip() {
        let mut source = Layer::conv2d(2, 3, 3, 1, 1).unwrap();
        source.randomize(7).unwrap();

        let mut bytes = Vec::new();
        let written = source.write_parameters(&mut bytes).unwrap();
        assert_eq!(written, source.parameter_count() * 4);

        let mut target = Layer::conv2d(2, 3, 3, 1, 1).unwrap();
        let consumed = target.load_parameters(&mut bytes.as_slice()).unwrap();
        assert_eq!(consumed, written);
        assert_eq!(target.weights(), source.weights());
        assert_eq!(target.bias(), source.bias());
    }

    #[test]
    fn short_segment_leaves_layer_untouched() {
        let mut layer = Layer::linear(2, 2).unwrap();
        layer.randomize(3).unwrap();
        let before = layer.clone();

        // Full weights but only half the bias.
        let bytes: Vec<u8> = (0..5).flat_map(|_| 9.0f32.to_le_bytes()).collect();
        assert!(layer.load_parameters(&mut bytes.as_slice()).is_err());
        assert_eq!(layer.weights(), before.weights());
        assert_eq!(layer.bias(), before.bias());
    }

    #[test]
    fn parameterless_layers_consume_nothing() {
        let mut layer = Layer::max_pool2d(2, 2, 0).unwrap();
        let bytes = [1u8, 2, 3, 4];
        assert_eq!(layer.load_parameters(&mut &bytes[..]).unwrap(), 0);
        assert!(layer.weights().is_none());
    }

    #[test]
    fn display_lists_populated_tensors() {
        let mut layer = Layer::relu();
        layer.set_input(Tensor::filled([1, 1, 1, 2], -1.0));
        layer.forward(ExecutionMode::Sequential).unwrap();
        let text = layer.to_string();
        assert!(text.starts_with("ReLU"));
        assert!(text.contains("  input: (1, 1, 1, 2)"));
        assert!(text.contains("  output: (1, 1, 1, 2)"));
        assert!(!text.contains("weights"));
    }
}
