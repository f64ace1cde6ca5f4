use crate::error::{configuration, shape_mismatch, Result};
use crate::tensor::{ExecutionMode, Shape, Tensor};

/// Fully connected layer. Each batch element's `(C, H, W)` slice is read as a
/// flat feature vector; weights are `(out_features, in_features, 1, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Linear {
    in_features: usize,
    out_features: usize,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize) -> Result<Self> {
        if in_features == 0 || out_features == 0 {
            return Err(configuration("Linear feature counts must be at least 1"));
        }
        Ok(Self { in_features, out_features })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn weight_shape(&self) -> Shape {
        [self.out_features, self.in_features, 1, 1]
    }

    pub fn bias_shape(&self) -> Shape {
        [1, self.out_features, 1, 1]
    }

    pub fn output_shape(&self, input: Shape) -> Result<Shape> {
        let [n, c, h, w] = input;
        let features = c * h * w;
        if features != self.in_features {
            return Err(shape_mismatch(format!(
                "Linear expects {} input features, got {} from shape {:?}",
                self.in_features, features, input
            )));
        }
        Ok([n, self.out_features, 1, 1])
    }

    pub fn forward(&self, input: &Tensor, weights: &Tensor, bias: &Tensor, mode: ExecutionMode) -> Result<Tensor> {
        let out_shape = self.output_shape(input.shape())?;
        if weights.shape() != self.weight_shape() || bias.shape() != self.bias_shape() {
            return Err(shape_mismatch(format!(
                "Linear parameters have shapes {:?}/{:?}, expected {:?}/{:?}",
                weights.shape(), bias.shape(), self.weight_shape(), self.bias_shape()
            )));
        }

        let features = self.in_features;
        let x = input.data();
        let w = weights.data();
        let b = bias.data();

        Ok(Tensor::from_fn(out_shape, mode, |n, o, _, _| {
            let row = &w[o * features..(o + 1) * features];
            let sample = &x[n * features..(n + 1) * features];
            let dot: f32 = row.iter().zip(sample).map(|(wi, xi)| wi * xi).sum();
            dot + b[o]
        }))
    }
}
