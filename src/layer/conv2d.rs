//! 2D convolution (cross-correlation) with zero padding.

use crate::error::{configuration, shape_mismatch, Result};
use crate::layer::{validate_window, window_output_len};
use crate::tensor::{ExecutionMode, Shape, Tensor};

/// Convolution configuration.
///
/// Weights are laid out as `(out_channels, in_channels, kernel_size, kernel_size)`
/// and the bias as `(1, out_channels, 1, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
}

impl Conv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> Result<Self> {
        if in_channels == 0 || out_channels == 0 {
            return Err(configuration("Conv2d channel counts must be at least 1"));
        }
        validate_window(kernel_size, stride, padding)?;
        Ok(Self { in_channels, out_channels, kernel_size, stride, padding })
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    pub fn weight_shape(&self) -> Shape {
        [self.out_channels, self.in_channels, self.kernel_size, self.kernel_size]
    }

    pub fn bias_shape(&self) -> Shape {
        [1, self.out_channels, 1, 1]
    }

    pub fn output_shape(&self, input: Shape) -> Result<Shape> {
        let [n, c, h, w] = input;
        if c != self.in_channels {
            return Err(shape_mismatch(format!(
                "Conv2d expects {} input channels, got {}",
                self.in_channels, c
            )));
        }
        Ok([
            n,
            self.out_channels,
            window_output_len(h, self.kernel_size, self.stride, self.padding),
            window_output_len(w, self.kernel_size, self.stride, self.padding),
        ])
    }

    pub fn forward(&self, input: &Tensor, weights: &Tensor, bias: &Tensor, mode: ExecutionMode) -> Result<Tensor> {
        let out_shape = self.output_shape(input.shape())?;
        if weights.shape() != self.weight_shape() || bias.shape() != self.bias_shape() {
            return Err(shape_mismatch(format!(
                "Conv2d parameters have shapes {:?}/{:?}, expected {:?}/{:?}",
                weights.shape(), bias.shape(), self.weight_shape(), self.bias_shape()
            )));
        }

        let in_h = input.height();
        let in_w = input.width();
        let k = self.kernel_size;

        Ok(Tensor::from_fn(out_shape, mode, |n, oc, oh, ow| {
            let mut sum = bias.at(0, oc, 0, 0);
            for ic in 0..self.in_channels {
                for kh in 0..k {
                    // Rows that land in the padding border contribute zero.
                    let ih = match (oh * self.stride + kh).checked_sub(self.padding) {
                        Some(ih) if ih < in_h => ih,
                        _ => continue,
                    };
                    for kw in 0..k {
                        let iw = match (ow * self.stride + kw).checked_sub(self.padding) {
                            Some(iw) if iw < in_w => iw,
                            _ => continue,
                        };
                        sum += input.at(n, ic, ih, iw) * weights.at(oc, ic, kh, kw);
                    }
                }
            }
            sum
        }))
    }
}
