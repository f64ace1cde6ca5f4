use crate::error::{configuration, Result};
use crate::layer::{validate_window, window_output_len};
use crate::tensor::{ExecutionMode, Shape, Tensor};

/// Channel-wise max pooling over square windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxPool2d {
    kernel_size: usize,
    stride: usize,
    padding: usize,
}

impl MaxPool2d {
    /// Padding may be at most half the kernel, so every window overlaps the input.
    pub fn new(kernel_size: usize, stride: usize, padding: usize) -> Result<Self> {
        validate_window(kernel_size, stride, padding)?;
        if padding > kernel_size / 2 {
            return Err(configuration(format!(
                "MaxPool2d padding {} exceeds half the kernel size {}",
                padding, kernel_size
            )));
        }
        Ok(Self { kernel_size, stride, padding })
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

    pub fn output_shape(&self, input: Shape) -> Shape {
        let [n, c, h, w] = input;
        [
            n,
            c,
            window_output_len(h, self.kernel_size, self.stride, self.padding),
            window_output_len(w, self.kernel_size, self.stride, self.padding),
        ]
    }

    /// Padding cells are skipped rather than read as zero.
    pub fn forward(&self, input: &Tensor, mode: ExecutionMode) -> Tensor {
        let out_shape = self.output_shape(input.shape());
        let in_h = input.height();
        let in_w = input.width();
        let k = self.kernel_size;

        Tensor::from_fn(out_shape, mode, |n, c, oh, ow| {
            let mut max_value = f32::NEG_INFINITY;
            for kh in 0..k {
                let ih = match (oh * self.stride + kh).checked_sub(self.padding) {
                    Some(ih) if ih < in_h => ih,
                    _ => continue,
                };
                for kw in 0..k {
                    let iw = match (ow * self.stride + kw).checked_sub(self.padding) {
                        Some(iw) if iw < in_w => iw,
                        _ => continue,
                    };
                    let value = input.at(n, c, ih, iw);
                    if value > max_value {
                        max_value = value;
                    }
                }
            }
            max_value
        })
    }
}
