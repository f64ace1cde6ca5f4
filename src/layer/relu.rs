use crate::tensor::{ExecutionMode, Tensor};

pub fn forward(input: &Tensor, mode: ExecutionMode) -> Tensor {
    Tensor::from_fn(input.shape(), mode, |n, c, h, w| {
        let x = input.at(n, c, h, w);
        if x > 0.0 { x } else { 0.0 }
    })
}
