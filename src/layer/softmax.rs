//! Numerically stable softmax over a single sequence.
//!
//! The sequence is the flat buffer of a batch-of-one tensor, which covers both a
//! `(1, 1, H, 1)` column and the `(1, out_features, 1, 1)` output of `Linear`.

use crate::error::{shape_mismatch, Result};
use crate::tensor::{ExecutionMode, Shape, Tensor};

pub fn output_shape(input: Shape) -> Result<Shape> {
    let [n, c, h, w] = input;
    if n > 1 {
        return Err(shape_mismatch(format!(
            "SoftMax expects a single sequence, got batch of {} in shape {:?}",
            n, input
        )));
    }
    Ok([1, 1, n * c * h * w, 1])
}

pub fn forward(input: &Tensor, mode: ExecutionMode) -> Result<Tensor> {
    let out_shape = output_shape(input.shape())?;
    let values = input.data();
    if values.is_empty() {
        return Ok(Tensor::filled(out_shape, 0.0));
    }

    // Both reductions finish before any output cell is written.
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f64 = values.iter().map(|&x| f64::from((x - max).exp())).sum();

    Ok(Tensor::from_fn(out_shape, mode, |_, _, h, _| {
        (f64::from((values[h] - max).exp()) / sum) as f32
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn uniform_input_gives_uniform_distribution() {
        let input = Tensor::filled([1, 1, 4, 1], 3.0);
        let out = forward(&input, ExecutionMode::Sequential).unwrap();
        for &p in out.data() {
            assert_relative_eq!(p, 0.25, epsilon = 1e-7);
        }
    }

    #[test]
    fn large_inputs_do_not_overflow() {
        let input = Tensor::from_vec([1, 1, 3, 1], vec![1000.0, 1000.0, 990.0]).unwrap();
        let out = forward(&input, ExecutionMode::Sequential).unwrap();
        assert!(out.data().iter().all(|p| p.is_finite()));
        assert!(out.get(0, 0, 0, 0).unwrap() > out.get(0, 0, 2, 0).unwrap());
    }

    #[test]
    fn linear_head_layout_is_accepted() {
        let input = Tensor::from_vec([1, 3, 1, 1], vec![0.0, 0.0, 0.0]).unwrap();
        let out = forward(&input, ExecutionMode::Sequential).unwrap();
        assert_eq!(out.shape(), [1, 1, 3, 1]);
    }

    #[test]
    fn batched_input_is_rejected() {
        let input = Tensor::new(2, 1, 3, 1);
        assert!(forward(&input, ExecutionMode::Sequential).is_err());
    }
}
