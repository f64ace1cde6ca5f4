use std::fmt;
use std::ops::{Index, IndexMut};

use rand::distributions::{Distribution, Uniform};
use rand_pcg::Pcg64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{shape_mismatch, Error, Result};

/// Number of values shown by the `Display` impl before eliding.
const DISPLAY_SAMPLE: usize = 8;

/// Tensor dimensions in (batch, channel, height, width) order.
pub type Shape = [usize; 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

/// Dense 4-D array of `f32` stored row-major (width varies fastest).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Shape,
}

impl Tensor {

    pub fn new(n: usize, c: usize, h: usize, w: usize) -> Tensor {
        Self::filled([n, c, h, w], 0.0)
    }

    pub fn filled(shape: Shape, value: f32) -> Tensor {
        let size: usize = shape.iter().product();
        Tensor { data: vec![value; size], shape }
    }

    pub fn from_vec(shape: Shape, data: Vec<f32>) -> Result<Tensor> {
        let expected_size: usize = shape.iter().product();
        if data.len() != expected_size {
            return Err(shape_mismatch(format!(
                "data length {} doesn't match shape {:?} (expected {})",
                data.len(), shape, expected_size
            )));
        }
        Ok(Tensor { data, shape })
    }

    pub fn random(shape: Shape, seed: u64) -> Tensor {
        use rand::SeedableRng;
        let mut rng = Pcg64::seed_from_u64(seed);
        let uniform = Uniform::new(-1.0f32, 1.0f32);
        let size: usize = shape.iter().product();
        let data = (0..size)
            .map(|_| uniform.sample(&mut rng))
            .collect::<Vec<f32>>();

        Tensor { data, shape }
    }

    /// Builds a tensor where each element is computed independently from its
    /// `(n, c, h, w)` coordinate. In parallel mode the flat index space is
    /// split across the current rayon pool.
    pub fn from_fn<F>(shape: Shape, mode: ExecutionMode, f: F) -> Tensor
    where
        F: Fn(usize, usize, usize, usize) -> f32 + Sync,
    {
        let [_, channels, height, width] = shape;
        let size: usize = shape.iter().product();
        let mut data = vec![0.0f32; size];

        let eval = |i: usize| {
            let w = i % width;
            let rest = i / width;
            let h = rest % height;
            let rest = rest / height;
            f(rest / channels, rest % channels, h, w)
        };

        match mode {
            ExecutionMode::Sequential => data
                .iter_mut()
                .enumerate()
                .for_each(|(i, v)| *v = eval(i)),
            ExecutionMode::Parallel => data
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, v)| *v = eval(i)),
        }

        Tensor { data, shape }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn batch(&self) -> usize {
        self.shape[0]
    }

    pub fn channels(&self) -> usize {
        self.shape[1]
    }

    pub fn height(&self) -> usize {
        self.shape[2]
    }

    pub fn width(&self) -> usize {
        self.shape[3]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the buffer holds no elements. A zero-filled tensor is not empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn offset(&self, n: usize, c: usize, h: usize, w: usize) -> Result<usize> {
        let [dn, dc, dh, dw] = self.shape;
        if n >= dn || c >= dc || h >= dh || w >= dw {
            return Err(Error::IndexOutOfBounds { index: [n, c, h, w], shape: self.shape });
        }
        Ok(((n * dc + c) * dh + h) * dw + w)
    }

    pub fn get(&self, n: usize, c: usize, h: usize, w: usize) -> Result<f32> {
        let offset = self.offset(n, c, h, w)?;
        Ok(self.data[offset])
    }

    pub fn set(&mut self, n: usize, c: usize, h: usize, w: usize, value: f32) -> Result<()> {
        let offset = self.offset(n, c, h, w)?;
        self.data[offset] = value;
        Ok(())
    }

    // Callers must have validated the coordinate against the shape already.
    #[inline]
    pub(crate) fn at(&self, n: usize, c: usize, h: usize, w: usize) -> f32 {
        let [_, dc, dh, dw] = self.shape;
        self.data[((n * dc + c) * dh + h) * dw + w]
    }

    pub fn reshape(self, shape: Shape) -> Result<Tensor> {
        let size: usize = shape.iter().product();
        if size != self.data.len() {
            return Err(shape_mismatch(format!(
                "cannot reshape {:?} ({} values) into {:?} ({} values)",
                self.shape, self.data.len(), shape, size
            )));
        }
        Ok(Tensor { data: self.data, shape })
    }

    /// Flat index of the largest element, `None` for an empty tensor.
    pub fn argmax(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &val) in self.data.iter().enumerate() {
            match best {
                Some((_, max_val)) if val <= max_val => {}
                _ => best = Some((i, val)),
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn print(&self) {
        println!("{}", self);
    }

}

impl Index<[usize; 4]> for Tensor {
    type Output = f32;

    fn index(&self, index: [usize; 4]) -> &f32 {
        let [n, c, h, w] = index;
        match self.offset(n, c, h, w) {
            Ok(offset) => &self.data[offset],
            Err(e) => panic!("{}", e),
        }
    }
}

impl IndexMut<[usize; 4]> for Tensor {
    fn index_mut(&mut self, index: [usize; 4]) -> &mut f32 {
        let [n, c, h, w] = index;
        match self.offset(n, c, h, w) {
            Ok(offset) => &mut self.data[offset],
            Err(e) => panic!("{}", e),
        }
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [n, c, h, w] = self.shape;
        write!(f, "({}, {}, {}, {}) [", n, c, h, w)?;
        for (i, v) in self.data.iter().take(DISPLAY_SAMPLE).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.5}", v)?;
        }
        if self.data.len() > DISPLAY_SAMPLE {
            write!(f, ", ... {} more", self.data.len() - DISPLAY_SAMPLE)?;
        }
        write!(f, "]")
    }
}
