//! Data module for unpaired image translation
//!
//! This module provides:
//! - The `Batch` handed to the model each step
//! - An unaligned two-folder image dataset
//! - DataLoader for batching samples

mod dataset;
mod loader;

pub use dataset::{list_images, Sample, UnalignedDataset};
pub use loader::DataLoader;

use std::path::PathBuf;

use tch::Tensor;

/// One step's worth of images from both domains, shaped [N, C, H, W]
#[derive(Debug)]
pub struct Batch {
    pub a: Tensor,
    pub b: Tensor,
    pub a_paths: Vec<PathBuf>,
    pub b_paths: Vec<PathBuf>,
}

impl Batch {
    /// Batch without source files, e.g. synthetic tensors
    pub fn from_tensors(a: Tensor, b: Tensor) -> Self {
        Self {
            a,
            b,
            a_paths: Vec::new(),
            b_paths: Vec::new(),
        }
    }

    /// Exchange the two domains
    pub fn swapped(self) -> Self {
        Self {
            a: self.b,
            b: self.a,
            a_paths: self.b_paths,
            b_paths: self.a_paths,
        }
    }

    /// Number of images per domain
    pub fn len(&self) -> usize {
        self.a.size().first().copied().unwrap_or(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn test_swapped_exchanges_domains() {
        let batch = Batch {
            a: Tensor::zeros([2, 1, 4, 4], (Kind::Float, Device::Cpu)),
            b: Tensor::ones([2, 3, 4, 4], (Kind::Float, Device::Cpu)),
            a_paths: vec![PathBuf::from("a.png")],
            b_paths: vec![PathBuf::from("b.png")],
        };
        let swapped = batch.swapped();
        assert_eq!(swapped.a.size(), vec![2, 3, 4, 4]);
        assert_eq!(swapped.a_paths, vec![PathBuf::from("b.png")]);
        assert_eq!(swapped.len(), 2);
    }
}
