//! DataLoader for batching and iterating over the image dataset
//!
//! Provides batching for training with support for:
//! - Random shuffling of the A index order per epoch
//! - Iteration over `Result<Batch>` items

use rand::seq::SliceRandom;
use tch::Tensor;

use super::{Batch, UnalignedDataset};
use crate::error::Result;

/// DataLoader for iterating over batched image pairs
pub struct DataLoader {
    dataset: UnalignedDataset,
    /// Batch size
    batch_size: usize,
    /// Whether to shuffle sample order each epoch
    shuffle: bool,
    /// Current indices for iteration
    indices: Vec<usize>,
    /// Current position in iteration
    current_idx: usize,
}

impl DataLoader {
    /// Create a new DataLoader
    ///
    /// # Arguments
    ///
    /// * `dataset` - Source of image pairs
    /// * `batch_size` - Number of pairs per batch
    /// * `shuffle` - Whether to shuffle sample order each epoch
    pub fn new(dataset: UnalignedDataset, batch_size: usize, shuffle: bool) -> Self {
        let indices: Vec<usize> = (0..dataset.len()).collect();

        let mut loader = Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle,
            indices,
            current_idx: 0,
        };

        if shuffle {
            loader.shuffle_indices();
        }

        loader
    }

    /// Get the number of batches per epoch
    pub fn num_batches(&self) -> usize {
        (self.indices.len() + self.batch_size - 1) / self.batch_size
    }

    /// Get total number of samples
    pub fn num_samples(&self) -> usize {
        self.indices.len()
    }

    fn shuffle_indices(&mut self) {
        let mut rng = rand::thread_rng();
        self.indices.shuffle(&mut rng);
    }

    /// Reset for new epoch
    pub fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            self.shuffle_indices();
        }
    }

    /// Get next batch
    ///
    /// Returns None when epoch is complete
    pub fn next_batch(&mut self) -> Option<Result<Batch>> {
        let start = self.current_idx;
        if start >= self.indices.len() {
            return None;
        }
        let end = (start + self.batch_size).min(self.indices.len());
        self.current_idx = end;

        let indices = self.indices[start..end].to_vec();
        Some(self.collect(&indices))
    }

    fn collect(&mut self, indices: &[usize]) -> Result<Batch> {
        let mut a = Vec::with_capacity(indices.len());
        let mut b = Vec::with_capacity(indices.len());
        let mut a_paths = Vec::with_capacity(indices.len());
        let mut b_paths = Vec::with_capacity(indices.len());

        for &index in indices {
            let sample = self.dataset.get(index)?;
            a.push(sample.a);
            b.push(sample.b);
            a_paths.push(sample.a_path);
            b_paths.push(sample.b_path);
        }

        Ok(Batch {
            a: Tensor::stack(&a, 0),
            b: Tensor::stack(&b, 0),
            a_paths,
            b_paths,
        })
    }
}

impl Iterator for DataLoader {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config::Config;
    use std::path::Path;
    use tch::{vision::image, Device, Kind};
    use tempfile::tempdir;

    fn dataset(root: &Path, count: usize) -> UnalignedDataset {
        for domain in ["trainA", "trainB"] {
            let dir = root.join(domain);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..count {
                let img = Tensor::zeros([3, 8, 8], (Kind::Uint8, Device::Cpu));
                image::save(&img, dir.join(format!("{}.png", i))).unwrap();
            }
        }
        let mut config = Config::default();
        config.data.dataroot = root.to_path_buf();
        config.data.load_size = 8;
        config.data.fine_size = 8;
        UnalignedDataset::from_config(&config).unwrap()
    }

    #[test]
    fn test_batches_cover_epoch() {
        let dir = tempdir().unwrap();
        let mut loader = DataLoader::new(dataset(dir.path(), 5), 2, true);
        assert_eq!(loader.num_batches(), 3);

        let sizes: Vec<i64> = loader.by_ref().map(|batch| batch.unwrap().a.size()[0]).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(loader.next_batch().is_none());

        loader.reset();
        let batch = loader.next_batch().unwrap().unwrap();
        assert_eq!(batch.b.size(), vec![2, 3, 8, 8]);
        assert_eq!(batch.a_paths.len(), 2);
    }
}
