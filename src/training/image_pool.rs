//! Replay buffer of previously generated images
//!
//! Discriminators are trained on a mix of the newest fakes and fakes from
//! earlier steps, which keeps them from chasing the generator's latest output.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tch::Tensor;

/// Fixed-capacity pool of detached generator outputs for one domain
pub struct ImagePool<R: Rng = StdRng> {
    capacity: usize,
    images: Vec<Tensor>,
    rng: R,
}

impl ImagePool<StdRng> {
    /// Create a pool seeded from system entropy
    pub fn new(capacity: usize) -> Self {
        Self::with_rng(capacity, StdRng::from_entropy())
    }

    /// Create a pool with a reproducible random source
    pub fn seeded(capacity: usize, seed: u64) -> Self {
        Self::with_rng(capacity, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> ImagePool<R> {
    pub fn with_rng(capacity: usize, rng: R) -> Self {
        Self {
            capacity,
            images: Vec::with_capacity(capacity),
            rng,
        }
    }

    /// Exchange a batch of fresh images for a batch of pool images.
    ///
    /// Each image of the batch is handled on its own: while the pool is
    /// filling up it is stored and returned as is; once full, with
    /// probability 0.5 a random stored image is returned in its place and the
    /// slot takes the new image. The result has the input's shape and no
    /// gradient history. A pool of capacity 0 returns its input, as does an
    /// empty batch.
    pub fn query(&mut self, images: &Tensor) -> Tensor {
        if self.capacity == 0 || images.size().first().map_or(true, |&n| n == 0) {
            return images.shallow_clone();
        }

        tch::no_grad(|| {
            let batch = images.size()[0];
            let mut out = Vec::with_capacity(batch as usize);
            for i in 0..batch {
                let image = images.get(i).detach().unsqueeze(0);
                if self.images.len() < self.capacity {
                    self.images.push(image.copy());
                    out.push(image);
                } else if self.rng.gen_bool(0.5) {
                    let slot = self.rng.gen_range(0..self.capacity);
                    out.push(std::mem::replace(&mut self.images[slot], image.copy()));
                } else {
                    out.push(image);
                }
            }
            Tensor::cat(&out, 0)
        })
    }

    /// Number of stored images
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<R: Rng> std::fmt::Debug for ImagePool<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePool")
            .field("capacity", &self.capacity)
            .field("len", &self.images.len())
            .finish()
    }
}
