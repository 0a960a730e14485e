//! Unaligned image dataset
//!
//! Reads `<dataroot>/<phase>A` and `<dataroot>/<phase>B`. The two folders are
//! not paired: A is indexed in order, B is drawn at random unless
//! `serial_batches` is set.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tch::{vision::image, Kind, Tensor};

use crate::error::{Error, Result};
use crate::utils::config::{Config, Direction};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "ppm", "tga"];

/// A pair of transformed images, each [C, fine_size, fine_size] in [-1, 1]
#[derive(Debug)]
pub struct Sample {
    pub a: Tensor,
    pub b: Tensor,
    pub a_path: PathBuf,
    pub b_path: PathBuf,
}

/// Two unpaired image folders
#[derive(Debug)]
pub struct UnalignedDataset {
    a_paths: Vec<PathBuf>,
    b_paths: Vec<PathBuf>,
    a_channels: i64,
    b_channels: i64,
    load_size: i64,
    fine_size: i64,
    flip: bool,
    serial_batches: bool,
    rng: StdRng,
}

/// Sorted image files directly inside `dir`
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::Dataset(format!("{} is not a directory", dir.display())));
    }
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);
        if is_image && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

impl UnalignedDataset {
    /// Open the dataset described by `config.data`.
    ///
    /// Folder A holds the source domain for `AtoB` and the target domain for
    /// `BtoA`; channel counts follow accordingly.
    pub fn from_config(config: &Config) -> Result<Self> {
        let data = &config.data;
        let a_dir = data.dataroot.join(format!("{}A", data.phase));
        let b_dir = data.dataroot.join(format!("{}B", data.phase));
        let (a_channels, b_channels) = match data.direction {
            Direction::AtoB => (config.model.input_nc, config.model.output_nc),
            Direction::BtoA => (config.model.output_nc, config.model.input_nc),
        };
        let rng = match config.training.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(2)),
            None => StdRng::from_entropy(),
        };

        let dataset = Self {
            a_paths: list_images(&a_dir)?,
            b_paths: list_images(&b_dir)?,
            a_channels,
            b_channels,
            load_size: data.load_size,
            fine_size: data.fine_size,
            flip: !data.no_flip,
            serial_batches: data.serial_batches,
            rng,
        };
        if dataset.a_paths.is_empty() || dataset.b_paths.is_empty() {
            return Err(Error::Dataset(format!(
                "no images in {} or {}",
                a_dir.display(),
                b_dir.display()
            )));
        }

        tracing::info!(
            "Dataset: {} images in {}, {} images in {}",
            dataset.a_paths.len(),
            a_dir.display(),
            dataset.b_paths.len(),
            b_dir.display()
        );
        Ok(dataset)
    }

    /// Samples per epoch: the larger of the two folders
    pub fn len(&self) -> usize {
        self.a_paths.len().max(self.b_paths.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load and transform the `index`-th sample
    pub fn get(&mut self, index: usize) -> Result<Sample> {
        let a_path = self.a_paths[index % self.a_paths.len()].clone();
        let b_index = if self.serial_batches {
            index % self.b_paths.len()
        } else {
            self.rng.gen_range(0..self.b_paths.len())
        };
        let b_path = self.b_paths[b_index].clone();

        let a = self.load(&a_path, self.a_channels)?;
        let b = self.load(&b_path, self.b_channels)?;
        Ok(Sample { a, b, a_path, b_path })
    }

    fn load(&mut self, path: &Path, channels: i64) -> Result<Tensor> {
        let raw = image::load(path)?;
        self.transform(&raw, channels)
    }

    /// Resize a [3, H, W] u8 image to `load_size`, crop `fine_size` at a
    /// random offset, optionally flip, and scale to [-1, 1].
    pub fn transform(&mut self, raw: &Tensor, channels: i64) -> Result<Tensor> {
        let resized = image::resize(raw, self.load_size, self.load_size)?;

        let margin = self.load_size - self.fine_size;
        let top = self.rng.gen_range(0..=margin);
        let left = self.rng.gen_range(0..=margin);
        let mut cropped = resized
            .narrow(1, top, self.fine_size)
            .narrow(2, left, self.fine_size);
        if self.flip && self.rng.gen_bool(0.5) {
            cropped = cropped.flip([2]);
        }

        let scaled = cropped.to_kind(Kind::Float) / 127.5 - 1.0;
        Ok(match channels {
            1 => to_grayscale(&scaled),
            3 => scaled,
            c => {
                return Err(Error::Dataset(format!(
                    "cannot produce {}-channel images from RGB files",
                    c
                )))
            }
        })
    }
}

/// ITU-R 601 luma of a [3, H, W] image
fn to_grayscale(rgb: &Tensor) -> Tensor {
    let weights = Tensor::from_slice(&[0.299f32, 0.587, 0.114]).view([3, 1, 1]);
    (rgb * weights.to_device(rgb.device())).sum_dim_intlist([0i64].as_slice(), true, Kind::Float)
}
