//! # PerCycleGAN
//!
//! Unpaired image-to-image translation with two generators and two
//! discriminators, trained on adversarial, cycle-consistency, identity,
//! synthesis, cyclic-synthesis and feature losses.
//!
//! ## Modules
//!
//! - `data`: Unaligned two-folder image dataset and batching
//! - `model`: Networks, forward graph and the training step orchestrator
//! - `training`: Losses, replay buffer, learning-rate decay and epoch driver
//! - `utils`: Configuration, checkpoints and visuals

pub mod data;
pub mod error;
pub mod model;
pub mod training;
pub mod utils;

pub use data::{Batch, DataLoader, UnalignedDataset};
pub use error::{Error, Result};
pub use model::{NetworkFactory, NetworkId, PerCycleGan, StandardNetworks, StepResult};
pub use training::{FeatureLoss, GanMode, ImagePool, LinearDecay, Trainer};
pub use utils::{Config, LossWeights};
