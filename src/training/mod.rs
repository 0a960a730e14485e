//! Training module for PerCycleGAN
//!
//! This module provides:
//! - Loss functions (adversarial, weighted L1, feature metrics)
//! - Replay buffer of generated images
//! - Linear learning-rate decay
//! - Epoch driver and loss history

mod image_pool;
pub mod losses;
mod metrics;
mod scheduler;
mod trainer;

pub use image_pool::ImagePool;
pub use losses::{build_feature_loss, ContentLoss, FeatureLoss, GanMode, PerceptualLoss};
pub use metrics::{EmaTracker, LossHistory};
pub use scheduler::LinearDecay;
pub use trainer::Trainer;
