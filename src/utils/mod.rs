//! Utility module with helper functions
//!
//! This module provides:
//! - Configuration handling
//! - Checkpoint save/load utilities
//! - Visualization helpers

pub mod checkpoint;
pub mod config;
pub mod visuals;

pub use checkpoint::{CheckpointMeta, CheckpointStore};
pub use config::{ensure_config_exists, Config, Direction, LossWeights};
pub use visuals::tensor_to_image;
