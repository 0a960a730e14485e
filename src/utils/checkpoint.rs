//! Checkpoint save/load utilities
//!
//! Each network is stored in its own tensor archive named
//! `<label>_net_<network>.pt` inside the experiment directory, next to a
//! `<label>_meta.json` describing the save.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tch::{nn::VarStore, Tensor};

use crate::error::{Error, Result};
use crate::model::NetworkId;

/// Checkpoint metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Label the networks were saved under
    pub label: String,
    /// Learning rate at save time
    pub learning_rate: f64,
    /// Timestamp of checkpoint
    pub timestamp: String,
}

/// Directory of labelled checkpoints for one experiment
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Archive path of one network under `label`
    pub fn network_path(&self, label: &str, network: NetworkId) -> PathBuf {
        self.dir.join(format!("{}_net_{}.pt", label, network.name()))
    }

    fn meta_path(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{}_meta.json", label))
    }

    /// Fail unless all four archives exist for `label`
    pub fn ensure_complete(&self, label: &str) -> Result<()> {
        for network in NetworkId::ALL {
            let path = self.network_path(label, network);
            if !path.is_file() {
                return Err(Error::MissingCheckpoint {
                    network: network.name().to_string(),
                    label: label.to_string(),
                    path,
                });
            }
        }
        Ok(())
    }

    /// Write the metadata file for `label`
    pub fn save_meta(&self, label: &str, learning_rate: f64) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let meta = CheckpointMeta {
            label: label.to_string(),
            learning_rate,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        std::fs::write(self.meta_path(label), serde_json::to_string_pretty(&meta)?)?;
        Ok(())
    }

    /// Read the metadata file for `label`
    pub fn load_meta(&self, label: &str) -> Result<CheckpointMeta> {
        let content = std::fs::read_to_string(self.meta_path(label))?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn scoped<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    name.strip_prefix(prefix)?.strip_prefix('.')
}

/// Save the variables of `vs` living under `prefix` to `path`.
///
/// Names are stored relative to the prefix, so a network saved from one
/// store loads into any store that registers it under another prefix.
pub fn save_network(vs: &VarStore, prefix: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let named: Vec<(String, Tensor)> = vs
        .variables()
        .into_iter()
        .filter_map(|(name, tensor)| scoped(&name, prefix).map(|local| (local.to_string(), tensor)))
        .collect();
    Tensor::save_multi(&named, path)?;
    tracing::debug!("Saved {} tensors of {} to {}", named.len(), prefix, path.display());
    Ok(())
}

/// Load every variable of `vs` under `prefix` from `path`.
///
/// All parameters must be present in the archive; nothing is copied unless
/// they are.
pub fn load_network(vs: &VarStore, prefix: &str, path: &Path) -> Result<()> {
    let stored: HashMap<String, Tensor> = Tensor::load_multi_with_device(path, vs.device())?
        .into_iter()
        .collect();

    let mut targets = Vec::new();
    for (name, var) in vs.variables() {
        if let Some(local) = scoped(&name, prefix) {
            let source = stored.get(local).ok_or_else(|| Error::MissingParameter {
                path: path.to_path_buf(),
                name: local.to_string(),
            })?;
            if source.size() != var.size() {
                return Err(Error::shape(format!("{} in {}", name, path.display()), &var.size(), &source.size()));
            }
            targets.push((var, source));
        }
    }

    tch::no_grad(|| -> Result<()> {
        for (mut var, source) in targets {
            var.f_copy_(source)?;
        }
        Ok(())
    })?;
    tracing::debug!("Loaded {} from {}", prefix, path.display());
    Ok(())
}
