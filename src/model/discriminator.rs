//! PatchGAN discriminator
//!
//! Classifies overlapping image patches as real or fake. The output is a
//! [batch, 1, h, w] map of per-patch scores; adversarial losses average over it.

use serde::{Deserialize, Serialize};
use tch::{nn, nn::ModuleT, Tensor};

use super::norm::{conv_config, Norm2d, NormKind};

/// Negative slope of the hidden activations
const LEAKY_SLOPE: f32 = 0.2;

/// Discriminator architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscriminatorArch {
    /// 70x70 PatchGAN (three strided layers)
    #[default]
    Basic,
    /// PatchGAN with a configurable number of strided layers
    NLayers,
}

/// Discriminator network configuration
#[derive(Debug, Clone)]
pub struct DiscriminatorConfig {
    /// Channels of the judged domain
    pub input_nc: i64,
    /// Filters in the first layer
    pub ndf: i64,
    /// Number of stride-2 layers
    pub n_layers: i64,
    /// Normalization layer
    pub norm: NormKind,
    /// Squash scores into (0, 1) for cross-entropy training
    pub use_sigmoid: bool,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            input_nc: 3,
            ndf: 64,
            n_layers: 3,
            norm: NormKind::Instance,
            use_sigmoid: false,
        }
    }
}

/// N-layer PatchGAN discriminator
#[derive(Debug)]
pub struct NLayerDiscriminator {
    config: DiscriminatorConfig,
    layers: Vec<(nn::Conv2D, Option<Norm2d>)>,
    head: nn::Conv2D,
    // fixed PReLU weight, not a parameter
    slope: Tensor,
}

impl NLayerDiscriminator {
    /// Create a new discriminator, registering its parameters under `vs`
    pub fn new(vs: &nn::Path, config: DiscriminatorConfig) -> Self {
        let ndf = config.ndf;
        let norm = config.norm;
        let bias = norm.conv_bias();

        let mut layers = Vec::with_capacity(config.n_layers as usize + 1);
        layers.push((
            nn::conv2d(vs / "conv0", config.input_nc, ndf, 4, conv_config(2, 1, true)),
            None,
        ));

        let mut mult = 1;
        for n in 1..=config.n_layers {
            let prev = mult;
            mult = (1 << n).min(8);
            // the last layer keeps the resolution
            let stride = if n == config.n_layers { 1 } else { 2 };
            let path = vs / format!("conv{}", n);
            let conv = nn::conv2d(&path, ndf * prev, ndf * mult, 4, conv_config(stride, 1, bias));
            let norm = Norm2d::new(&(vs / format!("norm{}", n)), norm, ndf * mult);
            layers.push((conv, Some(norm)));
        }

        let head = nn::conv2d(vs / "head", ndf * mult, 1, 4, conv_config(1, 1, true));

        Self {
            config,
            layers,
            head,
            slope: Tensor::from_slice(&[LEAKY_SLOPE]).to_device(vs.device()),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }

    /// Leaky ReLU with slope 0.2; tch only exposes the 0.01 default
    fn activate(&self, xs: &Tensor) -> Tensor {
        xs.prelu(&self.slope)
    }
}

impl ModuleT for NLayerDiscriminator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let mut x = xs.shallow_clone();
        for (conv, norm) in &self.layers {
            x = x.apply(conv);
            if let Some(norm) = norm {
                x = x.apply_t(norm, train);
            }
            x = self.activate(&x);
        }

        let scores = x.apply(&self.head);
        if self.config.use_sigmoid {
            scores.sigmoid()
        } else {
            scores
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    #[test]
    fn test_patch_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let disc = NLayerDiscriminator::new(
            &vs.root(),
            DiscriminatorConfig {
                ndf: 8,
                ..Default::default()
            },
        );

        // 64 -> 32 -> 16 -> 8 -> 7 -> 6
        let xs = Tensor::randn([2, 3, 64, 64], (Kind::Float, Device::Cpu));
        assert_eq!(disc.forward_t(&xs, true).size(), vec![2, 1, 6, 6]);
    }

    #[test]
    fn test_sigmoid_scores_are_probabilities() {
        let vs = VarStore::new(Device::Cpu);
        let disc = NLayerDiscriminator::new(
            &vs.root(),
            DiscriminatorConfig {
                input_nc: 1,
                ndf: 4,
                n_layers: 2,
                norm: NormKind::Batch,
                use_sigmoid: true,
            },
        );

        let xs = Tensor::randn([2, 1, 32, 32], (Kind::Float, Device::Cpu));
        let scores = disc.forward_t(&xs, true);
        assert!(scores.min().double_value(&[]) >= 0.0);
        assert!(scores.max().double_value(&[]) <= 1.0);
        assert_eq!(disc.config().n_layers, 2);
    }

    #[test]
    fn test_activation_slope() {
        let vs = VarStore::new(Device::Cpu);
        let disc = NLayerDiscriminator::new(&vs.root(), DiscriminatorConfig::default());

        let xs = Tensor::from_slice(&[-1.0f32, -0.5, 0.0, 2.0]).view([1, 4, 1, 1]);
        let expected = Tensor::from_slice(&[-0.2f32, -0.1, 0.0, 2.0]).view([1, 4, 1, 1]);
        assert!(disc.activate(&xs).allclose(&expected, 1e-6, 1e-6, false));
        // the slope is not trainable state
        assert!(!vs.variables().keys().any(|name| name.contains("slope")));
    }
}
