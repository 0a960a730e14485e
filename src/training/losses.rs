//! Loss functions for PerCycleGAN training
//!
//! Adversarial losses (least-squares or binary cross-entropy), weighted L1
//! terms for cycle / identity / synthesis / cyclic-synthesis, and the
//! pluggable feature metric behind the perceptual terms.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tch::{nn, nn::ModuleT, Device, Reduction, Tensor};

use crate::error::Result;
use crate::utils::config::{ContentLossKind, LossWeights};

/// Adversarial objective, fixed for the whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GanMode {
    /// Mean squared error against the constant label
    #[default]
    #[serde(rename = "lsgan")]
    LeastSquares,
    /// Binary cross-entropy; the discriminator ends in a sigmoid
    #[serde(rename = "vanilla")]
    Vanilla,
}

impl GanMode {
    /// Whether discriminators must squash their output into (0, 1)
    pub fn needs_sigmoid(self) -> bool {
        matches!(self, GanMode::Vanilla)
    }

    /// Loss of `prediction` against a constant real (1) or fake (0) label
    /// broadcast to the prediction's shape.
    pub fn loss(self, prediction: &Tensor, target_is_real: bool) -> Tensor {
        let target = if target_is_real {
            Tensor::ones_like(prediction)
        } else {
            Tensor::zeros_like(prediction)
        };
        match self {
            GanMode::LeastSquares => prediction.mse_loss(&target, Reduction::Mean),
            GanMode::Vanilla => {
                prediction.binary_cross_entropy::<Tensor>(&target, None, Reduction::Mean)
            }
        }
    }
}

/// Discriminator loss: 0.5 * (loss(real, 1) + loss(fake, 0))
///
/// `pred_fake` must come from a detached fake so no gradient reaches the
/// generators.
pub fn discriminator_loss(mode: GanMode, pred_real: &Tensor, pred_fake: &Tensor) -> Tensor {
    (mode.loss(pred_real, true) + mode.loss(pred_fake, false)) * 0.5
}

/// Weighted mean absolute error between two tensors of the same shape
pub fn weighted_l1(input: &Tensor, target: &Tensor, weight: f64) -> Tensor {
    input.l1_loss(target, Reduction::Mean) * weight
}

/// Distance between two images used by the six feature-loss terms
pub trait FeatureLoss {
    fn get_loss(&self, fake: &Tensor, real: &Tensor) -> Tensor;
}

/// L1 distance in pixel space
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentLoss;

impl FeatureLoss for ContentLoss {
    fn get_loss(&self, fake: &Tensor, real: &Tensor) -> Tensor {
        fake.l1_loss(real, Reduction::Mean)
    }
}

/// MSE between features of a frozen extractor network
///
/// Only the first argument receives gradients.
pub struct PerceptualLoss {
    extractor: Box<dyn ModuleT>,
    // keeps the extractor's parameters alive
    _vs: nn::VarStore,
}

impl PerceptualLoss {
    /// Wrap an extractor whose parameters live in `vs`. The store is frozen.
    pub fn new(extractor: Box<dyn ModuleT>, mut vs: nn::VarStore) -> Self {
        vs.freeze();
        Self { extractor, _vs: vs }
    }

    /// Build the default convolutional extractor, optionally loading weights
    pub fn with_default_extractor(
        input_nc: i64,
        device: Device,
        weights: Option<&Path>,
    ) -> Result<Self> {
        let mut vs = nn::VarStore::new(device);
        let extractor = feature_extractor(&(vs.root() / "features"), input_nc);
        if let Some(path) = weights {
            vs.load(path)?;
            tracing::info!("Loaded feature extractor weights from {}", path.display());
        } else {
            tracing::warn!("Perceptual loss uses a randomly initialized feature extractor");
        }
        Ok(Self::new(Box::new(extractor), vs))
    }
}

impl std::fmt::Debug for PerceptualLoss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerceptualLoss")
            .field("extractor", &self.extractor)
            .finish()
    }
}

impl FeatureLoss for PerceptualLoss {
    fn get_loss(&self, fake: &Tensor, real: &Tensor) -> Tensor {
        let f_fake = self.extractor.forward_t(fake, false);
        let f_real = self.extractor.forward_t(real, false).detach();
        f_fake.mse_loss(&f_real, Reduction::Mean)
    }
}

/// Two VGG-style conv blocks, the usual depth for a content loss
fn feature_extractor(vs: &nn::Path, input_nc: i64) -> nn::SequentialT {
    let conv = nn::ConvConfig {
        padding: 1,
        ..Default::default()
    };
    nn::seq_t()
        .add(nn::conv2d(vs / "conv1_1", input_nc, 64, 3, conv))
        .add_fn(|xs| xs.relu())
        .add(nn::conv2d(vs / "conv1_2", 64, 64, 3, conv))
        .add_fn(|xs| xs.relu())
        .add_fn(|xs| xs.max_pool2d_default(2))
        .add(nn::conv2d(vs / "conv2_1", 64, 128, 3, conv))
        .add_fn(|xs| xs.relu())
        .add(nn::conv2d(vs / "conv2_2", 128, 128, 3, conv))
}

/// Feature metric selected by the configuration
pub fn build_feature_loss(
    weights: &LossWeights,
    input_nc: i64,
    device: Device,
) -> Result<Box<dyn FeatureLoss>> {
    Ok(match weights.content_loss {
        ContentLossKind::L1 => Box::new(ContentLoss),
        ContentLossKind::Perceptual => Box::new(PerceptualLoss::with_default_extractor(
            input_nc,
            device,
            weights.feature_weights.as_deref(),
        )?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    fn full(value: f64) -> Tensor {
        Tensor::full([2, 1, 4, 4], value, (Kind::Float, Device::Cpu))
    }

    #[test]
    fn test_adversarial_loss_is_scalar() {
        let prediction = Tensor::randn([3, 1, 6, 6], (Kind::Float, Device::Cpu));
        for mode in [GanMode::LeastSquares, GanMode::Vanilla] {
            let loss = mode.loss(&prediction.sigmoid(), true);
            assert_eq!(loss.size(), Vec::<i64>::new());
        }
    }

    #[test]
    fn test_lsgan_against_half() {
        let loss = GanMode::LeastSquares.loss(&full(0.5), true);
        assert!((loss.double_value(&[]) - 0.25).abs() < 1e-7);

        let loss = GanMode::LeastSquares.loss(&full(0.5), false);
        assert!((loss.double_value(&[]) - 0.25).abs() < 1e-7);
    }

    #[test]
    fn test_perfect_discriminator() {
        for mode in [GanMode::LeastSquares, GanMode::Vanilla] {
            let loss = discriminator_loss(mode, &full(1.0), &full(0.0));
            assert_eq!(loss.double_value(&[]), 0.0);
        }
    }

    #[test]
    fn test_vanilla_penalizes_fooled_discriminator() {
        let fooled = discriminator_loss(GanMode::Vanilla, &full(0.1), &full(0.9));
        let sharp = discriminator_loss(GanMode::Vanilla, &full(0.9), &full(0.1));
        assert!(fooled.double_value(&[]) > sharp.double_value(&[]));
    }

    #[test]
    fn test_weighted_l1() {
        let loss = weighted_l1(&full(0.0), &full(1.0), 3.0);
        assert!((loss.double_value(&[]) - 3.0).abs() < 1e-7);

        let zero = weighted_l1(&full(0.0), &full(1.0), 0.0);
        assert_eq!(zero.double_value(&[]), 0.0);
    }

    #[test]
    fn test_content_loss() {
        let loss = ContentLoss.get_loss(&full(-1.0), &full(1.0));
        assert!((loss.double_value(&[]) - 2.0).abs() < 1e-7);
    }

    #[test]
    fn test_perceptual_loss_only_differentiates_fake() {
        let loss_fn = PerceptualLoss::with_default_extractor(3, Device::Cpu, None).unwrap();
        let fake = Tensor::randn([1, 3, 8, 8], (Kind::Float, Device::Cpu)).set_requires_grad(true);
        let real = Tensor::randn([1, 3, 8, 8], (Kind::Float, Device::Cpu)).set_requires_grad(true);

        let loss = loss_fn.get_loss(&fake, &real);
        loss.backward();

        assert!(loss.double_value(&[]) >= 0.0);
        assert!(fake.grad().defined());
        assert!(!real.grad().defined());
    }
}
