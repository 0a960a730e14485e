//! Normalization layers shared by generator and discriminator

use serde::{Deserialize, Serialize};
use tch::{nn, nn::ModuleT, Tensor};

/// Normalization used after convolutions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormKind {
    Batch,
    #[default]
    Instance,
}

impl NormKind {
    /// Batch norm has its own shift, so the preceding conv drops its bias
    pub fn conv_bias(self) -> bool {
        matches!(self, NormKind::Instance)
    }
}

/// A 2D normalization layer
#[derive(Debug)]
pub enum Norm2d {
    /// Batch norm with learned scale ~ N(1, 0.02) and zero shift
    Batch(nn::BatchNorm),
    /// Instance norm without affine parameters
    Instance,
}

impl Norm2d {
    pub fn new(vs: &nn::Path, kind: NormKind, channels: i64) -> Self {
        match kind {
            NormKind::Batch => {
                let config = nn::BatchNormConfig {
                    ws_init: nn::Init::Randn {
                        mean: 1.0,
                        stdev: 0.02,
                    },
                    bs_init: nn::Init::Const(0.0),
                    ..Default::default()
                };
                Norm2d::Batch(nn::batch_norm2d(vs, channels, config))
            }
            NormKind::Instance => Norm2d::Instance,
        }
    }
}

impl ModuleT for Norm2d {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        match self {
            Norm2d::Batch(bn) => bn.forward_t(xs, train),
            Norm2d::Instance => xs.instance_norm(
                None::<Tensor>,
                None::<Tensor>,
                None::<Tensor>,
                None::<Tensor>,
                true,
                0.1,
                1e-5,
                false,
            ),
        }
    }
}

/// Conv weight init N(0, 0.02), zero bias
pub(crate) fn conv_config(stride: i64, padding: i64, bias: bool) -> nn::ConvConfig {
    nn::ConvConfig {
        stride,
        padding,
        bias,
        ws_init: nn::Init::Randn {
            mean: 0.0,
            stdev: 0.02,
        },
        bs_init: nn::Init::Const(0.0),
        ..Default::default()
    }
}
