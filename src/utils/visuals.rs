//! Conversion of network outputs into displayable images

use tch::{Kind, Tensor};

/// First image of a [N, C, H, W] batch in [-1, 1] as an [H, W, 3] u8 tensor.
///
/// Single-channel images are repeated over RGB; extra channels beyond the
/// third are dropped.
pub fn tensor_to_image(batch: &Tensor) -> Tensor {
    let image = batch.detach().to_device(tch::Device::Cpu).get(0);
    let channels = image.size()[0];
    let rgb = match channels {
        1 => image.repeat([3, 1, 1]),
        c if c >= 3 => image.narrow(0, 0, 3),
        _ => Tensor::cat(&[&image, &image.narrow(0, 0, 1)], 0),
    };
    ((rgb + 1.0) * 127.5)
        .clamp(0.0, 255.0)
        .permute([1, 2, 0])
        .to_kind(Kind::Uint8)
}
