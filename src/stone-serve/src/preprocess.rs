use image::{imageops, RgbImage};

use crate::error::ClassifyError;
use crate::profile::{ChannelOrder, PreprocessingProfile};
use crate::Timer;

/// Batch of one NHWC image, ready to be fed to a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    dims: [u64; 4],
    data: Vec<f32>,
}

impl ImageTensor {
    /// `[1, height, width, channels]`
    pub fn dims(&self) -> &[u64; 4] {
        &self.dims
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Channel values of the pixel at (`x`, `y`), in model channel order.
    pub fn pixel(&self, x: usize, y: usize) -> &[f32] {
        let width = self.dims[2] as usize;
        let start = (y * width + x) * 3;
        &self.data[start..start + 3]
    }
}

/// Decode `raw`, resize it to the profile input size and normalize its
/// channels the way the model was trained.
pub fn prepare(raw: &[u8], profile: &PreprocessingProfile) -> Result<ImageTensor, ClassifyError> {
    let image = decode(raw)?;
    Ok(shape(&image, profile))
}

/// Decode `raw` into an 8-bit RGB pixel grid. Needs no model.
pub fn decode(raw: &[u8]) -> Result<RgbImage, ClassifyError> {
    if raw.is_empty() {
        return Err(ClassifyError::MissingInput);
    }

    let mut t = Timer::new_start("Decoding image");
    let image = image::load_from_memory(raw).map_err(ClassifyError::Decode)?;
    t.stop();

    Ok(image.to_rgb8())
}

/// Resize a decoded image to the profile input size and normalize it.
pub fn shape(image: &RgbImage, profile: &PreprocessingProfile) -> ImageTensor {
    let mut t = Timer::new_start("Resizing image");
    let resized = imageops::resize(image, profile.width, profile.height, profile.filter.into());
    t.stop();

    normalize(&resized, profile)
}

fn normalize(rgb: &RgbImage, profile: &PreprocessingProfile) -> ImageTensor {
    let (width, height) = rgb.dimensions();
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);

    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0;
        let ordered = match profile.channel_order {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Bgr => [b, g, r],
        };

        for (c, value) in ordered.iter().enumerate() {
            data.push((*value as f32 * profile.scale - profile.mean[c]) / profile.std[c]);
        }
    }

    ImageTensor {
        dims: [1, height as u64, width as u64, 3],
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, Rgb};
    use std::io::Cursor;

    fn encode(image: RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn resizes_to_profile_shape() {
        let raw = encode(RgbImage::from_pixel(640, 360, Rgb([10, 20, 30])));
        let tensor = prepare(&raw, &PreprocessingProfile::resnet50_caffe()).unwrap();

        assert_eq!(tensor.dims(), &[1, 224, 224, 3]);
        assert_eq!(tensor.data().len(), 224 * 224 * 3);
    }

    #[test]
    fn caffe_profile_swaps_to_bgr_and_centers() {
        let raw = encode(RgbImage::from_pixel(8, 8, Rgb([255, 0, 0])));
        let tensor = prepare(&raw, &PreprocessingProfile::resnet50_caffe()).unwrap();

        let px = tensor.pixel(100, 100);
        assert!((px[0] - (0.0 - 103.939)).abs() < 1e-4);
        assert!((px[1] - (0.0 - 116.779)).abs() < 1e-4);
        assert!((px[2] - (255.0 - 123.68)).abs() < 1e-4);
    }

    #[test]
    fn rgb_profile_scales_and_standardizes() {
        let profile = PreprocessingProfile {
            name: "unit".to_owned(),
            version: 1,
            width: 4,
            height: 4,
            filter: crate::profile::ResizeFilter::Triangle,
            channel_order: ChannelOrder::Rgb,
            scale: 1.0 / 255.0,
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        };
        let raw = encode(RgbImage::from_pixel(4, 4, Rgb([255, 0, 255])));
        let tensor = prepare(&raw, &profile).unwrap();

        assert_eq!(tensor.dims(), &[1, 4, 4, 3]);
        let px = tensor.pixel(0, 0);
        assert!((px[0] - 1.0).abs() < 1e-5);
        assert!((px[1] + 1.0).abs() < 1e-5);
        assert!((px[2] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn decode_then_shape_matches_prepare() {
        let raw = encode(RgbImage::from_pixel(50, 30, Rgb([40, 80, 120])));
        let profile = PreprocessingProfile::resnet50_caffe();

        let decoded = decode(&raw).unwrap();
        assert_eq!(decoded.dimensions(), (50, 30));
        assert_eq!(shape(&decoded, &profile), prepare(&raw, &profile).unwrap());
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = prepare(&[0x13, 0x37, 0x00, 0xff], &PreprocessingProfile::default()).unwrap_err();
        assert!(matches!(err, ClassifyError::Decode(_)));
    }

    #[test]
    fn empty_input_is_missing() {
        let err = prepare(&[], &PreprocessingProfile::default()).unwrap_err();
        assert!(matches!(err, ClassifyError::MissingInput));
    }
}
