//! Preprocessing profiles.
//!
//! A profile pins the exact input transformation a trained model expects.
//! It travels with the model artifact so that swapping models cannot leave
//! the preprocessing behind.

use std::fs;
use std::path::Path;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::error::ModelLoadError;

/// File name looked up next to a model artifact.
pub const PROFILE_FILE: &str = "preprocessing.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingProfile {
    /// Profile name, e.g. `resnet50-caffe`
    pub name: String,

    /// Profile revision, bumped whenever any field below changes
    pub version: u32,

    /// Model input width
    pub width: u32,

    /// Model input height
    pub height: u32,

    /// Interpolation used when resizing to the input size
    pub filter: ResizeFilter,

    /// Channel order of the model input
    pub channel_order: ChannelOrder,

    /// Factor applied to raw 0-255 channel values before centering
    pub scale: f32,

    /// Per-channel mean, in `channel_order`
    pub mean: [f32; 3],

    /// Per-channel standard deviation, in `channel_order`
    pub std: [f32; 3],
}

impl PreprocessingProfile {
    /// Keras `applications.resnet.preprocess_input` ("caffe" mode) on
    /// 224x224 inputs loaded with nearest-neighbour resizing: RGB to BGR,
    /// zero-centered on the ImageNet means, no scaling.
    pub fn resnet50_caffe() -> Self {
        PreprocessingProfile {
            name: "resnet50-caffe".to_owned(),
            version: 1,
            width: 224,
            height: 224,
            filter: ResizeFilter::Nearest,
            channel_order: ChannelOrder::Bgr,
            scale: 1.0,
            mean: [103.939, 116.779, 123.68],
            std: [1.0, 1.0, 1.0],
        }
    }

    /// Profile stored in `dir`, or the ResNet50 default when there is none.
    pub fn for_model_dir(dir: &Path) -> Result<Self, ModelLoadError> {
        let path = dir.join(PROFILE_FILE);
        if !path.exists() {
            return Ok(Self::resnet50_caffe());
        }

        let raw = fs::read_to_string(&path).map_err(|source| ModelLoadError::Profile {
            path: path.clone(),
            source,
        })?;

        serde_json::from_str(&raw).map_err(|source| ModelLoadError::ProfileFormat { path, source })
    }

    /// Number of `f32` values in one input tensor.
    pub fn tensor_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl Default for PreprocessingProfile {
    fn default() -> Self {
        Self::resnet50_caffe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_profile_file_pins_resnet50() {
        let dir = tempfile::tempdir().unwrap();
        let profile = PreprocessingProfile::for_model_dir(dir.path()).unwrap();

        assert_eq!(profile, PreprocessingProfile::resnet50_caffe());
        assert_eq!(profile.tensor_len(), 224 * 224 * 3);
    }

    #[test]
    fn reads_profile_next_to_model() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(PROFILE_FILE),
            r#"{
                "name": "efficientnet-torch",
                "version": 2,
                "width": 240,
                "height": 240,
                "filter": "triangle",
                "channel_order": "rgb",
                "scale": 0.00392157,
                "mean": [0.485, 0.456, 0.406],
                "std": [0.229, 0.224, 0.225]
            }"#,
        )
        .unwrap();

        let profile = PreprocessingProfile::for_model_dir(dir.path()).unwrap();
        assert_eq!(profile.name, "efficientnet-torch");
        assert_eq!(profile.version, 2);
        assert_eq!(profile.channel_order, ChannelOrder::Rgb);
        assert_eq!(profile.filter, ResizeFilter::Triangle);
    }

    #[test]
    fn malformed_profile_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PROFILE_FILE), r#"{"name": "half"}"#).unwrap();

        let err = PreprocessingProfile::for_model_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ModelLoadError::ProfileFormat { .. }));
    }
}
