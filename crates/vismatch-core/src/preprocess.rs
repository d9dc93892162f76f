//! Image decoding and normalization into the tensor layout the extractor expects.
//!
//! Pipeline (ImageNet-style, matching a ResNet backbone):
//! 1. Decode bytes (PNG, JPEG, GIF, WebP) and convert to RGB
//! 2. Resize so the shorter side is 256 (bilinear)
//! 3. Center-crop 224x224
//! 4. Scale to [0, 1] and normalize per channel with ImageNet mean/std
//!
//! The output is channel-major (CHW).

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::config::DEFAULT_MAX_IMAGE_BYTES;

pub const RESIZE_SHORTER_SIDE: u32 = 256;
pub const CROP_SIZE: u32 = 224;
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A preprocessed image: `3 * height * width` floats in CHW order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub height: u32,
    pub width: u32,
    pub data: Vec<f32>,
}

impl ImageTensor {
    pub const CHANNELS: usize = 3;

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Where an image comes from: a file on disk or bytes already in memory
/// (an upload, or a fetched URL).
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    resize_shorter_side: u32,
    crop_size: u32,
    mean: [f32; 3],
    std: [f32; 3],
    max_bytes: u64,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImagePreprocessor {
    pub fn new() -> Self {
        Self {
            resize_shorter_side: RESIZE_SHORTER_SIDE,
            crop_size: CROP_SIZE,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    /// Reject inputs larger than `max_bytes`.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Use a different resize/crop geometry. `crop_size` is clamped to the resize target.
    pub fn with_geometry(mut self, resize_shorter_side: u32, crop_size: u32) -> Self {
        self.resize_shorter_side = resize_shorter_side.max(1);
        self.crop_size = crop_size.clamp(1, self.resize_shorter_side);
        self
    }

    pub fn preprocess(&self, source: &ImageSource) -> Result<ImageTensor, ImageError> {
        match source {
            ImageSource::Path(path) => self.preprocess_path(path),
            ImageSource::Bytes(bytes) => self.preprocess_bytes(bytes),
        }
    }

    pub fn preprocess_path(&self, path: &Path) -> Result<ImageTensor, ImageError> {
        let size = std::fs::metadata(path)
            .map_err(|e| ImageError::Read(path.to_path_buf(), e))?
            .len();
        self.check_size(size)?;
        let bytes = std::fs::read(path).map_err(|e| ImageError::Read(path.to_path_buf(), e))?;
        self.preprocess_bytes(&bytes)
    }

    pub fn preprocess_bytes(&self, bytes: &[u8]) -> Result<ImageTensor, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Invalid("empty input".into()));
        }
        self.check_size(bytes.len() as u64)?;
        let img = image::load_from_memory(bytes).map_err(|e| ImageError::Invalid(e.to_string()))?;
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(ImageError::Invalid("image has zero dimensions".into()));
        }
        Ok(self.transform(&img))
    }

    fn check_size(&self, size: u64) -> Result<(), ImageError> {
        if size > self.max_bytes {
            return Err(ImageError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    fn transform(&self, img: &DynamicImage) -> ImageTensor {
        let (width, height) = img.dimensions();
        let (new_w, new_h) = scale_shorter_side(width, height, self.resize_shorter_side);
        let resized = img.resize_exact(new_w, new_h, FilterType::Triangle);

        let crop = self.crop_size;
        let x = (new_w - crop) / 2;
        let y = (new_h - crop) / 2;
        let rgb = resized.crop_imm(x, y, crop, crop).to_rgb8();

        let plane = (crop * crop) as usize;
        let mut data = vec![0.0_f32; ImageTensor::CHANNELS * plane];
        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..ImageTensor::CHANNELS {
                let v = f32::from(pixel[c]) / 255.0;
                data[c * plane + i] = (v - self.mean[c]) / self.std[c];
            }
        }
        ImageTensor {
            height: crop,
            width: crop,
            data,
        }
    }
}

/// New (width, height) with the shorter side equal to `target`, aspect preserved.
fn scale_shorter_side(width: u32, height: u32, target: u32) -> (u32, u32) {
    let scale = |long: u32, short: u32| {
        let scaled = (u64::from(long) * u64::from(target) + u64::from(short) / 2) / u64::from(short);
        u32::try_from(scaled).unwrap_or(u32::MAX).max(target)
    };
    if width <= height {
        (target, scale(height, width))
    } else {
        (scale(width, height), target)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to read image {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("invalid image: {0}")]
    Invalid(String),
}
