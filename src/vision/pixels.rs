//! Decoded pixel buffers handed to the engine

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{OcrError, OcrResult};

/// Pixel layout of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 8-bit grayscale
    Gray8,
    /// 8-bit RGB
    Rgb8,
    /// 8-bit RGBA
    Rgba8,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// A decoded image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelBuffer {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    pub format: PixelFormat,
    /// Raw row-major pixel data
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Create a new pixel buffer
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    /// Get dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Check that the buffer is non-empty and its length matches its metadata
    pub fn validate(&self) -> OcrResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(OcrError::ImageLoad(format!(
                "image has zero size ({}x{})",
                self.width, self.height
            )));
        }

        let expected = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|n| n.checked_mul(self.format.channels()))
            .ok_or_else(|| OcrError::ImageLoad("image dimensions overflow".to_string()))?;

        if self.data.len() != expected {
            return Err(OcrError::ImageLoad(format!(
                "expected {} bytes for {}x{} {:?}, got {}",
                expected,
                self.width,
                self.height,
                self.format,
                self.data.len()
            )));
        }

        Ok(())
    }
}

impl From<GrayImage> for PixelBuffer {
    fn from(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, PixelFormat::Gray8)
    }
}

impl From<RgbImage> for PixelBuffer {
    fn from(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, PixelFormat::Rgb8)
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, PixelFormat::Rgba8)
    }
}

impl From<DynamicImage> for PixelBuffer {
    fn from(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(gray) => gray.into(),
            DynamicImage::ImageRgb8(rgb) => rgb.into(),
            other => other.into_rgba8().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_buffer() {
        let buffer = PixelBuffer::new(vec![0; 4 * 3 * 3], 4, 3, PixelFormat::Rgb8);
        assert!(buffer.validate().is_ok());
        assert_eq!(buffer.dimensions(), (4, 3));
    }

    #[test]
    fn test_zero_size_rejected() {
        let buffer = PixelBuffer::new(vec![], 0, 10, PixelFormat::Gray8);
        assert!(matches!(buffer.validate(), Err(OcrError::ImageLoad(_))));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let buffer = PixelBuffer::new(vec![0; 10], 2, 2, PixelFormat::Rgba8);
        let err = buffer.validate().unwrap_err();
        assert!(matches!(err, OcrError::ImageLoad(ref msg) if msg.contains("expected 16 bytes")));
    }

    #[test]
    fn test_from_image_crate() {
        let gray = GrayImage::new(5, 4);
        let buffer: PixelBuffer = gray.into();
        assert_eq!(buffer.format, PixelFormat::Gray8);
        assert_eq!(buffer.data.len(), 20);

        let dynamic = DynamicImage::new_luma_a8(3, 3);
        let buffer: PixelBuffer = dynamic.into();
        assert_eq!(buffer.format, PixelFormat::Rgba8);
        assert!(buffer.validate().is_ok());
    }
}
