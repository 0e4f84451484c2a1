use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageError, ImageReader, RgbaImage};

use crate::gpu::MipLevel;

use super::ResourceError;

/// How an image file is decoded.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum DecodeMode {
    /// Format picked from the extension; 8-bit RGB/RGBA buffers are reused as-is.
    #[default]
    Fast,
    /// Format sniffed from the file contents; any channel layout is converted.
    Fallback,
}

/// A decoded image, always expanded to RGBA8 for upload.
#[derive(Debug)]
pub(crate) struct DecodedImage {
    /// 3 for sources without alpha, 4 otherwise.
    pub channels: u8,
    pub rgba: RgbaImage,
}

pub(crate) fn decode_file(path: &Path, mode: DecodeMode) -> Result<DecodedImage, ResourceError> {
    let map_err = |err: ImageError| match err {
        ImageError::IoError(source) => ResourceError::Io { path: path.to_path_buf(), source },
        other => ResourceError::Decode { path: path.to_path_buf(), reason: other.to_string() },
    };

    let image = match mode {
        DecodeMode::Fast => image::open(path).map_err(map_err)?,
        DecodeMode::Fallback => ImageReader::open(path)
            .map_err(|source| ResourceError::Io { path: path.to_path_buf(), source })?
            .with_guessed_format()
            .map_err(|source| ResourceError::Io { path: path.to_path_buf(), source })?
            .decode()
            .map_err(map_err)?,
    };

    Ok(expand(image))
}

fn expand(image: DynamicImage) -> DecodedImage {
    match image {
        DynamicImage::ImageRgba8(rgba) => DecodedImage { channels: 4, rgba },
        DynamicImage::ImageRgb8(rgb) => DecodedImage {
            channels: 3,
            rgba: DynamicImage::ImageRgb8(rgb).into_rgba8(),
        },
        other => {
            let channels = if other.color().has_alpha() { 4 } else { 3 };
            DecodedImage { channels, rgba: other.into_rgba8() }
        }
    }
}

/// Builds the full mip chain down to 1x1, level 0 first.
pub(crate) fn mip_chain(base: RgbaImage) -> Vec<MipLevel> {
    let mut levels = Vec::new();
    let mut current = base;
    loop {
        let (width, height) = current.dimensions();
        let next = (width > 1 || height > 1)
            .then(|| imageops::resize(&current, (width / 2).max(1), (height / 2).max(1), FilterType::Triangle));
        levels.push(MipLevel { width, height, rgba: current.into_raw() });
        match next {
            Some(n) => current = n,
            None => break,
        }
    }
    levels
}

#[cfg(test)]
pub(crate) fn write_test_image(path: &Path, width: u32, height: u32, alpha: bool) {
    if alpha {
        let img = RgbaImage::from_fn(width, height, |x, y| image::Rgba([x as u8, y as u8, 0, 128]));
        img.save(path).unwrap();
    } else {
        let img = image::RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, 255]));
        img.save(path).unwrap();
    }
}
