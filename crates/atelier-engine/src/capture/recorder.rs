use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};

use crate::gpu::Readback;

use super::CaptureError;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum ImageFileFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFileFormat::Png => "png",
            ImageFileFormat::Jpeg => "jpg",
        }
    }

    /// Readback components to request for this format.
    pub fn components(self) -> u8 {
        match self {
            ImageFileFormat::Png => 4,
            ImageFileFormat::Jpeg => 3,
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            ImageFileFormat::Png => ImageFormat::Png,
            ImageFileFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Writes readbacks into one output directory.
#[derive(Debug)]
pub struct Recorder {
    dir: PathBuf,
    saved: u32,
}

impl Recorder {
    /// Creates `dir` (and parents) if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| CaptureError::CreateDir { path: dir.clone(), source })?;
        log::debug!("recorder writing to {}", dir.display());
        Ok(Self { dir, saved: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of files written so far.
    pub fn saved(&self) -> u32 {
        self.saved
    }

    /// Next free `capture_NNNN` name, skipping names already on disk in
    /// either format.
    pub fn next_name(&self) -> String {
        (self.saved..)
            .map(|n| format!("capture_{n:04}"))
            .find(|name| !self.exists(name))
            .unwrap_or_else(|| format!("capture_{}", u32::MAX))
    }

    fn exists(&self, name: &str) -> bool {
        [ImageFileFormat::Png, ImageFileFormat::Jpeg]
            .iter()
            .any(|format| self.dir.join(format!("{name}.{}", format.extension())).exists())
    }

    /// Writes `readback` as `<dir>/<name>.<ext>` and returns the path.
    ///
    /// Readbacks are bottom row first; the file is written top row first.
    /// JPEG drops alpha, PNG keeps it when the readback has it.
    pub fn save(&mut self, readback: &Readback, name: &str, format: ImageFileFormat) -> Result<PathBuf, CaptureError> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(CaptureError::InvalidName(name.to_string()));
        }

        let image = to_image(readback)?;
        let image = match format {
            ImageFileFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
            ImageFileFormat::Png => image,
        };

        let path = self.dir.join(format!("{name}.{}", format.extension()));
        image
            .save_with_format(&path, format.image_format())
            .map_err(|source| CaptureError::Encode { path: path.clone(), source })?;

        self.saved += 1;
        log::info!("saved {}x{} frame to {}", readback.width, readback.height, path.display());
        Ok(path)
    }
}

fn to_image(readback: &Readback) -> Result<DynamicImage, CaptureError> {
    let Readback { width, height, components, .. } = *readback;
    let invalid = || CaptureError::InvalidReadback { width, height, components, len: readback.pixels.len() };

    if readback.pixels.len() != width as usize * height as usize * components as usize {
        return Err(invalid());
    }

    let image = match components {
        3 => RgbImage::from_raw(width, height, readback.pixels.clone()).map(DynamicImage::ImageRgb8),
        4 => RgbaImage::from_raw(width, height, readback.pixels.clone()).map(DynamicImage::ImageRgba8),
        _ => None,
    }
    .ok_or_else(invalid)?;
    Ok(image.flipv())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2x2 RGBA readback: bottom row red, top row blue.
    fn readback() -> Readback {
        let red = [255, 0, 0, 255];
        let blue = [0, 0, 255, 255];
        let pixels = [red, red, blue, blue].concat();
        Readback { width: 2, height: 2, components: 4, pixels }
    }

    #[test]
    fn png_is_written_top_row_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(dir.path().join("out")).unwrap();
        let path = recorder.save(&readback(), "frame", ImageFileFormat::Png).unwrap();

        assert_eq!(path, dir.path().join("out/frame.png"));
        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(img.get_pixel(1, 1).0, [255, 0, 0, 255]);
        assert_eq!(recorder.saved(), 1);
        assert_eq!(recorder.next_name(), "capture_0001");
    }

    #[test]
    fn next_name_skips_captures_from_earlier_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = Recorder::new(dir.path()).unwrap();
        let name = first.next_name();
        first.save(&readback(), &name, ImageFileFormat::Png).unwrap();
        std::fs::write(dir.path().join("capture_0001.jpg"), b"").unwrap();

        let second = Recorder::new(dir.path()).unwrap();
        assert_eq!(second.saved(), 0);
        assert_eq!(second.next_name(), "capture_0002");
    }

    #[test]
    fn jpeg_drops_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(dir.path()).unwrap();
        let path = recorder.save(&readback(), "frame", ImageFileFormat::Jpeg).unwrap();

        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
        let img = image::open(&path).unwrap();
        assert_eq!(img.color(), image::ColorType::Rgb8);
        assert_eq!((img.width(), img.height()), (2, 2));
    }

    #[test]
    fn rgb_readback_saves_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(dir.path()).unwrap();
        let rb = Readback { width: 1, height: 2, components: 3, pixels: vec![10, 20, 30, 40, 50, 60] };
        let path = recorder.save(&rb, "rgb", ImageFileFormat::Png).unwrap();
        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(0, 0).0, [40, 50, 60]);
    }

    #[test]
    fn short_readback_and_bad_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(dir.path()).unwrap();
        let short = Readback { width: 4, height: 4, components: 4, pixels: vec![0; 10] };
        assert!(matches!(
            recorder.save(&short, "x", ImageFileFormat::Png),
            Err(CaptureError::InvalidReadback { len: 10, .. })
        ));
        assert!(matches!(
            recorder.save(&readback(), "../x", ImageFileFormat::Png),
            Err(CaptureError::InvalidName(_))
        ));
        assert!(matches!(
            recorder.save(&readback(), "", ImageFileFormat::Png),
            Err(CaptureError::InvalidName(_))
        ));
        assert_eq!(recorder.saved(), 0);
    }
}
