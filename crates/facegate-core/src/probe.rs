//! Probe images: data-URL decoding and the scoped temp file handed to the engine.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat};
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("malformed data URL: expected \"<header>,<base64 payload>\"")]
    MissingSeparator,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("cannot decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("probe file: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode a `data:image/...;base64,<payload>` string into an image.
pub fn decode_data_url(data_url: &str) -> Result<DynamicImage, ProbeError> {
    let (_header, payload) = data_url.split_once(',').ok_or(ProbeError::MissingSeparator)?;
    let bytes = STANDARD.decode(payload.trim())?;
    Ok(image::load_from_memory(&bytes)?)
}

/// A probe image written to a temporary JPEG file.
///
/// The file is removed when the value is dropped, on every exit path.
pub struct ProbeFile {
    file: NamedTempFile,
}

impl ProbeFile {
    pub fn create(image: &DynamicImage) -> Result<Self, ProbeError> {
        let file = tempfile::Builder::new()
            .prefix("facegate-probe-")
            .suffix(".jpg")
            .tempfile()?;
        image.to_rgb8().save_with_format(file.path(), ImageFormat::Jpeg)?;
        tracing::debug!(path = %file.path().display(), "probe image written");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn png_data_url(width: u32, height: u32) -> String {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 10, 10])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(buf.into_inner()))
    }

    #[test]
    fn test_decode_valid_data_url() {
        let img = decode_data_url(&png_data_url(6, 4)).unwrap();
        assert_eq!((img.width(), img.height()), (6, 4));
    }

    #[test]
    fn test_decode_missing_comma() {
        let err = decode_data_url("data:image/png;base64").unwrap_err();
        assert!(matches!(err, ProbeError::MissingSeparator));
    }

    #[test]
    fn test_decode_bad_base64() {
        let err = decode_data_url("data:image/png;base64,@@@").unwrap_err();
        assert!(matches!(err, ProbeError::Base64(_)));
    }

    #[test]
    fn test_decode_not_an_image() {
        let payload = STANDARD.encode(b"definitely not pixels");
        let err = decode_data_url(&format!("data:image/png;base64,{payload}")).unwrap_err();
        assert!(matches!(err, ProbeError::Image(_)));
    }

    #[test]
    fn test_probe_file_removed_on_drop() {
        let img = decode_data_url(&png_data_url(8, 8)).unwrap();
        let probe = ProbeFile::create(&img).unwrap();
        let path = probe.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert_eq!(image::open(&path).unwrap().width(), 8);

        drop(probe);
        assert!(!path.exists());
    }
}
