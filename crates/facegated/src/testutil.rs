//! Shared fixtures for handler and pipeline tests.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use facegate_core::{scan_reference_dir, Candidate, EngineError, RecognitionEngine};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;

/// Probe size the stand-in engine treats as containing no face.
pub const FACELESS: (u32, u32) = (1, 1);

/// Stand-in engine: a reference "matches" when its pixel dimensions equal the probe's.
///
/// Dimensions survive the JPEG round-trip of the probe file, colours do not.
/// A [`FACELESS`] probe yields no rows and the store is never read.
pub struct SizeMatchEngine;

impl RecognitionEngine for SizeMatchEngine {
    fn find(&mut self, probe: &Path, reference_dir: &Path) -> Result<Vec<Candidate>, EngineError> {
        let probe_dims = image::image_dimensions(probe)?;
        if probe_dims == FACELESS {
            return Ok(Vec::new());
        }
        let mut rows = Vec::new();
        for reference in scan_reference_dir(reference_dir)? {
            if image::image_dimensions(&reference.path)? == probe_dims {
                rows.push(Candidate {
                    identity: reference.identity,
                    reference_path: reference.path,
                    confidence: 1.0,
                });
            }
        }
        Ok(rows)
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 140, 200])));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub fn png_data_url(width: u32, height: u32) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png_bytes(width, height)))
}
