use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::GrayImage;
use imageproc::contrast::{ThresholdType, equalize_histogram, otsu_level, threshold};
use imageproc::distance_transform::Norm;
use imageproc::morphology::erode;
use serde::{Deserialize, Serialize};

use super::raster::RasterImage;

/// Image cleanup applied to a rendered page before one OCR pass reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enhancement {
    /// The rendered page as-is.
    Raw,
    /// Grayscale, histogram equalization and an Otsu threshold.
    Contrast,
    /// `Contrast` plus stroke thickening so thin symbols (⌀, °) survive.
    Symbols,
}

impl fmt::Display for Enhancement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raw => "raw",
            Self::Contrast => "contrast",
            Self::Symbols => "symbols",
        })
    }
}

/// Which enhancement each OCR pass role reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessConfig {
    pub primary: Enhancement,
    pub extra: Enhancement,
    pub tokens: Enhancement,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            primary: Enhancement::Contrast,
            extra: Enhancement::Symbols,
            tokens: Enhancement::Contrast,
        }
    }
}

pub trait ImageEnhancer: Sync {
    fn enhance(&self, raster: &RasterImage, enhancement: Enhancement) -> Result<RasterImage>;
}

/// In-process cleanup with `image` and `imageproc`. The enhanced copy sits
/// next to the rendered page and is removed when its handle drops.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor;

impl ImageEnhancer for Preprocessor {
    fn enhance(&self, raster: &RasterImage, enhancement: Enhancement) -> Result<RasterImage> {
        let source = raster.path();
        let gray = image::open(source)
            .with_context(|| format!("failed to decode raster {}", source.display()))?
            .to_luma8();

        let enhanced = match enhancement {
            Enhancement::Raw => gray,
            Enhancement::Contrast => binarize(&gray),
            Enhancement::Symbols => thicken_strokes(&binarize(&gray)),
        };

        let target = enhanced_path(source, enhancement);
        enhanced
            .save(&target)
            .with_context(|| format!("failed to write enhanced raster {}", target.display()))?;
        Ok(RasterImage::owned(target))
    }
}

pub fn binarize(gray: &GrayImage) -> GrayImage {
    let equalized = equalize_histogram(gray);
    let level = otsu_level(&equalized);
    threshold(&equalized, level, ThresholdType::Binary)
}

/// Grows dark strokes by one pixel in every direction.
pub fn thicken_strokes(binary: &GrayImage) -> GrayImage {
    erode(binary, Norm::LInf, 1)
}

pub fn enhanced_path(source: &Path, enhancement: Enhancement) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    source.with_file_name(format!("{stem}-{enhancement}.png"))
}
