use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use regex::Regex;

use crate::error::{BoundaryError, OcrError};

pub trait PdfRasterizer: Sync {
    fn page_count(&self, pdf: &Path) -> Result<u32>;

    fn rasterize(&self, pdf: &Path, page: u32, dpi: u32) -> Result<RasterImage>;
}

/// A rendered page on disk. Images produced by the rasterizer are removed
/// when the handle is dropped.
#[derive(Debug)]
pub struct RasterImage {
    path: PathBuf,
    owned: bool,
}

impl RasterImage {
    #[cfg(test)]
    pub fn borrowed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            owned: false,
        }
    }

    pub(crate) fn owned(path: PathBuf) -> Self {
        Self { path, owned: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RasterImage {
    fn drop(&mut self) {
        if self.owned {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Poppler command-line tools: `pdfinfo` for the page count and `pdftoppm`
/// for rendering.
#[derive(Debug, Clone, Default)]
pub struct Poppler;

impl PdfRasterizer for Poppler {
    fn page_count(&self, pdf: &Path) -> Result<u32> {
        let output = Command::new("pdfinfo")
            .arg(pdf)
            .output()
            .with_context(|| format!("failed to execute pdfinfo for {}", pdf.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pdfinfo returned non-zero exit status for {}: {}",
                pdf.display(),
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_pdfinfo_pages(&stdout)
            .with_context(|| format!("pdfinfo reported no page count for {}", pdf.display()))
    }

    /// Renders one page. The page number is not re-checked here; callers
    /// validate every page against `page_count` before any rendering starts.
    fn rasterize(&self, pdf: &Path, page: u32, dpi: u32) -> Result<RasterImage> {
        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let output_root = std::env::temp_dir().join(format!(
            "dimcheck_page_{}_{}_{}_{}",
            safe_stem(pdf),
            std::process::id(),
            page,
            stamp
        ));
        let png_path = PathBuf::from(format!("{}.png", output_root.display()));

        let output = render_command(pdf, page, dpi, &output_root)
            .output()
            .map_err(|source| OcrError::Spawn {
                program: "pdftoppm",
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::ExitStatus {
                program: "pdftoppm",
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            }
            .into());
        }

        if !png_path.exists() {
            return Err(OcrError::MissingOutput {
                program: "pdftoppm",
                path: png_path,
            }
            .into());
        }

        Ok(RasterImage::owned(png_path))
    }
}

pub fn render_command(pdf: &Path, page: u32, dpi: u32, output_root: &Path) -> Command {
    let mut command = Command::new("pdftoppm");
    command
        .arg("-r")
        .arg(dpi.to_string())
        .arg("-f")
        .arg(page.to_string())
        .arg("-l")
        .arg(page.to_string())
        .arg("-singlefile")
        .arg("-png")
        .arg(pdf)
        .arg(output_root);
    command
}

pub fn check_page_in_range(pdf: &Path, page: u32, page_count: u32) -> Result<(), BoundaryError> {
    if page == 0 || page > page_count {
        return Err(BoundaryError::PageOutOfRange {
            pdf: pdf.to_path_buf(),
            page,
            page_count,
        });
    }
    Ok(())
}

pub fn parse_pdfinfo_pages(stdout: &str) -> Option<u32> {
    let pattern = Regex::new(r"(?m)^Pages:\s+(\d+)\s*$").ok()?;
    pattern
        .captures(stdout)
        .and_then(|captures| captures.get(1))
        .and_then(|value| value.as_str().parse::<u32>().ok())
}

fn safe_stem(pdf: &Path) -> String {
    pdf.file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("pdf")
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() {
                character
            } else {
                '_'
            }
        })
        .collect()
}
