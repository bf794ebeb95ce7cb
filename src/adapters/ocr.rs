use std::fmt;
use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::engine::types::{BoundingBox, TextToken};
use crate::error::OcrError;

/// Tesseract page segmentation mode (`--psm`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentationMode(pub u8);

impl fmt::Display for SegmentationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "psm{}", self.0)
    }
}

pub trait OcrEngine: Sync {
    fn transcribe(&self, image: &Path, mode: SegmentationMode) -> Result<String, OcrError>;

    fn transcribe_tokens(
        &self,
        image: &Path,
        mode: SegmentationMode,
    ) -> Result<Vec<TextToken>, OcrError>;
}

#[derive(Debug, Clone)]
pub struct TesseractCli {
    lang: String,
}

impl TesseractCli {
    pub fn new(lang: impl Into<String>) -> Self {
        Self { lang: lang.into() }
    }

    fn run(&self, image: &Path, mode: SegmentationMode, tsv: bool) -> Result<String, OcrError> {
        let mut command = Command::new("tesseract");
        command
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .arg("--psm")
            .arg(mode.0.to_string());
        if tsv {
            command.arg("tsv");
        }

        let output = command.output().map_err(|source| OcrError::Spawn {
            program: "tesseract",
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::ExitStatus {
                program: "tesseract",
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).replace('\u{0000}', ""))
    }
}

impl OcrEngine for TesseractCli {
    fn transcribe(&self, image: &Path, mode: SegmentationMode) -> Result<String, OcrError> {
        let text = self.run(image, mode, false)?;
        if text.trim().is_empty() {
            return Err(OcrError::EmptyTranscript {
                pass: mode.to_string(),
            });
        }
        Ok(text)
    }

    fn transcribe_tokens(
        &self,
        image: &Path,
        mode: SegmentationMode,
    ) -> Result<Vec<TextToken>, OcrError> {
        let tokens = parse_tsv(&self.run(image, mode, true)?);
        if tokens.is_empty() {
            return Err(OcrError::EmptyTranscript {
                pass: format!("{mode}-tsv"),
            });
        }
        Ok(tokens)
    }
}

/// Word rows (level 5) of tesseract TSV output. Rows with a negative
/// confidence or blank text carry no recognized word and are skipped.
pub fn parse_tsv(tsv: &str) -> Vec<TextToken> {
    tsv.lines()
        .filter_map(|line| {
            let columns = line.split('\t').collect::<Vec<&str>>();
            if columns.len() < 12 || columns[0].trim() != "5" {
                return None;
            }

            let confidence = columns[10].trim().parse::<f64>().ok()?;
            let text = columns[11..].join(" ");
            let text = text.trim();
            if confidence < 0.0 || text.is_empty() {
                return None;
            }

            Some(TextToken {
                text: text.to_string(),
                bbox: BoundingBox {
                    x: columns[6].trim().parse().ok()?,
                    y: columns[7].trim().parse().ok()?,
                    width: columns[8].trim().parse().ok()?,
                    height: columns[9].trim().parse().ok()?,
                },
            })
        })
        .collect()
}
