use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("{what} not found: {}", path.display())]
    MissingInput { what: &'static str, path: PathBuf },

    #[error("page {page} is outside {} ({page_count} pages)", pdf.display())]
    PageOutOfRange {
        pdf: PathBuf,
        page: u32,
        page_count: u32,
    },

    #[error("failed to read workbook {}: {reason}", path.display())]
    UnreadableWorkbook { path: PathBuf, reason: String },

    #[error("workbook {} has no Page-<N> marker rows", path.display())]
    NoPageMarkers { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    ExitStatus {
        program: &'static str,
        status: String,
        stderr: String,
    },

    #[error("{program} did not produce {}", path.display())]
    MissingOutput {
        program: &'static str,
        path: PathBuf,
    },

    #[error("OCR pass '{pass}' returned no text")]
    EmptyTranscript { pass: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("unknown measurement category '{0}'")]
    UnknownCategory(String),

    #[error("invalid plausibility range [{lo}, {hi}] for {category}")]
    InvalidRange { category: String, lo: f64, hi: f64 },

    #[error("page {page} row {row} has no configured category slot")]
    UnmappedQuestion { page: u32, row: u32 },
}
