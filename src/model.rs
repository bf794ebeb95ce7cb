use serde::{Deserialize, Serialize};

use crate::adapters::preprocess::PreprocessConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolVersions {
    pub dimcheck: String,
    pub pdfinfo: Option<String>,
    pub pdftoppm: Option<String>,
    pub tesseract: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHash {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPaths {
    pub output_dir: String,
    pub answers_path: String,
    #[serde(default)]
    pub answers_workbook: String,
    pub manifest_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounts {
    pub page_count: u32,
    pub pages_requested: usize,
    pub pages_answered: usize,
    pub questions: usize,
    pub answers_found: usize,
    pub answers_not_found: usize,
    pub failed_ocr_passes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSummary {
    pub page: u32,
    pub questions: usize,
    pub found: usize,
    pub not_found: usize,
    pub failed_passes: Vec<String>,
    pub written: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub completed_at: String,
    pub status: String,
    pub command: String,
    pub tool_versions: ToolVersions,
    pub sources: Vec<SourceHash>,
    pub paths: RunPaths,
    pub dpi: u32,
    pub ocr_passes: Vec<String>,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    pub jobs: usize,
    pub counts: RunCounts,
    pub pages: Vec<PageSummary>,
    pub warnings: Vec<String>,
}
