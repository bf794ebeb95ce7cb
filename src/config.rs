use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adapters::ocr::SegmentationMode;
use crate::adapters::preprocess::PreprocessConfig;
use crate::engine::context::SpatialBand;
use crate::engine::library::{CategoryOverride, MeasurementCategory};
use crate::error::BoundaryError;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_OUTPUT_DIR: &str = ".cache/dimcheck";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub pdf_path: Option<PathBuf>,
    pub workbook_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub answers_workbook: Option<PathBuf>,
    pub dpi: u32,
    pub ocr_lang: String,
    pub primary_psm: SegmentationMode,
    pub extra_psms: Vec<SegmentationMode>,
    pub token_psm: SegmentationMode,
    pub preprocess: PreprocessConfig,
    pub jobs: usize,
    pub question_column: String,
    pub answer_column: String,
    pub spatial_band: SpatialBand,
    pub questionnaire: BTreeMap<u32, Vec<String>>,
    pub categories: BTreeMap<String, CategoryOverride>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            pdf_path: None,
            workbook_path: None,
            output_dir: None,
            answers_workbook: None,
            dpi: 300,
            ocr_lang: "eng".to_string(),
            primary_psm: SegmentationMode(6),
            extra_psms: vec![SegmentationMode(11), SegmentationMode(4)],
            token_psm: SegmentationMode(11),
            preprocess: PreprocessConfig::default(),
            jobs: 1,
            question_column: "B".to_string(),
            answer_column: "C".to_string(),
            spatial_band: SpatialBand::default(),
            questionnaire: default_questionnaire(),
            categories: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    pub fn from_cli(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path, true),
            None => Self::load(Path::new(DEFAULT_CONFIG_PATH), false),
        }
    }

    /// Loads the file when it exists. A missing file at the default location
    /// falls back to built-in defaults; a missing explicit file is an error.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        if !path.exists() {
            if explicit {
                return Err(BoundaryError::MissingInput {
                    what: "config file",
                    path: path.to_path_buf(),
                }
                .into());
            }
            debug!(path = %path.display(), "config file absent; using defaults");
            return Ok(Self::default());
        }

        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dpi == 0 {
            bail!("dpi must be positive");
        }
        if self.jobs == 0 {
            bail!("jobs must be at least 1");
        }
        if self.ocr_lang.trim().is_empty() {
            bail!("ocr_lang must not be empty");
        }
        if self.spatial_band.vertical_px < 0.0 || self.spatial_band.horizontal_px < 0.0 {
            bail!("spatial_band distances must not be negative");
        }
        Ok(())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    /// Where answers are written back. Defaults to a copy of the questionnaire
    /// in the output directory; pointing it at the questionnaire itself
    /// updates that file in place.
    pub fn answers_workbook_path(&self, workbook: &Path) -> PathBuf {
        if let Some(path) = &self.answers_workbook {
            return path.clone();
        }
        let stem = workbook
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "questionnaire".to_string());
        self.output_dir().join(format!("{stem}_answers.xlsx"))
    }

    /// Both input documents, checked for existence before any work starts.
    pub fn require_inputs(&self) -> Result<(PathBuf, PathBuf), BoundaryError> {
        let pdf = require_file(self.pdf_path.as_deref(), "drawing PDF")?;
        let workbook = require_file(self.workbook_path.as_deref(), "questionnaire workbook")?;
        Ok((pdf, workbook))
    }

    /// Category names configured for one drawing page, in question order.
    pub fn slot_names(&self, page: u32) -> Vec<String> {
        match self.questionnaire.get(&page) {
            Some(names) => names.clone(),
            None => {
                warn!(page, "no category slots configured for page");
                Vec::new()
            }
        }
    }

    pub fn all_passes(&self) -> Vec<SegmentationMode> {
        let mut passes = vec![self.primary_psm];
        for mode in &self.extra_psms {
            if !passes.contains(mode) {
                passes.push(*mode);
            }
        }
        passes
    }
}

fn require_file(path: Option<&Path>, what: &'static str) -> Result<PathBuf, BoundaryError> {
    let Some(path) = path else {
        return Err(BoundaryError::MissingInput {
            what,
            path: PathBuf::new(),
        });
    };
    if !path.is_file() {
        return Err(BoundaryError::MissingInput {
            what,
            path: path.to_path_buf(),
        });
    }
    Ok(path.to_path_buf())
}

fn default_questionnaire() -> BTreeMap<u32, Vec<String>> {
    use MeasurementCategory::*;

    let pages: [(u32, &[MeasurementCategory]); 3] = [
        (2, &[TotalLength, HoleDiameter, Width]),
        (
            3,
            &[
                HoleEdgeDistance,
                ChamferAngle,
                HolePitchDistance,
                CounterboreDepth,
            ],
        ),
        (5, &[DiscThickness, CircleDiameter, AllDiameters]),
    ];

    pages
        .into_iter()
        .map(|(page, categories)| {
            (
                page,
                categories
                    .iter()
                    .map(|category| category.as_str().to_string())
                    .collect(),
            )
        })
        .collect()
}
