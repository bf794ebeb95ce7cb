use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigurationError;

const NUMBER: &str = r"\d+(?:\.\d+)?";
const DIAMETER_PREFIX: &str = r"(?:[Ø⌀øϕφΦ∅]|\bDIAM?\.?|\bP)";
const DEPTH_MARKER: &str = r"(?:\b[Zz]|↧|\bDEPTH\b|\bDP\b)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementCategory {
    HoleDiameter,
    TotalLength,
    Width,
    HoleEdgeDistance,
    ChamferAngle,
    HolePitchDistance,
    CounterboreDepth,
    DiscThickness,
    CircleDiameter,
    AllDiameters,
}

impl MeasurementCategory {
    pub const ALL: [MeasurementCategory; 10] = [
        Self::HoleDiameter,
        Self::TotalLength,
        Self::Width,
        Self::HoleEdgeDistance,
        Self::ChamferAngle,
        Self::HolePitchDistance,
        Self::CounterboreDepth,
        Self::DiscThickness,
        Self::CircleDiameter,
        Self::AllDiameters,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HoleDiameter => "hole_diameter",
            Self::TotalLength => "total_length",
            Self::Width => "width",
            Self::HoleEdgeDistance => "hole_edge_distance",
            Self::ChamferAngle => "chamfer_angle",
            Self::HolePitchDistance => "hole_pitch_distance",
            Self::CounterboreDepth => "counterbore_depth",
            Self::DiscThickness => "disc_thickness",
            Self::CircleDiameter => "circle_diameter",
            Self::AllDiameters => "all_diameters",
        }
    }
}

impl fmt::Display for MeasurementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementCategory {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let alias = match normalized.as_str() {
            "hole_distance" | "center_distance" => "hole_pitch_distance",
            "length" => "total_length",
            "thickness" => "disc_thickness",
            "pcd" => "circle_diameter",
            other => other,
        };

        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == alias)
            .ok_or_else(|| ConfigurationError::UnknownCategory(value.trim().to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Diameter,
    PitchCircle,
    Thread,
    Degree,
    Depth,
    Counterbore,
    Places,
    Thickness,
    Bare,
}

impl SymbolKind {
    /// Prefix used when a value is rendered back into an answer cell.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Diameter | Self::Counterbore => "⌀",
            Self::PitchCircle => "PCD ",
            Self::Thread => "M",
            Self::Depth => "Z ",
            Self::Degree | Self::Places | Self::Thickness | Self::Bare => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    ModeVote,
    Min,
    Max,
    DedupList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPolicy {
    Optional,
    Required,
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    Text,
    Spatial,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlausibilityRange {
    pub lo: f64,
    pub hi: f64,
}

impl PlausibilityRange {
    pub fn new(
        category: MeasurementCategory,
        lo: f64,
        hi: f64,
    ) -> Result<Self, ConfigurationError> {
        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return Err(ConfigurationError::InvalidRange {
                category: category.to_string(),
                lo,
                hi,
            });
        }
        Ok(Self { lo, hi })
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lo && value <= self.hi
    }
}

#[derive(Debug, Clone)]
pub struct PatternSpec {
    pub regex: Regex,
    pub symbol: SymbolKind,
    pub self_anchored: bool,
}

#[derive(Debug, Clone)]
pub struct CategorySpec {
    pub category: MeasurementCategory,
    pub patterns: Vec<PatternSpec>,
    pub range: PlausibilityRange,
    pub anchors: Vec<String>,
    pub strategy: ResolutionStrategy,
    pub anchor_policy: AnchorPolicy,
    pub context_mode: ContextMode,
    pub window: usize,
    pub multi_pass: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryOverride {
    pub range: Option<[f64; 2]>,
    pub anchors: Option<Vec<String>>,
    pub window: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CategoryView {
    pub category: MeasurementCategory,
    pub patterns: Vec<PatternView>,
    pub range: PlausibilityRange,
    pub anchors: Vec<String>,
    pub strategy: ResolutionStrategy,
    pub anchor_policy: AnchorPolicy,
    pub context_mode: ContextMode,
    pub window: usize,
    pub multi_pass: bool,
}

#[derive(Debug, Serialize)]
pub struct PatternView {
    pub regex: String,
    pub symbol: SymbolKind,
    pub self_anchored: bool,
}

#[derive(Debug, Clone)]
pub struct PatternLibrary {
    entries: BTreeMap<MeasurementCategory, CategorySpec>,
}

impl PatternLibrary {
    pub fn builtin() -> Result<Self> {
        let mut entries = BTreeMap::new();
        for category in MeasurementCategory::ALL {
            entries.insert(category, builtin_spec(category)?);
        }
        Ok(Self { entries })
    }

    /// Builds the built-in table and applies per-deployment overrides. Unknown
    /// category names and bad ranges are reported and skipped.
    pub fn configured(
        overrides: &BTreeMap<String, CategoryOverride>,
    ) -> Result<(Self, Vec<ConfigurationError>)> {
        let mut library = Self::builtin()?;
        let mut problems = Vec::new();

        for (name, adjustment) in overrides {
            let category = match name.parse::<MeasurementCategory>() {
                Ok(category) => category,
                Err(error) => {
                    warn!(error = %error, "ignoring category override");
                    problems.push(error);
                    continue;
                }
            };
            let Some(spec) = library.entries.get_mut(&category) else {
                continue;
            };

            if let Some([lo, hi]) = adjustment.range {
                match PlausibilityRange::new(category, lo, hi) {
                    Ok(range) => spec.range = range,
                    Err(error) => {
                        warn!(error = %error, "ignoring range override");
                        problems.push(error);
                    }
                }
            }
            if let Some(anchors) = &adjustment.anchors {
                spec.anchors = anchors
                    .iter()
                    .map(|anchor| anchor.trim().to_uppercase())
                    .filter(|anchor| !anchor.is_empty())
                    .collect();
            }
            if let Some(window) = adjustment.window {
                spec.window = window;
            }
        }

        Ok((library, problems))
    }

    pub fn get(&self, category: MeasurementCategory) -> Option<&CategorySpec> {
        self.entries.get(&category)
    }

    pub fn specs(&self) -> impl Iterator<Item = &CategorySpec> {
        self.entries.values()
    }

    pub fn describe(&self) -> Vec<CategoryView> {
        self.specs()
            .map(|spec| CategoryView {
                category: spec.category,
                patterns: spec
                    .patterns
                    .iter()
                    .map(|pattern| PatternView {
                        regex: pattern.regex.as_str().to_string(),
                        symbol: pattern.symbol,
                        self_anchored: pattern.self_anchored,
                    })
                    .collect(),
                range: spec.range,
                anchors: spec.anchors.clone(),
                strategy: spec.strategy,
                anchor_policy: spec.anchor_policy,
                context_mode: spec.context_mode,
                window: spec.window,
                multi_pass: spec.multi_pass,
            })
            .collect()
    }
}

fn pattern(source: &str, symbol: SymbolKind, self_anchored: bool) -> Result<PatternSpec> {
    let regex =
        Regex::new(source).with_context(|| format!("failed to compile pattern: {source}"))?;
    Ok(PatternSpec {
        regex,
        symbol,
        self_anchored,
    })
}

fn anchors(words: &[&str]) -> Vec<String> {
    words.iter().map(|word| word.to_string()).collect()
}

fn builtin_spec(category: MeasurementCategory) -> Result<CategorySpec> {
    use AnchorPolicy::{Nearest, Optional, Required};
    use ResolutionStrategy::{DedupList, Max, Min, ModeVote};
    use SymbolKind::*;

    let diameter = || pattern(&format!(r"{DIAMETER_PREFIX}\s*(?P<value>{NUMBER})"), Diameter, false);
    let bare = || pattern(&format!(r"(?P<value>{NUMBER})"), Bare, false);

    let (patterns, (lo, hi), anchor_words, strategy, policy, mode, window, multi_pass) =
        match category {
            MeasurementCategory::HoleDiameter => (
                vec![
                    diameter()?,
                    pattern(&format!(r"(?P<value>{NUMBER})\s*DIAM?\b"), Diameter, false)?,
                ],
                (2.0, 50.0),
                anchors(&["HOLE", "DIAMETER", "THRU"]),
                Max,
                Optional,
                ContextMode::Text,
                1,
                false,
            ),
            MeasurementCategory::TotalLength => (
                vec![pattern(&format!(r"(?P<value>{NUMBER})\s*(?:mm|MM)?"), Bare, false)?],
                (10.0, 1000.0),
                anchors(&["LENGTH", "TOTAL", "OVERALL", "SIDE VIEW"]),
                Max,
                Optional,
                ContextMode::Text,
                1,
                false,
            ),
            MeasurementCategory::Width => (
                vec![bare()?],
                (5.0, 500.0),
                anchors(&["W", "WIDTH"]),
                ModeVote,
                Nearest,
                ContextMode::Spatial,
                0,
                false,
            ),
            MeasurementCategory::HoleEdgeDistance => (
                vec![bare()?],
                (25.0, 35.0),
                anchors(&["PLCS", "PLC", "PLACES"]),
                ModeVote,
                Required,
                ContextMode::Text,
                2,
                true,
            ),
            MeasurementCategory::ChamferAngle => (
                vec![
                    pattern(
                        &format!(r"(?:\d+\s*[xX×]\s*)?(?P<value>{NUMBER})\s*(?:°|º|˚|\bDEG\b|\bdeg\b)"),
                        Degree,
                        false,
                    )?,
                    pattern(r"\d+\s*[xX×]\s*(?P<value>\d+)[cC]\b", Degree, false)?,
                ],
                (40.0, 50.0),
                anchors(&["CHAMFER", "CHAM", "X"]),
                ModeVote,
                Optional,
                ContextMode::Text,
                1,
                true,
            ),
            MeasurementCategory::HolePitchDistance => (
                vec![
                    pattern(&format!(r"(?P<value>{NUMBER})\s*(?:PLCS|PLACES|PLC)\b"), Places, false)?,
                    bare()?,
                ],
                (45.0, 55.0),
                anchors(&["PLCS", "PLC", "PLACES", "CENTER", "CTRS"]),
                ModeVote,
                Required,
                ContextMode::Text,
                2,
                true,
            ),
            MeasurementCategory::CounterboreDepth => (
                vec![
                    pattern(
                        &format!(
                            r"{DIAMETER_PREFIX}\s*(?P<hole>{NUMBER})\s*(?P<thru>THRU|THROUGH)?\s*[xX×]?\s*{DIAMETER_PREFIX}\s*(?P<bore>{NUMBER})\s*{DEPTH_MARKER}\s*(?P<value>{NUMBER})"
                        ),
                        Counterbore,
                        true,
                    )?,
                    pattern(&format!(r"{DEPTH_MARKER}\s*(?P<value>{NUMBER})"), Depth, false)?,
                ],
                (25.0, 35.0),
                anchors(&["SECTION", "DEPTH", "CBORE", "COUNTERBORE"]),
                ModeVote,
                Required,
                ContextMode::Text,
                2,
                true,
            ),
            MeasurementCategory::DiscThickness => (
                vec![
                    pattern(
                        &format!(r"(?P<value>{NUMBER})\s*(?:mm\s*)?(?:THK|THICK)\b"),
                        Thickness,
                        true,
                    )?,
                    pattern(
                        &format!(r"\b(?:THICKNESS|THICK|THK|T)\s*[=:]?\s*(?P<value>{NUMBER})"),
                        Thickness,
                        true,
                    )?,
                    bare()?,
                ],
                (1.0, 25.0),
                anchors(&["THK", "THICK", "THICKNESS", "DISC"]),
                Min,
                Optional,
                ContextMode::Text,
                1,
                true,
            ),
            MeasurementCategory::CircleDiameter => (
                vec![
                    pattern(
                        &format!(
                            r"\b(?:PCD|P\.C\.D\.?|BCD|B\.C\.D\.?)\s*{DIAMETER_PREFIX}?\s*(?P<value>{NUMBER})"
                        ),
                        PitchCircle,
                        true,
                    )?,
                    pattern(
                        &format!(r"{DIAMETER_PREFIX}\s*(?P<value>{NUMBER})\s*(?:PCD|BCD)\b"),
                        PitchCircle,
                        true,
                    )?,
                    diameter()?,
                ],
                (60.0, 120.0),
                anchors(&["PCD", "BCD", "PITCH", "CIRCLE"]),
                ModeVote,
                Optional,
                ContextMode::Text,
                1,
                true,
            ),
            MeasurementCategory::AllDiameters => (
                vec![
                    diameter()?,
                    pattern(&format!(r"\bM(?P<value>{NUMBER})\b"), Thread, false)?,
                ],
                (0.5, 2000.0),
                Vec::new(),
                DedupList,
                Optional,
                ContextMode::Text,
                0,
                true,
            ),
        };

    Ok(CategorySpec {
        category,
        patterns,
        range: PlausibilityRange::new(category, lo, hi)?,
        anchors: anchor_words,
        strategy,
        anchor_policy: policy,
        context_mode: mode,
        window,
        multi_pass,
    })
}
