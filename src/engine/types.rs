use serde::{Deserialize, Serialize};

use super::library::{MeasurementCategory, SymbolKind};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Edge-to-edge horizontal gap; zero when the boxes overlap on the x axis.
    pub fn horizontal_gap(&self, other: &BoundingBox) -> f64 {
        if other.x > self.right() {
            other.x - self.right()
        } else if self.x > other.right() {
            self.x - other.right()
        } else {
            0.0
        }
    }

    pub fn vertical_offset(&self, other: &BoundingBox) -> f64 {
        (self.center_y() - other.center_y()).abs()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextToken {
    pub text: String,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    pub pass: String,
    pub primary: bool,
    pub lines: Vec<String>,
}

impl Transcript {
    pub fn new(pass: impl Into<String>, primary: bool, text: &str) -> Self {
        Self {
            pass: pass.into(),
            primary,
            lines: text.lines().map(ToOwned::to_owned).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub number: u32,
    pub transcripts: Vec<Transcript>,
    pub tokens: Option<Vec<TextToken>>,
    pub failed_passes: Vec<String>,
}

/// Provenance of a candidate. The derived ordering is the "first seen"
/// order used for tie-breaks: source transcript, then line, then column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Origin {
    pub source: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CounterboreCallout {
    pub hole_diameter: f64,
    pub through: bool,
    pub bore_diameter: f64,
    pub depth: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub category: MeasurementCategory,
    pub value: f64,
    pub symbol: SymbolKind,
    pub context: String,
    pub origin: Origin,
    pub bbox: Option<BoundingBox>,
    pub callout: Option<CounterboreCallout>,
    pub self_anchored: bool,
    pub anchor_distance: Option<f64>,
}
