//! Dimension extraction engine: normalized OCR text in, one resolved answer
//! per measurement category out.

pub mod aggregate;
pub mod assemble;
pub mod context;
pub mod extract;
pub mod filter;
pub mod library;
pub mod normalize;
pub mod resolve;
pub mod types;


use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use self::context::SpatialBand;
use self::library::{CategorySpec, ContextMode, MeasurementCategory, PatternLibrary};
use self::resolve::Resolution;
use self::types::Page;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryOutcome {
    pub category: MeasurementCategory,
    pub resolution: Resolution,
    pub candidates_found: usize,
    pub admitted: usize,
    pub failure: Option<String>,
}

impl CategoryOutcome {
    fn failed(category: MeasurementCategory, reason: String) -> Self {
        Self {
            category,
            resolution: Resolution::NotFound,
            candidates_found: 0,
            admitted: 0,
            failure: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageExtraction {
    pub page: u32,
    pub outcomes: BTreeMap<MeasurementCategory, CategoryOutcome>,
}

pub fn extract_page(
    library: &PatternLibrary,
    page: &Page,
    categories: &[MeasurementCategory],
    band: SpatialBand,
) -> PageExtraction {
    let mut outcomes = BTreeMap::new();
    for category in categories {
        let outcome = match library.get(*category) {
            Some(spec) => extract_category(spec, page, band),
            None => CategoryOutcome::failed(
                *category,
                format!("{category} has no pattern library entry"),
            ),
        };
        debug!(
            page = page.number,
            category = %category,
            candidates = outcome.candidates_found,
            admitted = outcome.admitted,
            found = outcome.resolution.is_found(),
            "category resolved"
        );
        outcomes.insert(*category, outcome);
    }

    PageExtraction {
        page: page.number,
        outcomes,
    }
}

pub fn extract_category(spec: &CategorySpec, page: &Page, band: SpatialBand) -> CategoryOutcome {
    let scored = match spec.context_mode {
        ContextMode::Text => {
            let text = aggregate::combine(page, spec.multi_pass);
            if text.is_empty() {
                return CategoryOutcome::failed(spec.category, no_text_reason(page, spec));
            }
            let candidates = extract::extract_from_text(spec, &text);
            context::score_text(spec, &text, candidates)
        }
        ContextMode::Spatial => {
            let Some(tokens) = page.tokens.as_deref() else {
                return CategoryOutcome::failed(
                    spec.category,
                    "OCR produced no positioned tokens for this page".to_string(),
                );
            };
            let tokens = aggregate::normalize_tokens(tokens);
            let candidates = extract::extract_from_tokens(spec, &tokens, page.transcripts.len());
            context::score_spatial(spec, &tokens, band, candidates)
        }
    };

    let candidates_found = scored.len();
    let admitted = filter::admit(spec.range, scored);
    let admitted = context::narrow_to_nearest(spec, admitted);
    let admitted = context::prefer_anchored(spec, admitted);

    CategoryOutcome {
        category: spec.category,
        resolution: resolve::resolve(spec.strategy, &admitted),
        candidates_found,
        admitted: admitted.len(),
        failure: None,
    }
}

fn no_text_reason(page: &Page, spec: &CategorySpec) -> String {
    if page.failed_passes.is_empty() {
        return "OCR returned no text for this page".to_string();
    }
    let scope = if spec.multi_pass { "all passes" } else { "primary pass" };
    format!(
        "OCR failed ({scope}): {}",
        page.failed_passes.join("; ")
    )
}
