use serde::{Deserialize, Serialize};

use super::library::MeasurementCategory;
use super::resolve::{Resolution, Resolved};
use super::types::CounterboreCallout;
use super::{CategoryOutcome, PageExtraction};
use crate::error::ConfigurationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRow {
    pub row: u32,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SlotValue {
    NotFound,
    Scalar(f64),
    Composite(String),
    List(Vec<String>),
}

impl SlotValue {
    pub fn is_found(&self) -> bool {
        !matches!(self, Self::NotFound)
    }

    pub fn render(&self) -> String {
        match self {
            Self::NotFound => "not found".to_string(),
            Self::Scalar(value) => format_measure(*value),
            Self::Composite(text) => text.clone(),
            Self::List(values) => values.join(", "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotAnswer {
    pub row: u32,
    pub question: String,
    pub category: Option<MeasurementCategory>,
    pub value: SlotValue,
    pub explanation: String,
}

pub type SlotMapping = Result<MeasurementCategory, ConfigurationError>;

/// Pairs each question row of a page with the configured category name at the
/// same position. Rows past the end of the configuration have no slot.
pub fn map_slots(page: u32, slot_names: &[String], questions: &[QuestionRow]) -> Vec<SlotMapping> {
    questions
        .iter()
        .enumerate()
        .map(|(index, question)| match slot_names.get(index) {
            Some(name) => name.parse::<MeasurementCategory>(),
            None => Err(ConfigurationError::UnmappedQuestion {
                page,
                row: question.row,
            }),
        })
        .collect()
}

pub fn assemble(
    extraction: &PageExtraction,
    slots: &[SlotMapping],
    questions: &[QuestionRow],
) -> Vec<SlotAnswer> {
    questions
        .iter()
        .zip(slots)
        .map(|(question, slot)| match slot {
            Ok(category) => answer_for(question, *category, extraction.outcomes.get(category)),
            Err(error) => SlotAnswer {
                row: question.row,
                question: question.question.clone(),
                category: None,
                value: SlotValue::NotFound,
                explanation: error.to_string(),
            },
        })
        .collect()
}

fn answer_for(
    question: &QuestionRow,
    category: MeasurementCategory,
    outcome: Option<&CategoryOutcome>,
) -> SlotAnswer {
    let (value, explanation) = match outcome {
        None => (
            SlotValue::NotFound,
            format!("{category} was not extracted for this page"),
        ),
        Some(outcome) => match &outcome.resolution {
            Resolution::NotFound => (
                SlotValue::NotFound,
                outcome.failure.clone().unwrap_or_else(|| {
                    format!(
                        "no plausible {category} value ({} candidates, {} in range)",
                        outcome.candidates_found, outcome.admitted
                    )
                }),
            ),
            Resolution::Value(resolved) => (slot_value(category, resolved), explain(resolved)),
            Resolution::List { values } => (
                SlotValue::List(values.iter().map(render_with_symbol).collect()),
                values
                    .iter()
                    .map(explain)
                    .collect::<Vec<String>>()
                    .join("; "),
            ),
        },
    };

    SlotAnswer {
        row: question.row,
        question: question.question.clone(),
        category: Some(category),
        value,
        explanation,
    }
}

fn slot_value(category: MeasurementCategory, resolved: &Resolved) -> SlotValue {
    match (category, resolved.callout) {
        (MeasurementCategory::CounterboreDepth, Some(callout)) => {
            SlotValue::Composite(format_callout(&callout))
        }
        _ => SlotValue::Scalar(resolved.value),
    }
}

fn explain(resolved: &Resolved) -> String {
    format!(
        "{} from \"{}\" (pass {}, line {}, {} vote{})",
        render_with_symbol(resolved),
        resolved.context,
        resolved.origin.source,
        resolved.origin.line + 1,
        resolved.votes,
        if resolved.votes == 1 { "" } else { "s" }
    )
}

fn render_with_symbol(resolved: &Resolved) -> String {
    format!("{}{}", resolved.symbol.prefix(), format_measure(resolved.value))
}

pub fn format_callout(callout: &CounterboreCallout) -> String {
    let through = if callout.through { " THRU" } else { "" };
    format!(
        "⌀{}{} X ⌀{} Z {}",
        format_measure(callout.hole_diameter),
        through,
        format_measure(callout.bore_diameter),
        format_measure(callout.depth)
    )
}

pub fn format_measure(value: f64) -> String {
    format!("{value}")
}
