use std::collections::HashSet;

use regex::Captures;
use tracing::trace;

use super::aggregate::CombinedText;
use super::library::CategorySpec;
use super::types::{BoundingBox, Candidate, CounterboreCallout, Origin, TextToken};

struct LineInput<'a> {
    text: &'a str,
    source: usize,
    line: usize,
    bbox: Option<BoundingBox>,
}

pub fn extract_from_text(spec: &CategorySpec, text: &CombinedText) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut seen = HashSet::new();

    for (source, line, line_text) in text.lines() {
        let input = LineInput {
            text: line_text,
            source,
            line,
            bbox: None,
        };
        extract_line(spec, &input, &mut seen, &mut candidates);
    }

    candidates
}

/// Token-mode extraction: every token is treated as its own line so that the
/// candidate inherits the token's box.
pub fn extract_from_tokens(
    spec: &CategorySpec,
    tokens: &[TextToken],
    source: usize,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut seen = HashSet::new();

    for (index, token) in tokens.iter().enumerate() {
        let input = LineInput {
            text: &token.text,
            source,
            line: index,
            bbox: Some(token.bbox),
        };
        extract_line(spec, &input, &mut seen, &mut candidates);
    }

    candidates
}

fn extract_line(
    spec: &CategorySpec,
    input: &LineInput<'_>,
    seen: &mut HashSet<(usize, usize, usize)>,
    candidates: &mut Vec<Candidate>,
) {
    if input.text.is_empty() {
        return;
    }

    for pattern in &spec.patterns {
        for captures in pattern.regex.captures_iter(input.text) {
            let Some(value_match) = captures.name("value") else {
                continue;
            };

            // Two patterns hitting the same number are one occurrence.
            if !seen.insert((input.source, input.line, value_match.start())) {
                continue;
            }

            let Some(value) = parse_number(value_match.as_str()) else {
                trace!(
                    category = %spec.category,
                    raw = value_match.as_str(),
                    "dropping non-numeric capture"
                );
                continue;
            };

            let match_start = captures.get(0).map(|whole| whole.start()).unwrap_or(0);
            candidates.push(Candidate {
                category: spec.category,
                value,
                symbol: pattern.symbol,
                context: input.text.to_string(),
                origin: Origin {
                    source: input.source,
                    line: input.line,
                    column: char_column(input.text, match_start),
                },
                bbox: input.bbox,
                callout: counterbore_callout(&captures, value),
                self_anchored: pattern.self_anchored,
                anchor_distance: None,
            });
        }
    }
}

fn counterbore_callout(captures: &Captures<'_>, depth: f64) -> Option<CounterboreCallout> {
    let hole_diameter = captures
        .name("hole")
        .and_then(|hole| parse_number(hole.as_str()))?;
    let bore_diameter = captures
        .name("bore")
        .and_then(|bore| parse_number(bore.as_str()))?;

    Some(CounterboreCallout {
        hole_diameter,
        through: captures.name("thru").is_some(),
        bore_diameter,
        depth,
    })
}

pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

pub fn char_column(text: &str, byte_offset: usize) -> usize {
    text.get(..byte_offset)
        .map(|prefix| prefix.chars().count())
        .unwrap_or(0)
}
