use serde::{Deserialize, Serialize};

use super::aggregate::CombinedText;
use super::filter::Admitted;
use super::library::{AnchorPolicy, CategorySpec, ResolutionStrategy};
use super::types::{Candidate, TextToken};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialBand {
    pub vertical_px: f64,
    pub horizontal_px: f64,
}

impl Default for SpatialBand {
    fn default() -> Self {
        Self {
            vertical_px: 20.0,
            horizontal_px: 100.0,
        }
    }
}

pub fn score_text(
    spec: &CategorySpec,
    text: &CombinedText,
    candidates: Vec<Candidate>,
) -> Vec<Candidate> {
    let scored = candidates
        .into_iter()
        .map(|mut candidate| {
            candidate.anchor_distance = if candidate.self_anchored {
                Some(0.0)
            } else {
                text_distance(spec, text, &candidate)
            };
            candidate
        })
        .collect();

    apply_policy(spec, scored)
}

pub fn score_spatial(
    spec: &CategorySpec,
    tokens: &[TextToken],
    band: SpatialBand,
    candidates: Vec<Candidate>,
) -> Vec<Candidate> {
    let anchor_tokens = tokens
        .iter()
        .filter(|token| {
            spec.anchors
                .iter()
                .any(|keyword| !anchor_offsets(&token.text, keyword).is_empty())
        })
        .collect::<Vec<&TextToken>>();

    let scored = candidates
        .into_iter()
        .map(|mut candidate| {
            if candidate.self_anchored {
                candidate.anchor_distance = Some(0.0);
                return candidate;
            }
            let Some(bbox) = candidate.bbox else {
                return candidate;
            };

            let nearest = anchor_tokens
                .iter()
                .filter(|anchor| {
                    bbox.vertical_offset(&anchor.bbox) <= band.vertical_px
                        && bbox.horizontal_gap(&anchor.bbox) <= band.horizontal_px
                })
                .map(|anchor| {
                    let distance = bbox
                        .horizontal_gap(&anchor.bbox)
                        .hypot(bbox.vertical_offset(&anchor.bbox));
                    (distance, *anchor)
                })
                .min_by(|left, right| left.0.total_cmp(&right.0));

            if let Some((distance, anchor)) = nearest {
                candidate.anchor_distance = Some(distance);
                candidate.context = format!("{} (near '{}')", candidate.context, anchor.text);
            }
            candidate
        })
        .collect();

    apply_policy(spec, scored)
}

/// Drops candidates that the category's policy will not accept without an
/// anchor. Ranking for `Nearest` happens after the range filter.
fn apply_policy(spec: &CategorySpec, candidates: Vec<Candidate>) -> Vec<Candidate> {
    match spec.anchor_policy {
        AnchorPolicy::Optional => candidates,
        AnchorPolicy::Required | AnchorPolicy::Nearest => candidates
            .into_iter()
            .filter(|candidate| candidate.anchor_distance.is_some())
            .collect(),
    }
}

pub fn narrow_to_nearest(spec: &CategorySpec, admitted: Admitted) -> Admitted {
    if spec.anchor_policy != AnchorPolicy::Nearest {
        return admitted;
    }

    let best = admitted
        .iter()
        .filter_map(|candidate| candidate.anchor_distance)
        .min_by(f64::total_cmp);
    let Some(best) = best else {
        return admitted;
    };

    admitted.retain(|candidate| candidate.anchor_distance == Some(best))
}

/// Under the `Optional` policy a bare value is only a fallback for when no
/// anchored candidate survived the range gate. Self-anchored readings outrank
/// values that merely sit near a label, and extremum categories keep only the
/// readings closest to their label before taking the min or max.
pub fn prefer_anchored(spec: &CategorySpec, admitted: Admitted) -> Admitted {
    if spec.anchor_policy != AnchorPolicy::Optional {
        return admitted;
    }

    let best = admitted
        .iter()
        .filter_map(|candidate| candidate.anchor_distance)
        .min_by(f64::total_cmp);
    let Some(best) = best else {
        return admitted;
    };

    match spec.strategy {
        ResolutionStrategy::DedupList => admitted,
        ResolutionStrategy::Min | ResolutionStrategy::Max => {
            admitted.retain(|candidate| candidate.anchor_distance == Some(best))
        }
        ResolutionStrategy::ModeVote => {
            if admitted.iter().any(|candidate| candidate.self_anchored) {
                admitted.retain(|candidate| candidate.self_anchored)
            } else {
                admitted.retain(|candidate| candidate.anchor_distance.is_some())
            }
        }
    }
}

fn text_distance(spec: &CategorySpec, text: &CombinedText, candidate: &Candidate) -> Option<f64> {
    if spec.anchors.is_empty() {
        return None;
    }
    let source = text.source(candidate.origin.source)?;
    if source.lines.is_empty() {
        return None;
    }

    let first = candidate.origin.line.saturating_sub(spec.window);
    let last = (candidate.origin.line + spec.window).min(source.lines.len() - 1);

    // Offsets are measured in the window joined with newlines.
    let mut base = 0usize;
    let mut candidate_offset = None;
    let mut anchor_offsets_in_window = Vec::new();
    for (line_index, line) in source.lines.iter().enumerate().take(last + 1).skip(first) {
        if line_index == candidate.origin.line {
            candidate_offset = Some(base + candidate.origin.column);
        }
        for keyword in &spec.anchors {
            anchor_offsets_in_window.extend(
                anchor_offsets(line, keyword)
                    .into_iter()
                    .map(|offset| base + offset),
            );
        }
        base += line.chars().count() + 1;
    }

    let candidate_offset = candidate_offset?;
    anchor_offsets_in_window
        .into_iter()
        .map(|offset| offset.abs_diff(candidate_offset) as f64)
        .min_by(f64::total_cmp)
}

/// Character offsets of case-insensitive `keyword` occurrences in `line` that
/// are not glued to other ASCII letters.
pub fn anchor_offsets(line: &str, keyword: &str) -> Vec<usize> {
    let haystack = line
        .chars()
        .map(|character| character.to_uppercase().next().unwrap_or(character))
        .collect::<Vec<char>>();
    let needle = keyword
        .chars()
        .map(|character| character.to_uppercase().next().unwrap_or(character))
        .collect::<Vec<char>>();

    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }

    let mut offsets = Vec::new();
    for start in 0..=(haystack.len() - needle.len()) {
        if haystack[start..start + needle.len()] != needle[..] {
            continue;
        }
        let end = start + needle.len();
        let glued_before = start > 0 && haystack[start - 1].is_ascii_alphabetic();
        let glued_after = haystack
            .get(end)
            .map(|character| character.is_ascii_alphabetic())
            .unwrap_or(false);
        if !glued_before && !glued_after {
            offsets.push(start);
        }
    }

    offsets
}
