use std::collections::HashMap;

use serde::Serialize;

use super::filter::Admitted;
use super::library::{ResolutionStrategy, SymbolKind};
use super::types::{Candidate, CounterboreCallout, Origin};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved {
    pub value: f64,
    pub symbol: SymbolKind,
    pub context: String,
    pub origin: Origin,
    pub votes: usize,
    pub callout: Option<CounterboreCallout>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    NotFound,
    Value(Resolved),
    List { values: Vec<Resolved> },
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

struct ValueGroup<'a> {
    first: &'a Candidate,
    votes: usize,
}

impl ValueGroup<'_> {
    fn into_resolved(self) -> Resolved {
        Resolved {
            value: self.first.value,
            symbol: self.first.symbol,
            context: self.first.context.clone(),
            origin: self.first.origin,
            votes: self.votes,
            callout: self.first.callout,
        }
    }
}

pub fn resolve(strategy: ResolutionStrategy, admitted: &Admitted) -> Resolution {
    if admitted.is_empty() {
        return Resolution::NotFound;
    }
    let groups = group_by_value(admitted);

    let winner = match strategy {
        ResolutionStrategy::ModeVote => groups.into_iter().min_by(|left, right| {
            right
                .votes
                .cmp(&left.votes)
                .then(left.first.origin.cmp(&right.first.origin))
        }),
        ResolutionStrategy::Min => groups
            .into_iter()
            .min_by(|left, right| left.first.value.total_cmp(&right.first.value)),
        ResolutionStrategy::Max => groups
            .into_iter()
            .max_by(|left, right| left.first.value.total_cmp(&right.first.value)),
        ResolutionStrategy::DedupList => {
            let mut values = groups
                .into_iter()
                .map(ValueGroup::into_resolved)
                .collect::<Vec<Resolved>>();
            values.sort_by(|left, right| left.value.total_cmp(&right.value));
            return Resolution::List { values };
        }
    };

    winner
        .map(|group| Resolution::Value(group.into_resolved()))
        .unwrap_or(Resolution::NotFound)
}

/// One group per distinct value, represented by its earliest candidate in
/// provenance order regardless of the order the candidates arrived in.
fn group_by_value(admitted: &Admitted) -> Vec<ValueGroup<'_>> {
    let mut groups = HashMap::<u64, ValueGroup<'_>>::new();
    for candidate in admitted.iter() {
        let key = value_key(candidate.value);
        groups
            .entry(key)
            .and_modify(|group| {
                group.votes += 1;
                if candidate.origin < group.first.origin {
                    group.first = candidate;
                }
            })
            .or_insert(ValueGroup {
                first: candidate,
                votes: 1,
            });
    }
    groups.into_values().collect()
}

fn value_key(value: f64) -> u64 {
    // -0.0 and 0.0 are the same reading
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}
