use tracing::trace;

use super::library::PlausibilityRange;
use super::types::Candidate;

/// Candidates that passed the plausibility gate. Only [`admit`] builds one,
/// and the only mutation allowed afterwards removes entries, so every value
/// held here is inside the range it was admitted against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Admitted {
    candidates: Vec<Candidate>,
}

impl Admitted {
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn retain(mut self, keep: impl FnMut(&Candidate) -> bool) -> Self {
        self.candidates.retain(keep);
        self
    }
}

pub fn admit(range: PlausibilityRange, candidates: Vec<Candidate>) -> Admitted {
    Admitted {
        candidates: candidates
            .into_iter()
            .filter(|candidate| {
                let plausible = range.contains(candidate.value);
                if !plausible {
                    trace!(
                        category = %candidate.category,
                        value = candidate.value,
                        lo = range.lo,
                        hi = range.hi,
                        "candidate outside plausibility range"
                    );
                }
                plausible
            })
            .collect(),
    }
}
