use super::normalize::{normalize_line, normalize_transcript};
use super::types::{Page, TextToken, Transcript};

#[derive(Debug, Clone, PartialEq)]
pub struct SourceText {
    pub index: usize,
    pub lines: Vec<String>,
}

/// Normalized transcripts of one page laid end to end. Each source keeps its
/// own line numbering so candidates can be traced back to the OCR pass that
/// produced them, and context windows never straddle two passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedText {
    pub sources: Vec<SourceText>,
}

impl CombinedText {
    pub fn from_transcripts<'a>(
        transcripts: impl IntoIterator<Item = (usize, &'a Transcript)>,
    ) -> Self {
        let sources = transcripts
            .into_iter()
            .map(|(index, transcript)| SourceText {
                index,
                lines: normalize_transcript(&transcript.lines),
            })
            .collect();
        Self { sources }
    }

    pub fn is_empty(&self) -> bool {
        self.sources
            .iter()
            .all(|source| source.lines.iter().all(|line| line.is_empty()))
    }

    pub fn source(&self, index: usize) -> Option<&SourceText> {
        self.sources.iter().find(|source| source.index == index)
    }

    /// The combined stream in concatenation order, as (source, line, text).
    pub fn lines(&self) -> impl Iterator<Item = (usize, usize, &str)> + '_ {
        self.sources.iter().flat_map(|source| {
            source
                .lines
                .iter()
                .enumerate()
                .map(move |(line, text)| (source.index, line, text.as_str()))
        })
    }
}

/// Selects the transcripts a category reads: every pass when it is marked
/// multi-pass, otherwise only the primary one.
pub fn combine(page: &Page, multi_pass: bool) -> CombinedText {
    CombinedText::from_transcripts(
        page.transcripts
            .iter()
            .enumerate()
            .filter(|(_, transcript)| multi_pass || transcript.primary),
    )
}

pub fn normalize_tokens(tokens: &[TextToken]) -> Vec<TextToken> {
    tokens
        .iter()
        .map(|token| TextToken {
            text: normalize_line(&token.text),
            bbox: token.bbox,
        })
        .filter(|token| !token.text.is_empty())
        .collect()
}
