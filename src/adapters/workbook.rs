use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use calamine::{Data, Range, Reader, open_workbook_auto};
use regex::Regex;
use tracing::{debug, warn};

use crate::engine::assemble::QuestionRow;
use crate::error::BoundaryError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Questionnaire {
    pub sheet: String,
    pub pages: BTreeMap<u32, Vec<QuestionRow>>,
}

impl Questionnaire {
    pub fn question_count(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }
}

/// Reads the first worksheet. A `Page-<N>` cell in the question column opens
/// the block for drawing page N; every following non-empty cell is a question
/// on that page until the next marker.
pub fn read_questionnaire(path: &Path, question_column: u32) -> Result<Questionnaire> {
    let mut workbook = open_workbook_auto(path).map_err(|err| BoundaryError::UnreadableWorkbook {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let Some(sheet) = workbook.sheet_names().first().cloned() else {
        return Err(BoundaryError::UnreadableWorkbook {
            path: path.to_path_buf(),
            reason: "workbook has no worksheets".to_string(),
        }
        .into());
    };

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|err| BoundaryError::UnreadableWorkbook {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

    let pages = parse_range(&range, question_column)?;
    if pages.is_empty() {
        return Err(BoundaryError::NoPageMarkers {
            path: path.to_path_buf(),
        }
        .into());
    }

    debug!(
        workbook = %path.display(),
        sheet = %sheet,
        pages = pages.len(),
        "questionnaire loaded"
    );

    Ok(Questionnaire { sheet, pages })
}

pub fn parse_range(range: &Range<Data>, question_column: u32) -> Result<BTreeMap<u32, Vec<QuestionRow>>> {
    let marker = Regex::new(r"(?i)^page\s*-\s*(\d+)$").context("failed to compile page marker")?;
    let mut pages: BTreeMap<u32, Vec<QuestionRow>> = BTreeMap::new();

    let (Some((start_row, _)), Some((end_row, _))) = (range.start(), range.end()) else {
        return Ok(pages);
    };

    let mut current_page: Option<u32> = None;
    for row in start_row..=end_row {
        let text = range
            .get_value((row, question_column))
            .map(cell_text)
            .unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        if let Some(captures) = marker.captures(text) {
            let page = captures[1]
                .parse::<u32>()
                .with_context(|| format!("invalid page marker {text:?} in row {}", row + 1))?;
            if pages.contains_key(&page) {
                warn!(page, row = row + 1, "page marker repeated; questions are appended");
            }
            pages.entry(page).or_default();
            current_page = Some(page);
            continue;
        }

        match current_page {
            Some(page) => pages.entry(page).or_default().push(QuestionRow {
                row: row + 1,
                question: text.to_string(),
            }),
            None => debug!(row = row + 1, "skipping text before the first page marker"),
        }
    }

    Ok(pages)
}

/// Spreadsheet column letters to a zero-based index: `A` is 0, `AA` is 26.
pub fn column_index(letters: &str) -> Result<u32> {
    let letters = letters.trim();
    if letters.is_empty() || !letters.chars().all(|character| character.is_ascii_alphabetic()) {
        bail!("invalid spreadsheet column {letters:?}");
    }

    let index = letters.chars().try_fold(0u32, |acc, character| {
        let digit = u32::from(character.to_ascii_uppercase() as u8 - b'A') + 1;
        acc.checked_mul(26).and_then(|value| value.checked_add(digit))
    });

    match index {
        Some(index) => Ok(index - 1),
        None => bail!("spreadsheet column {letters:?} is out of range"),
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.clone(),
        Data::Float(value) => value.to_string(),
        Data::Int(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        Data::DateTimeIso(value) | Data::DurationIso(value) => value.clone(),
        Data::Error(_) => String::new(),
        other => other.to_string(),
    }
}
