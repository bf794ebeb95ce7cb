use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;
use umya_spreadsheet::Spreadsheet;

use crate::engine::assemble::SlotAnswer;
use crate::util::{now_utc_string, write_json_atomic};

pub trait AnswerSink: Send {
    fn write_page(&mut self, page: u32, answers: &[SlotAnswer]) -> Result<()>;
}

/// Writes every page to both sinks, the first one first.
impl<A: AnswerSink, B: AnswerSink> AnswerSink for (A, B) {
    fn write_page(&mut self, page: u32, answers: &[SlotAnswer]) -> Result<()> {
        self.0.write_page(page, answers)?;
        self.1.write_page(page, answers)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellFill {
    LightGreen,
    LightPink,
}

impl CellFill {
    pub fn for_answer(found: bool) -> Self {
        if found { Self::LightGreen } else { Self::LightPink }
    }

    pub fn argb(self) -> &'static str {
        match self {
            Self::LightGreen => "FFC6EFCE",
            Self::LightPink => "FFFFC7CE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerCell {
    pub row: u32,
    pub cell: String,
    pub question: String,
    pub answer: String,
    pub fill: CellFill,
    pub fill_argb: String,
    pub category: Option<String>,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageAnswers {
    pub found: usize,
    pub not_found: usize,
    pub written_at: String,
    pub cells: Vec<AnswerCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerSheetDocument {
    pub manifest_version: u32,
    pub workbook: String,
    pub sheet: String,
    pub answer_column: String,
    pub updated_at: String,
    pub pages: BTreeMap<u32, PageAnswers>,
}

/// Answer cells keyed by workbook row, rewritten in full after every page.
#[derive(Debug)]
pub struct JsonAnswerSheet {
    path: PathBuf,
    document: AnswerSheetDocument,
}

impl JsonAnswerSheet {
    pub fn create(path: &Path, workbook: &Path, sheet: &str, answer_column: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            document: AnswerSheetDocument {
                manifest_version: 1,
                workbook: workbook.display().to_string(),
                sheet: sheet.to_string(),
                answer_column: answer_column.to_ascii_uppercase(),
                updated_at: now_utc_string(),
                pages: BTreeMap::new(),
            },
        }
    }

    pub fn document(&self) -> &AnswerSheetDocument {
        &self.document
    }
}

pub fn answer_cells(answer_column: &str, answers: &[SlotAnswer]) -> Vec<AnswerCell> {
    answers
        .iter()
        .map(|answer| {
            let fill = CellFill::for_answer(answer.value.is_found());
            AnswerCell {
                row: answer.row,
                cell: format!("{answer_column}{}", answer.row),
                question: answer.question.clone(),
                answer: answer.value.render(),
                fill,
                fill_argb: fill.argb().to_string(),
                category: answer.category.map(|category| category.to_string()),
                explanation: answer.explanation.clone(),
            }
        })
        .collect()
}

impl AnswerSink for JsonAnswerSheet {
    fn write_page(&mut self, page: u32, answers: &[SlotAnswer]) -> Result<()> {
        let cells = answer_cells(&self.document.answer_column, answers);

        let found = cells
            .iter()
            .filter(|cell| cell.fill == CellFill::LightGreen)
            .count();
        let written_at = now_utc_string();

        self.document.pages.insert(
            page,
            PageAnswers {
                found,
                not_found: cells.len() - found,
                written_at: written_at.clone(),
                cells,
            },
        );
        self.document.updated_at = written_at;

        write_json_atomic(&self.path, &self.document)?;
        debug!(page, path = %self.path.display(), "answer sheet saved");
        Ok(())
    }
}

/// The questionnaire workbook itself: each answer lands in the answer column
/// of its question row with a green or pink fill, and the workbook is saved
/// after every page.
pub struct XlsxAnswerSheet {
    target: PathBuf,
    sheet: String,
    answer_column: String,
    book: Spreadsheet,
}

impl XlsxAnswerSheet {
    /// Reads `source` and saves into `target`, which may be the same file.
    pub fn open(source: &Path, target: &Path, sheet: &str, answer_column: &str) -> Result<Self> {
        let book = umya_spreadsheet::reader::xlsx::read(source)
            .map_err(|err| anyhow!("failed to open workbook {}: {err}", source.display()))?;
        if book.get_sheet_by_name(sheet).is_none() {
            bail!("workbook {} has no sheet named {sheet:?}", source.display());
        }

        Ok(Self {
            target: target.to_path_buf(),
            sheet: sheet.to_string(),
            answer_column: answer_column.to_ascii_uppercase(),
            book,
        })
    }

    fn save(&self) -> Result<()> {
        let file_name = self
            .target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "answers.xlsx".to_string());
        let staging = self
            .target
            .with_file_name(format!(".{file_name}.{}.tmp.xlsx", std::process::id()));

        umya_spreadsheet::writer::xlsx::write(&self.book, &staging)
            .map_err(|err| anyhow!("failed to write workbook {}: {err}", staging.display()))?;
        fs::rename(&staging, &self.target).with_context(|| {
            format!(
                "failed to move {} into place at {}",
                staging.display(),
                self.target.display()
            )
        })
    }
}

impl AnswerSink for XlsxAnswerSheet {
    fn write_page(&mut self, page: u32, answers: &[SlotAnswer]) -> Result<()> {
        let cells = answer_cells(&self.answer_column, answers);
        let worksheet = self
            .book
            .get_sheet_by_name_mut(&self.sheet)
            .ok_or_else(|| anyhow!("sheet {:?} disappeared from the workbook", self.sheet))?;

        for cell in &cells {
            worksheet
                .get_cell_mut(cell.cell.as_str())
                .set_value(cell.answer.clone());
            worksheet
                .get_style_mut(cell.cell.as_str())
                .set_background_color(cell.fill.argb());
        }

        self.save()?;
        debug!(page, path = %self.target.display(), cells = cells.len(), "workbook saved");
        Ok(())
    }
}
