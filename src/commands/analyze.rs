use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::ocr::parse_tsv;
use crate::cli::{AnalyzeArgs, OutputFormat};
use crate::config::RunConfig;
use crate::engine::assemble::{QuestionRow, SlotAnswer, SlotMapping, assemble};
use crate::engine::library::{MeasurementCategory, PatternLibrary};
use crate::engine::types::{Page, Transcript};
use crate::engine::{PageExtraction, extract_page};
use crate::error::BoundaryError;

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    page: u32,
    transcripts: Vec<String>,
    token_count: Option<usize>,
    answers: Vec<SlotAnswer>,
    extraction: PageExtraction,
}

/// Runs the engine over transcripts already on disk. The first transcript is
/// the primary pass.
pub fn run(args: AnalyzeArgs) -> Result<()> {
    let config = RunConfig::from_cli(args.config.as_deref())?;
    let (library, problems) = PatternLibrary::configured(&config.categories)?;
    for problem in &problems {
        warn!(error = %problem, "configuration problem");
    }

    let categories = parse_categories(&args.categories)?;
    let page = load_page(args.page, &args.transcripts, args.tokens.as_deref())?;

    info!(
        page = page.number,
        transcripts = page.transcripts.len(),
        tokens = page.tokens.as_ref().map(Vec::len).unwrap_or_default(),
        categories = categories.len(),
        "analyzing transcripts"
    );

    let extraction = extract_page(&library, &page, &categories, config.spatial_band);
    let questions = categories
        .iter()
        .enumerate()
        .map(|(index, category)| QuestionRow {
            row: index as u32 + 1,
            question: category.to_string(),
        })
        .collect::<Vec<QuestionRow>>();
    let slots = categories
        .iter()
        .map(|category| Ok(*category))
        .collect::<Vec<SlotMapping>>();
    let answers = assemble(&extraction, &slots, &questions);

    let mut output = io::BufWriter::new(io::stdout().lock());
    match args.format {
        OutputFormat::Json => {
            let response = AnalyzeResponse {
                page: page.number,
                transcripts: page
                    .transcripts
                    .iter()
                    .map(|transcript| transcript.pass.clone())
                    .collect(),
                token_count: page.tokens.as_ref().map(Vec::len),
                answers,
                extraction,
            };
            serde_json::to_writer_pretty(&mut output, &response)
                .context("failed to serialize analyze json output")?;
            writeln!(output)?;
        }
        OutputFormat::Text => write_text_report(&mut output, page.number, &answers)?,
    }
    output.flush()?;
    Ok(())
}

pub fn parse_categories(names: &[String]) -> Result<Vec<MeasurementCategory>> {
    if names.is_empty() {
        return Ok(MeasurementCategory::ALL.to_vec());
    }

    let mut categories = Vec::new();
    for name in names {
        let category = name
            .parse::<MeasurementCategory>()
            .with_context(|| format!("invalid --category {name:?}"))?;
        if !categories.contains(&category) {
            categories.push(category);
        }
    }
    Ok(categories)
}

pub fn load_page(number: u32, transcripts: &[PathBuf], tokens: Option<&Path>) -> Result<Page> {
    let mut page = Page {
        number,
        ..Page::default()
    };

    for (index, path) in transcripts.iter().enumerate() {
        let text = read_input(path, "transcript")?;
        let pass = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("pass{index}"));
        page.transcripts.push(Transcript::new(pass, index == 0, &text));
    }

    if let Some(path) = tokens {
        page.tokens = Some(parse_tsv(&read_input(path, "token TSV")?));
    }

    Ok(page)
}

fn read_input(path: &Path, what: &'static str) -> Result<String> {
    if !path.is_file() {
        return Err(BoundaryError::MissingInput {
            what,
            path: path.to_path_buf(),
        }
        .into());
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_text_report(output: &mut impl Write, page: u32, answers: &[SlotAnswer]) -> Result<()> {
    writeln!(output, "Page {page}")?;
    for answer in answers {
        writeln!(
            output,
            "{:<22} {:<28} {}",
            answer.question,
            answer.value.render(),
            answer.explanation
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::assemble::SlotValue;

    #[test]
    fn empty_category_list_means_every_category() {
        assert_eq!(parse_categories(&[]).expect("all").len(), MeasurementCategory::ALL.len());
    }

    #[test]
    fn category_list_is_deduplicated_and_validated() {
        let names = vec!["pcd".to_string(), "circle_diameter".to_string(), "width".to_string()];
        assert_eq!(
            parse_categories(&names).expect("parse"),
            vec![MeasurementCategory::CircleDiameter, MeasurementCategory::Width]
        );
        assert!(parse_categories(&["surface_finish".to_string()]).is_err());
    }

    #[test]
    fn transcripts_on_disk_are_analyzed_like_ocr_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let primary = dir.path().join("psm6.txt");
        let extra = dir.path().join("psm11.txt");
        fs::write(&primary, "6 HOLES EQ SP ON PCD ⌀90\n⌀140\n").expect("write primary");
        fs::write(&extra, "CHAMFER 45° TYP\n").expect("write extra");

        let page = load_page(5, &[primary, extra], None).expect("load");
        assert_eq!(page.transcripts.len(), 2);
        assert!(page.transcripts[0].primary);
        assert_eq!(page.transcripts[1].pass, "psm11");

        let library = PatternLibrary::builtin().expect("library");
        let categories = vec![MeasurementCategory::CircleDiameter];
        let extraction =
            extract_page(&library, &page, &categories, RunConfig::default().spatial_band);
        let questions = vec![QuestionRow {
            row: 1,
            question: "circle_diameter".to_string(),
        }];
        let answers = assemble(&extraction, &[Ok(MeasurementCategory::CircleDiameter)], &questions);
        assert_eq!(answers[0].value, SlotValue::Scalar(90.0));

        let mut rendered = Vec::new();
        write_text_report(&mut rendered, 5, &answers).expect("render");
        let rendered = String::from_utf8(rendered).expect("utf8");
        assert!(rendered.starts_with("Page 5\n"));
        assert!(rendered.contains("circle_diameter"));
        assert!(rendered.contains("90"));
    }

    #[test]
    fn missing_transcript_is_a_boundary_error() {
        let error = load_page(1, &[PathBuf::from("/nonexistent/psm6.txt")], None)
            .expect_err("missing file");
        assert!(error.downcast_ref::<BoundaryError>().is_some());
    }
}
