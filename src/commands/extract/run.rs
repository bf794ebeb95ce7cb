use std::path::Path;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use chrono::Utc;
use tracing::{info, warn};

use super::pipeline::{CancelFlag, OcrPlan, PageJob, PagePipeline, PageReport};
use crate::adapters::ocr::TesseractCli;
use crate::adapters::preprocess::Preprocessor;
use crate::adapters::raster::{PdfRasterizer, Poppler, check_page_in_range};
use crate::adapters::sink::{JsonAnswerSheet, XlsxAnswerSheet};
use crate::adapters::workbook::{Questionnaire, column_index, read_questionnaire};
use crate::cli::ExtractArgs;
use crate::config::RunConfig;
use crate::engine::library::PatternLibrary;
use crate::model::{PageSummary, RunCounts, RunManifest, RunPaths, SourceHash, ToolVersions};
use crate::util::{
    command_version_optional, ensure_directory, now_utc_string, sha256_file, utc_compact_string,
    write_json_atomic,
};

const MANIFEST_VERSION: u32 = 1;

pub fn run(args: ExtractArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let mut config = RunConfig::from_cli(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let (pdf_path, workbook_path) = config.require_inputs()?;
    let output_dir = config.output_dir();
    ensure_directory(&output_dir)?;
    let answers_path = output_dir.join("answers.json");
    let answers_workbook = config.answers_workbook_path(&workbook_path);
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        output_dir.join(format!("run_{}.json", utc_compact_string(started_ts)))
    });

    info!(
        run_id = %run_id,
        pdf = %pdf_path.display(),
        workbook = %workbook_path.display(),
        jobs = config.jobs,
        "starting extraction"
    );

    let question_column = column_index(&config.question_column)?;
    column_index(&config.answer_column)?;
    let questionnaire = read_questionnaire(&workbook_path, question_column)?;
    info!(
        sheet = %questionnaire.sheet,
        pages = questionnaire.pages.len(),
        questions = questionnaire.question_count(),
        "questionnaire loaded"
    );

    let (library, problems) = PatternLibrary::configured(&config.categories)?;
    let mut warnings = problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<String>>();

    let rasterizer = Poppler;
    let page_count = rasterizer.page_count(&pdf_path)?;
    let jobs = plan_jobs(
        &questionnaire,
        &config,
        &args.pages,
        &pdf_path,
        page_count,
        &mut warnings,
    )?;

    let ocr = TesseractCli::new(config.ocr_lang.clone());
    let plan = OcrPlan::from_config(&config);
    let ocr_passes = plan.labels();
    let pipeline = PagePipeline::new(
        &rasterizer,
        &Preprocessor,
        &ocr,
        &library,
        plan,
        config.spatial_band,
        &pdf_path,
    );
    let sink = Mutex::new((
        XlsxAnswerSheet::open(
            &workbook_path,
            &answers_workbook,
            &questionnaire.sheet,
            &config.answer_column,
        )?,
        JsonAnswerSheet::create(
            &answers_path,
            &workbook_path,
            &questionnaire.sheet,
            &config.answer_column,
        ),
    ));

    let reports = pipeline.run_all(&jobs, &sink, &CancelFlag::default(), config.jobs)?;
    let (_, sheet) = sink
        .into_inner()
        .map_err(|_| anyhow!("answer sink lock poisoned"))?;
    for report in &reports {
        warnings.extend(
            report
                .warnings
                .iter()
                .map(|warning| format!("page {}: {warning}", report.page)),
        );
    }

    let counts = summarize(&reports, page_count);
    let manifest = RunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id: run_id.clone(),
        started_at,
        completed_at: now_utc_string(),
        status: "completed".to_string(),
        command: render_extract_command(&args),
        tool_versions: collect_tool_versions(),
        sources: vec![hash_source(&pdf_path)?, hash_source(&workbook_path)?],
        paths: RunPaths {
            output_dir: output_dir.display().to_string(),
            answers_path: answers_path.display().to_string(),
            answers_workbook: answers_workbook.display().to_string(),
            manifest_path: manifest_path.display().to_string(),
        },
        dpi: config.dpi,
        ocr_passes,
        preprocess: config.preprocess,
        jobs: config.jobs,
        counts: counts.clone(),
        pages: reports
            .iter()
            .map(|report| PageSummary {
                page: report.page,
                questions: report.questions,
                found: report.found,
                not_found: report.not_found,
                failed_passes: report.failed_passes.clone(),
                written: report.written,
            })
            .collect(),
        warnings,
    };
    write_json_atomic(&manifest_path, &manifest)?;

    info!(
        run_id = %run_id,
        pages = counts.pages_answered,
        pages_saved = sheet.document().pages.len(),
        found = counts.answers_found,
        not_found = counts.answers_not_found,
        answers = %answers_path.display(),
        workbook = %answers_workbook.display(),
        manifest = %manifest_path.display(),
        "extraction completed"
    );

    Ok(())
}

fn apply_overrides(config: &mut RunConfig, args: &ExtractArgs) {
    if let Some(pdf) = &args.pdf {
        config.pdf_path = Some(pdf.clone());
    }
    if let Some(workbook) = &args.workbook {
        config.workbook_path = Some(workbook.clone());
    }
    if let Some(output_dir) = &args.output_dir {
        config.output_dir = Some(output_dir.clone());
    }
    if let Some(answers_workbook) = &args.answers_workbook {
        config.answers_workbook = Some(answers_workbook.clone());
    }
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
}

/// One job per questionnaire page, optionally limited to `only`. Every page is
/// checked against the document before any OCR runs.
pub(super) fn plan_jobs(
    questionnaire: &Questionnaire,
    config: &RunConfig,
    only: &[u32],
    pdf: &Path,
    page_count: u32,
    warnings: &mut Vec<String>,
) -> Result<Vec<PageJob>> {
    for page in only {
        if !questionnaire.pages.contains_key(page) {
            warn!(page, "requested page has no questionnaire block");
            warnings.push(format!("page {page} has no questionnaire block"));
        }
    }

    let mut jobs = Vec::new();
    for (page, questions) in &questionnaire.pages {
        if !only.is_empty() && !only.contains(page) {
            continue;
        }
        check_page_in_range(pdf, *page, page_count)?;

        if questions.is_empty() {
            warn!(page, "questionnaire block has no questions");
            continue;
        }

        jobs.push(PageJob {
            page: *page,
            questions: questions.clone(),
            slot_names: config.slot_names(*page),
        });
    }

    Ok(jobs)
}

fn summarize(reports: &[PageReport], page_count: u32) -> RunCounts {
    RunCounts {
        page_count,
        pages_requested: reports.len(),
        pages_answered: reports.iter().filter(|report| report.written).count(),
        questions: reports.iter().map(|report| report.questions).sum(),
        answers_found: reports.iter().map(|report| report.found).sum(),
        answers_not_found: reports.iter().map(|report| report.not_found).sum(),
        failed_ocr_passes: reports
            .iter()
            .map(|report| report.failed_passes.len())
            .sum(),
    }
}

fn hash_source(path: &Path) -> Result<SourceHash> {
    Ok(SourceHash {
        path: path.display().to_string(),
        sha256: sha256_file(path)?,
    })
}

fn collect_tool_versions() -> ToolVersions {
    ToolVersions {
        dimcheck: env!("CARGO_PKG_VERSION").to_string(),
        pdfinfo: command_version_optional("pdfinfo", &["-v"]),
        pdftoppm: command_version_optional("pdftoppm", &["-v"]),
        tesseract: command_version_optional("tesseract", &["--version"]),
    }
}

fn render_extract_command(args: &ExtractArgs) -> String {
    let mut command = vec!["dimcheck".to_string(), "extract".to_string()];
    let paths = [
        ("--config", &args.config),
        ("--pdf", &args.pdf),
        ("--workbook", &args.workbook),
        ("--output-dir", &args.output_dir),
        ("--answers-workbook", &args.answers_workbook),
        ("--manifest-path", &args.manifest_path),
    ];
    for (flag, value) in paths {
        if let Some(value) = value {
            command.push(flag.to_string());
            command.push(value.display().to_string());
        }
    }
    if let Some(jobs) = args.jobs {
        command.push("--jobs".to_string());
        command.push(jobs.to_string());
    }
    for page in &args.pages {
        command.push("--page".to_string());
        command.push(page.to_string());
    }
    command.join(" ")
}
