use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Result, bail};

use super::pipeline::{CancelFlag, OcrPlan, PageJob, PagePipeline};
use super::run::plan_jobs;
use crate::adapters::ocr::{OcrEngine, SegmentationMode};
use crate::adapters::preprocess::{Enhancement, ImageEnhancer, PreprocessConfig};
use crate::adapters::raster::{PdfRasterizer, RasterImage};
use crate::adapters::sink::AnswerSink;
use crate::adapters::workbook::Questionnaire;
use crate::config::RunConfig;
use crate::engine::assemble::{QuestionRow, SlotAnswer, SlotValue};
use crate::engine::context::SpatialBand;
use crate::engine::library::{MeasurementCategory, PatternLibrary};
use crate::engine::types::{BoundingBox, TextToken};
use crate::error::{BoundaryError, OcrError};

struct FakeRasterizer {
    page_count: u32,
    broken: HashSet<u32>,
}

impl FakeRasterizer {
    fn new() -> Self {
        Self {
            page_count: 5,
            broken: HashSet::new(),
        }
    }
}

impl PdfRasterizer for FakeRasterizer {
    fn page_count(&self, _pdf: &Path) -> Result<u32> {
        Ok(self.page_count)
    }

    fn rasterize(&self, _pdf: &Path, page: u32, _dpi: u32) -> Result<RasterImage> {
        if self.broken.contains(&page) {
            bail!("pdftoppm crashed on page {page}");
        }
        Ok(RasterImage::borrowed(format!("page-{page}.png")))
    }
}

/// Leaves every render as it is.
struct Untouched;

impl ImageEnhancer for Untouched {
    fn enhance(&self, raster: &RasterImage, _enhancement: Enhancement) -> Result<RasterImage> {
        Ok(RasterImage::borrowed(raster.path()))
    }
}

/// Names each enhanced copy after its enhancement, or fails for the listed
/// enhancements.
#[derive(Default)]
struct NamingEnhancer {
    broken: HashSet<Enhancement>,
    calls: Mutex<Vec<Enhancement>>,
}

impl ImageEnhancer for NamingEnhancer {
    fn enhance(&self, raster: &RasterImage, enhancement: Enhancement) -> Result<RasterImage> {
        self.calls.lock().expect("calls lock").push(enhancement);
        if self.broken.contains(&enhancement) {
            bail!("cannot decode {}", raster.path().display());
        }
        Ok(RasterImage::borrowed(format!("{enhancement}.png")))
    }
}

#[derive(Default)]
struct ScriptedOcr {
    text: HashMap<u8, String>,
    tokens: Option<Vec<TextToken>>,
    calls: Mutex<Vec<String>>,
    images: Mutex<Vec<String>>,
}

impl ScriptedOcr {
    fn with_text(mut self, psm: u8, text: &str) -> Self {
        self.text.insert(psm, text.to_string());
        self
    }

    fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().expect("calls lock").clone();
        calls.sort();
        calls
    }

    fn images(&self) -> Vec<String> {
        let mut images = self.images.lock().expect("images lock").clone();
        images.sort();
        images
    }

    fn record(&self, label: String, image: &Path) {
        self.images
            .lock()
            .expect("images lock")
            .push(format!("{label} {}", image.display()));
        self.calls.lock().expect("calls lock").push(label);
    }
}

impl OcrEngine for ScriptedOcr {
    fn transcribe(&self, image: &Path, mode: SegmentationMode) -> Result<String, OcrError> {
        self.record(mode.to_string(), image);
        self.text
            .get(&mode.0)
            .cloned()
            .ok_or_else(|| OcrError::ExitStatus {
                program: "tesseract",
                status: "exit status: 1".to_string(),
                stderr: format!("no script for {mode}"),
            })
    }

    fn transcribe_tokens(
        &self,
        image: &Path,
        mode: SegmentationMode,
    ) -> Result<Vec<TextToken>, OcrError> {
        self.record(format!("{mode}-tsv"), image);
        self.tokens.clone().ok_or(OcrError::EmptyTranscript {
            pass: format!("{mode}-tsv"),
        })
    }
}

#[derive(Default)]
struct MemorySink {
    pages: BTreeMap<u32, Vec<SlotAnswer>>,
    fail: bool,
}

impl AnswerSink for MemorySink {
    fn write_page(&mut self, page: u32, answers: &[SlotAnswer]) -> Result<()> {
        if self.fail {
            bail!("disk full");
        }
        self.pages.insert(page, answers.to_vec());
        Ok(())
    }
}

fn plan() -> OcrPlan {
    OcrPlan {
        dpi: 300,
        passes: vec![SegmentationMode(6), SegmentationMode(11)],
        token_pass: SegmentationMode(11),
        preprocess: PreprocessConfig::default(),
    }
}

fn job(page: u32, slots: &[&str], question_count: u32) -> PageJob {
    PageJob {
        page,
        questions: (0..question_count)
            .map(|index| QuestionRow {
                row: 10 * page + index,
                question: format!("question {index}"),
            })
            .collect(),
        slot_names: slots.iter().map(|slot| slot.to_string()).collect(),
    }
}

fn token(text: &str, x: f64, y: f64, width: f64) -> TextToken {
    TextToken {
        text: text.to_string(),
        bbox: BoundingBox {
            x,
            y,
            width,
            height: 20.0,
        },
    }
}

#[test]
fn multi_pass_page_is_answered_and_saved() {
    let library = PatternLibrary::builtin().expect("library");
    let rasterizer = FakeRasterizer::new();
    let ocr = ScriptedOcr::default()
        .with_text(6, "CHAMFER 45° TYP\nNOTES")
        .with_text(11, "45° TYP");
    let pipeline = PagePipeline::new(
        &rasterizer,
        &Untouched,
        &ocr,
        &library,
        plan(),
        SpatialBand::default(),
        Path::new("drawing.pdf"),
    );
    let sink = Mutex::new(MemorySink::default());

    let reports = pipeline
        .run_all(
            &[job(3, &["chamfer_angle", "counterbore_depth"], 2)],
            &sink,
            &CancelFlag::default(),
            2,
        )
        .expect("run");

    assert_eq!(reports.len(), 1);
    assert!(reports[0].written);
    assert_eq!(reports[0].found, 1);
    assert_eq!(reports[0].not_found, 1);
    assert!(reports[0].failed_passes.is_empty());
    assert_eq!(ocr.calls(), vec!["psm11", "psm6"]);

    let sink = sink.into_inner().expect("sink");
    let answers = &sink.pages[&3];
    assert_eq!(answers[0].row, 30);
    assert_eq!(answers[0].value, SlotValue::Scalar(45.0));
    assert_eq!(answers[1].value, SlotValue::NotFound);
}

#[test]
fn failed_extra_pass_keeps_primary_answers() {
    let library = PatternLibrary::builtin().expect("library");
    let rasterizer = FakeRasterizer::new();
    let ocr = ScriptedOcr::default().with_text(6, "CHAMFER 45° TYP");
    let pipeline = PagePipeline::new(
        &rasterizer,
        &Untouched,
        &ocr,
        &library,
        plan(),
        SpatialBand::default(),
        Path::new("drawing.pdf"),
    );
    let sink = Mutex::new(MemorySink::default());

    let report = pipeline
        .run_job(&job(3, &["chamfer_angle"], 1), &sink, &CancelFlag::default())
        .expect("run");

    assert_eq!(report.failed_passes.len(), 1);
    assert!(report.failed_passes[0].starts_with("psm11"));
    assert_eq!(report.found, 1);
}

#[test]
fn spatial_only_page_runs_just_the_token_pass() {
    let library = PatternLibrary::builtin().expect("library");
    let rasterizer = FakeRasterizer::new();
    let ocr = ScriptedOcr {
        tokens: Some(vec![
            token("W", 100.0, 200.0, 10.0),
            token("120", 130.0, 200.0, 30.0),
            token("H", 400.0, 500.0, 10.0),
            token("80", 430.0, 500.0, 20.0),
        ]),
        ..ScriptedOcr::default()
    };
    let pipeline = PagePipeline::new(
        &rasterizer,
        &Untouched,
        &ocr,
        &library,
        plan(),
        SpatialBand::default(),
        Path::new("drawing.pdf"),
    );

    let page = pipeline.read_page(2, &[MeasurementCategory::Width]);
    assert!(page.transcripts.is_empty());
    assert_eq!(page.tokens.as_ref().map(Vec::len), Some(4));
    assert_eq!(ocr.calls(), vec!["psm11-tsv"]);

    let sink = Mutex::new(MemorySink::default());
    pipeline
        .run_job(&job(2, &["width"], 1), &sink, &CancelFlag::default())
        .expect("run");
    let sink = sink.into_inner().expect("sink");
    assert_eq!(sink.pages[&2][0].value, SlotValue::Scalar(120.0));
}

#[test]
fn each_pass_reads_its_enhanced_render() {
    let library = PatternLibrary::builtin().expect("library");
    let rasterizer = FakeRasterizer::new();
    let enhancer = NamingEnhancer::default();
    let ocr = ScriptedOcr {
        tokens: Some(vec![
            token("W", 100.0, 200.0, 10.0),
            token("120", 130.0, 200.0, 30.0),
        ]),
        ..ScriptedOcr::default()
    }
    .with_text(6, "CHAMFER 45° TYP")
    .with_text(11, "45° TYP");
    let pipeline = PagePipeline::new(
        &rasterizer,
        &enhancer,
        &ocr,
        &library,
        plan(),
        SpatialBand::default(),
        Path::new("drawing.pdf"),
    );

    let page = pipeline.read_page(
        3,
        &[MeasurementCategory::ChamferAngle, MeasurementCategory::Width],
    );
    assert!(page.failed_passes.is_empty());
    assert_eq!(
        ocr.images(),
        vec!["psm11 symbols.png", "psm11-tsv contrast.png", "psm6 contrast.png"]
    );

    let mut calls = enhancer.calls.into_inner().expect("calls");
    calls.sort();
    assert_eq!(calls, vec![Enhancement::Contrast, Enhancement::Symbols]);
}

#[test]
fn raw_passes_skip_enhancement() {
    let library = PatternLibrary::builtin().expect("library");
    let rasterizer = FakeRasterizer::new();
    let enhancer = NamingEnhancer::default();
    let ocr = ScriptedOcr::default().with_text(6, "CHAMFER 45° TYP");
    let mut raw_plan = plan();
    raw_plan.passes.truncate(1);
    raw_plan.preprocess.primary = Enhancement::Raw;
    let pipeline = PagePipeline::new(
        &rasterizer,
        &enhancer,
        &ocr,
        &library,
        raw_plan,
        SpatialBand::default(),
        Path::new("drawing.pdf"),
    );

    pipeline.read_page(3, &[MeasurementCategory::ChamferAngle]);
    assert_eq!(ocr.images(), vec!["psm6 page-3.png"]);
    assert!(enhancer.calls.into_inner().expect("calls").is_empty());
}

#[test]
fn failed_enhancement_falls_back_to_the_raw_render() {
    let library = PatternLibrary::builtin().expect("library");
    let rasterizer = FakeRasterizer::new();
    let enhancer = NamingEnhancer {
        broken: HashSet::from([Enhancement::Symbols]),
        ..NamingEnhancer::default()
    };
    let ocr = ScriptedOcr::default()
        .with_text(6, "CHAMFER 45° TYP")
        .with_text(11, "45° TYP");
    let pipeline = PagePipeline::new(
        &rasterizer,
        &enhancer,
        &ocr,
        &library,
        plan(),
        SpatialBand::default(),
        Path::new("drawing.pdf"),
    );
    let sink = Mutex::new(MemorySink::default());

    let report = pipeline
        .run_job(&job(3, &["chamfer_angle"], 1), &sink, &CancelFlag::default())
        .expect("run");

    assert!(report.failed_passes.is_empty());
    assert_eq!(report.found, 1);
    assert_eq!(ocr.images(), vec!["psm11 page-3.png", "psm6 contrast.png"]);
}

#[test]
fn rasterization_failure_answers_every_slot_not_found() {
    let library = PatternLibrary::builtin().expect("library");
    let rasterizer = FakeRasterizer {
        broken: HashSet::from([5]),
        ..FakeRasterizer::new()
    };
    let ocr = ScriptedOcr::default().with_text(6, "DISC 5 THK");
    let pipeline = PagePipeline::new(
        &rasterizer,
        &Untouched,
        &ocr,
        &library,
        plan(),
        SpatialBand::default(),
        Path::new("drawing.pdf"),
    );
    let sink = Mutex::new(MemorySink::default());

    let report = pipeline
        .run_job(
            &job(5, &["disc_thickness", "circle_diameter"], 2),
            &sink,
            &CancelFlag::default(),
        )
        .expect("run");

    assert!(report.written);
    assert_eq!(report.not_found, 2);
    assert!(ocr.calls().is_empty());

    let sink = sink.into_inner().expect("sink");
    let answers = &sink.pages[&5];
    assert!(answers.iter().all(|answer| answer.value == SlotValue::NotFound));
    assert!(answers[0].explanation.contains("rasterize"));
}

#[test]
fn unmapped_rows_are_reported_and_left_not_found() {
    let library = PatternLibrary::builtin().expect("library");
    let rasterizer = FakeRasterizer::new();
    let ocr = ScriptedOcr::default().with_text(6, "CHAMFER 45° TYP");
    let pipeline = PagePipeline::new(
        &rasterizer,
        &Untouched,
        &ocr,
        &library,
        plan(),
        SpatialBand::default(),
        Path::new("drawing.pdf"),
    );
    let sink = Mutex::new(MemorySink::default());

    let report = pipeline
        .run_job(
            &job(3, &["chamfer_angle", "paint_colour"], 3),
            &sink,
            &CancelFlag::default(),
        )
        .expect("run");

    assert_eq!(report.warnings.len(), 2);
    assert_eq!(report.found, 1);
    assert_eq!(report.not_found, 2);
}

#[test]
fn cancelled_run_writes_nothing() {
    let library = PatternLibrary::builtin().expect("library");
    let rasterizer = FakeRasterizer::new();
    let ocr = ScriptedOcr::default().with_text(6, "CHAMFER 45° TYP");
    let pipeline = PagePipeline::new(
        &rasterizer,
        &Untouched,
        &ocr,
        &library,
        plan(),
        SpatialBand::default(),
        Path::new("drawing.pdf"),
    );
    let sink = Mutex::new(MemorySink::default());
    let cancel = CancelFlag::default();
    cancel.cancel();

    let reports = pipeline
        .run_all(&[job(3, &["chamfer_angle"], 1)], &sink, &cancel, 1)
        .expect("run");

    assert!(!reports[0].written);
    assert!(ocr.calls().is_empty());
    assert!(sink.into_inner().expect("sink").pages.is_empty());
}

#[test]
fn sink_failure_aborts_the_run() {
    let library = PatternLibrary::builtin().expect("library");
    let rasterizer = FakeRasterizer::new();
    let ocr = ScriptedOcr::default().with_text(6, "CHAMFER 45° TYP");
    let pipeline = PagePipeline::new(
        &rasterizer,
        &Untouched,
        &ocr,
        &library,
        plan(),
        SpatialBand::default(),
        Path::new("drawing.pdf"),
    );
    let sink = Mutex::new(MemorySink {
        fail: true,
        ..MemorySink::default()
    });
    let cancel = CancelFlag::default();

    let result = pipeline.run_all(
        &[job(2, &["chamfer_angle"], 1), job(3, &["chamfer_angle"], 1)],
        &sink,
        &cancel,
        1,
    );

    let error = result.expect_err("sink failure should abort");
    assert!(format!("{error:#}").contains("disk full"));
    assert!(cancel.is_cancelled());
}

fn questionnaire(pages: &[(u32, usize)]) -> Questionnaire {
    Questionnaire {
        sheet: "Sheet1".to_string(),
        pages: pages
            .iter()
            .map(|(page, count)| {
                (
                    *page,
                    (0..*count)
                        .map(|index| QuestionRow {
                            row: index as u32 + 1,
                            question: format!("q{index}"),
                        })
                        .collect(),
                )
            })
            .collect(),
    }
}

#[test]
fn planning_rejects_pages_beyond_the_document() {
    let mut warnings = Vec::new();
    let result = plan_jobs(
        &questionnaire(&[(2, 3), (7, 1)]),
        &RunConfig::default(),
        &[],
        Path::new("drawing.pdf"),
        5,
        &mut warnings,
    );

    let error = result.expect_err("page 7 is out of range");
    match error.downcast_ref::<BoundaryError>() {
        Some(BoundaryError::PageOutOfRange {
            page, page_count, ..
        }) => {
            assert_eq!(*page, 7);
            assert_eq!(*page_count, 5);
        }
        other => panic!("expected page out of range, got {other:?}"),
    }
}

#[test]
fn planning_honours_page_selection() {
    let mut warnings = Vec::new();
    let jobs = plan_jobs(
        &questionnaire(&[(2, 3), (3, 4), (5, 0)]),
        &RunConfig::default(),
        &[3, 5, 9],
        Path::new("drawing.pdf"),
        5,
        &mut warnings,
    )
    .expect("plan");

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].page, 3);
    assert_eq!(jobs[0].slot_names.len(), 4);
    assert_eq!(warnings, vec!["page 9 has no questionnaire block".to_string()]);
}
