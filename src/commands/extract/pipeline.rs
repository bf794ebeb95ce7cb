use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::adapters::ocr::{OcrEngine, SegmentationMode};
use crate::adapters::preprocess::{Enhancement, ImageEnhancer, PreprocessConfig};
use crate::adapters::raster::{PdfRasterizer, RasterImage};
use crate::adapters::sink::AnswerSink;
use crate::config::RunConfig;
use crate::engine::assemble::{QuestionRow, SlotAnswer, assemble, map_slots};
use crate::engine::context::SpatialBand;
use crate::engine::extract_page;
use crate::engine::library::{ContextMode, MeasurementCategory, PatternLibrary};
use crate::engine::types::{Page, TextToken, Transcript};

/// Shared stop signal. Once set, pages that have not written their answers
/// yet finish without touching the sink.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrPlan {
    pub dpi: u32,
    pub passes: Vec<SegmentationMode>,
    pub token_pass: SegmentationMode,
    pub preprocess: PreprocessConfig,
}

impl OcrPlan {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            dpi: config.dpi,
            passes: config.all_passes(),
            token_pass: config.token_psm,
            preprocess: config.preprocess,
        }
    }

    pub fn labels(&self) -> Vec<String> {
        let mut labels = self
            .passes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<String>>();
        labels.push(format!("{}-tsv", self.token_pass));
        labels
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageJob {
    pub page: u32,
    pub questions: Vec<QuestionRow>,
    pub slot_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageReport {
    pub page: u32,
    pub questions: usize,
    pub found: usize,
    pub not_found: usize,
    pub failed_passes: Vec<String>,
    pub warnings: Vec<String>,
    pub written: bool,
}

#[derive(Debug, Clone, Copy)]
enum Pass {
    Text {
        mode: SegmentationMode,
        primary: bool,
        enhancement: Enhancement,
    },
    Tokens {
        mode: SegmentationMode,
        enhancement: Enhancement,
    },
}

impl Pass {
    fn label(self) -> String {
        match self {
            Self::Text { mode, .. } => mode.to_string(),
            Self::Tokens { mode, .. } => format!("{mode}-tsv"),
        }
    }

    fn enhancement(self) -> Enhancement {
        match self {
            Self::Text { enhancement, .. } | Self::Tokens { enhancement, .. } => enhancement,
        }
    }
}

enum PassOutput {
    Text(Transcript),
    Tokens(Vec<TextToken>),
}

pub struct PagePipeline<'a, R, E, O> {
    rasterizer: &'a R,
    enhancer: &'a E,
    ocr: &'a O,
    library: &'a PatternLibrary,
    plan: OcrPlan,
    band: SpatialBand,
    pdf: PathBuf,
}

impl<'a, R: PdfRasterizer, E: ImageEnhancer, O: OcrEngine> PagePipeline<'a, R, E, O> {
    pub fn new(
        rasterizer: &'a R,
        enhancer: &'a E,
        ocr: &'a O,
        library: &'a PatternLibrary,
        plan: OcrPlan,
        band: SpatialBand,
        pdf: &Path,
    ) -> Self {
        Self {
            rasterizer,
            enhancer,
            ocr,
            library,
            plan,
            band,
            pdf: pdf.to_path_buf(),
        }
    }

    /// Processes pages on a pool of `threads` workers. The first error
    /// cancels the remaining pages and is returned after the pool drains.
    pub fn run_all<S: AnswerSink>(
        &self,
        jobs: &[PageJob],
        sink: &Mutex<S>,
        cancel: &CancelFlag,
        threads: usize,
    ) -> Result<Vec<PageReport>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()
            .context("failed to build page worker pool")?;

        pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    let report = self.run_job(job, sink, cancel);
                    if report.is_err() {
                        cancel.cancel();
                    }
                    report
                })
                .collect::<Vec<Result<PageReport>>>()
        })
        .into_iter()
        .collect()
    }

    pub fn run_job<S: AnswerSink>(
        &self,
        job: &PageJob,
        sink: &Mutex<S>,
        cancel: &CancelFlag,
    ) -> Result<PageReport> {
        let mut report = PageReport {
            page: job.page,
            questions: job.questions.len(),
            ..PageReport::default()
        };
        if cancel.is_cancelled() {
            return Ok(report);
        }

        let slots = map_slots(job.page, &job.slot_names, &job.questions);
        let mut categories = Vec::new();
        for slot in &slots {
            match slot {
                Ok(category) if !categories.contains(category) => categories.push(*category),
                Ok(_) => {}
                Err(error) => {
                    warn!(page = job.page, error = %error, "question slot not answerable");
                    report.warnings.push(error.to_string());
                }
            }
        }

        let page = self.read_page(job.page, &categories);
        report.failed_passes = page.failed_passes.clone();

        let extraction = extract_page(self.library, &page, &categories, self.band);
        let answers = assemble(&extraction, &slots, &job.questions);
        report.found = answers.iter().filter(|answer| answer.value.is_found()).count();
        report.not_found = answers.len() - report.found;

        if cancel.is_cancelled() {
            warn!(page = job.page, "run cancelled; page answers discarded");
            return Ok(report);
        }

        self.write_answers(job.page, &answers, sink)?;
        report.written = true;

        info!(
            page = job.page,
            questions = report.questions,
            found = report.found,
            not_found = report.not_found,
            failed_passes = report.failed_passes.len(),
            "page answered"
        );
        Ok(report)
    }

    /// Rasterizes once, prepares each enhanced copy the passes need and runs
    /// only the OCR passes the requested categories read. Pass failures are
    /// recorded on the page instead of aborting it.
    pub fn read_page(&self, number: u32, categories: &[MeasurementCategory]) -> Page {
        let mut page = Page {
            number,
            ..Page::default()
        };

        let passes = self.passes_for(categories);
        if passes.is_empty() {
            return page;
        }

        let image = match self.rasterizer.rasterize(&self.pdf, number, self.plan.dpi) {
            Ok(image) => image,
            Err(err) => {
                warn!(page = number, error = %format!("{err:#}"), "rasterization failed");
                page.failed_passes.push(format!("rasterize: {err:#}"));
                return page;
            }
        };

        let enhanced = self.enhance(number, &image, &passes);
        let outputs = passes
            .par_iter()
            .map(|pass| {
                let source = enhanced
                    .get(&pass.enhancement())
                    .map(RasterImage::path)
                    .unwrap_or_else(|| image.path());
                (*pass, self.run_pass(source, *pass))
            })
            .collect::<Vec<(Pass, Result<PassOutput>)>>();

        for (pass, output) in outputs {
            match output {
                Ok(PassOutput::Text(transcript)) => page.transcripts.push(transcript),
                Ok(PassOutput::Tokens(tokens)) => page.tokens = Some(tokens),
                Err(err) => {
                    warn!(page = number, pass = %pass.label(), error = %err, "OCR pass failed");
                    page.failed_passes.push(format!("{}: {err}", pass.label()));
                }
            }
        }

        page
    }

    /// One enhanced copy per distinct enhancement. A copy that cannot be made
    /// is skipped and its passes read the raw render.
    fn enhance(
        &self,
        number: u32,
        image: &RasterImage,
        passes: &[Pass],
    ) -> BTreeMap<Enhancement, RasterImage> {
        let mut wanted = passes
            .iter()
            .map(|pass| pass.enhancement())
            .filter(|enhancement| *enhancement != Enhancement::Raw)
            .collect::<Vec<Enhancement>>();
        wanted.sort();
        wanted.dedup();

        wanted
            .par_iter()
            .filter_map(|enhancement| match self.enhancer.enhance(image, *enhancement) {
                Ok(copy) => Some((*enhancement, copy)),
                Err(err) => {
                    warn!(
                        page = number,
                        enhancement = %enhancement,
                        error = %format!("{err:#}"),
                        "image enhancement failed; OCR reads the raw render"
                    );
                    None
                }
            })
            .collect()
    }

    fn passes_for(&self, categories: &[MeasurementCategory]) -> Vec<Pass> {
        let specs = categories
            .iter()
            .filter_map(|category| self.library.get(*category))
            .collect::<Vec<_>>();

        let wants_text = specs
            .iter()
            .any(|spec| spec.context_mode == ContextMode::Text);
        let wants_all_passes = specs
            .iter()
            .any(|spec| spec.context_mode == ContextMode::Text && spec.multi_pass);
        let wants_tokens = specs
            .iter()
            .any(|spec| spec.context_mode == ContextMode::Spatial);

        let mut passes = Vec::new();
        if wants_text {
            for (index, mode) in self.plan.passes.iter().enumerate() {
                if index == 0 || wants_all_passes {
                    let primary = index == 0;
                    passes.push(Pass::Text {
                        mode: *mode,
                        primary,
                        enhancement: if primary {
                            self.plan.preprocess.primary
                        } else {
                            self.plan.preprocess.extra
                        },
                    });
                }
            }
        }
        if wants_tokens {
            passes.push(Pass::Tokens {
                mode: self.plan.token_pass,
                enhancement: self.plan.preprocess.tokens,
            });
        }
        passes
    }

    fn run_pass(&self, image: &Path, pass: Pass) -> Result<PassOutput> {
        match pass {
            Pass::Text { mode, primary, .. } => {
                let text = self.ocr.transcribe(image, mode)?;
                Ok(PassOutput::Text(Transcript::new(mode.to_string(), primary, &text)))
            }
            Pass::Tokens { mode, .. } => {
                Ok(PassOutput::Tokens(self.ocr.transcribe_tokens(image, mode)?))
            }
        }
    }

    fn write_answers<S: AnswerSink>(
        &self,
        page: u32,
        answers: &[SlotAnswer],
        sink: &Mutex<S>,
    ) -> Result<()> {
        let mut sink = sink
            .lock()
            .map_err(|_| anyhow!("answer sink lock poisoned"))?;
        sink.write_page(page, answers)
            .with_context(|| format!("failed to save answers for page {page}"))
    }
}
