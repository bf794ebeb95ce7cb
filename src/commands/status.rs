use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::adapters::sink::AnswerSheetDocument;
use crate::cli::StatusArgs;
use crate::model::RunManifest;
use crate::util::read_json;

pub fn run(args: StatusArgs) -> Result<()> {
    let output_dir = args.output_dir;
    let answers_path = output_dir.join("answers.json");

    info!(output_dir = %output_dir.display(), "status requested");

    match latest_manifest(&output_dir)? {
        Some(path) => {
            let manifest: RunManifest = read_json(&path)?;
            info!(
                run_id = %manifest.run_id,
                status = %manifest.status,
                started_at = %manifest.started_at,
                completed_at = %manifest.completed_at,
                command = %manifest.command,
                pages_requested = manifest.counts.pages_requested,
                pages_answered = manifest.counts.pages_answered,
                questions = manifest.counts.questions,
                found = manifest.counts.answers_found,
                not_found = manifest.counts.answers_not_found,
                failed_ocr_passes = manifest.counts.failed_ocr_passes,
                warnings = manifest.warnings.len(),
                answers_workbook = %manifest.paths.answers_workbook,
                "loaded run manifest"
            );
            for warning in &manifest.warnings {
                warn!(warning = %warning, "run warning");
            }
        }
        None => warn!(path = %output_dir.display(), "no run manifest found"),
    }

    if answers_path.exists() {
        let sheet: AnswerSheetDocument = read_json(&answers_path)?;
        info!(
            workbook = %sheet.workbook,
            sheet = %sheet.sheet,
            updated_at = %sheet.updated_at,
            pages = sheet.pages.len(),
            "loaded answer sheet"
        );
        for (page, answers) in &sheet.pages {
            info!(
                page,
                found = answers.found,
                not_found = answers.not_found,
                written_at = %answers.written_at,
                "page answers"
            );
        }
    } else {
        warn!(path = %answers_path.display(), "answer sheet missing");
    }

    Ok(())
}

/// Run manifests are named `run_<UTC stamp>.json`, so the lexically greatest
/// name is the most recent run.
pub fn latest_manifest(output_dir: &Path) -> Result<Option<PathBuf>> {
    if !output_dir.is_dir() {
        return Ok(None);
    }

    let mut manifests = Vec::new();
    for entry in fs::read_dir(output_dir)
        .with_context(|| format!("failed to list {}", output_dir.display()))?
    {
        let path = entry
            .with_context(|| format!("failed to list {}", output_dir.display()))?
            .path();
        let is_manifest = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("run_") && name.ends_with(".json"));
        if is_manifest {
            manifests.push(path);
        }
    }

    manifests.sort();
    Ok(manifests.pop())
}
