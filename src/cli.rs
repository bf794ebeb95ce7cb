use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "dimcheck",
    version,
    about = "Dimension extraction from OCR'd engineering drawings into checklist answers"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Extract(ExtractArgs),
    Analyze(AnalyzeArgs),
    Library(LibraryArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub pdf: Option<PathBuf>,

    #[arg(long)]
    pub workbook: Option<PathBuf>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long)]
    pub answers_workbook: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub jobs: Option<usize>,

    #[arg(long = "page")]
    pub pages: Vec<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(long = "transcript", required = true)]
    pub transcripts: Vec<PathBuf>,

    #[arg(long)]
    pub tokens: Option<PathBuf>,

    #[arg(long = "category")]
    pub categories: Vec<String>,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value_t = 1)]
    pub page: u32,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct LibraryArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/dimcheck")]
    pub output_dir: PathBuf,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
