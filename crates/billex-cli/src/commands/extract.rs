//! Extract command - pull bill data out of a single document.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use billex_core::models::config::ExtractionMethod;
use billex_core::{extractor_for, DocumentKind};

use super::load_config;
use super::output::{format_bill, OutputFormat};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input file (PDF or text)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Extraction method (default: from config)
    #[arg(short, long, value_enum)]
    method: Option<Method>,

    /// Report gaps and inconsistencies in the extracted data
    #[arg(long)]
    validate: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum Method {
    /// Pattern engine
    Pattern,
    /// LLM collaborator
    Llm,
}

impl From<Method> for ExtractionMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Pattern => ExtractionMethod::Pattern,
            Method::Llm => ExtractionMethod::Llm,
        }
    }
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let filename = args
        .input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    if DocumentKind::from_filename(&filename).is_none() {
        anyhow::bail!("Unsupported file format: {}", args.input.display());
    }

    let method = args.method.map(Into::into).unwrap_or(config.extraction.method);
    let extractor = extractor_for(&config, method)?;
    info!("Extracting {} with {:?} method", args.input.display(), method);

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.set_message(format!("Extracting {}", filename));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = extractor.extract(&args.input).await;
    pb.finish_and_clear();

    let mut record = result?;
    record.source_file = Some(filename);

    if args.validate {
        let issues = record.validate();
        if !issues.is_empty() {
            eprintln!("{}", style("Validation issues:").yellow());
            for issue in &issues {
                eprintln!("  - {}", issue);
            }
        }
    }

    let output = format_bill(&record, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    info!("Extraction finished in {:?}", start.elapsed());
    Ok(())
}
