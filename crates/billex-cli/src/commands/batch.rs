//! Batch command - run many bills through the orchestrator.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use billex_core::models::job::ResultStatus;
use billex_core::store::TaskStore;
use billex_core::{
    extractor_for, open_store, BillRecord, Document, DocumentKind, ExtractionResult,
    InMemoryTaskStore, JobStatus, Orchestrator,
};

use super::extract::Method;
use super::load_config;
use super::output::{format_bill, OutputFormat};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory for per-file results
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of documents extracted at once (default: from config)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Extraction method (default: from config)
    #[arg(short, long, value_enum)]
    method: Option<Method>,

    /// Record the job in the configured store instead of memory
    #[arg(long)]
    persist: bool,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut config = load_config(config_path)?;
    if let Some(jobs) = args.jobs {
        config.batch.max_concurrency = jobs;
    }

    let files = find_documents(&args.input)?;
    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    let mut documents = Vec::with_capacity(files.len());
    for path in &files {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        documents.push(Document::new(filename, fs::read(path)?));
    }

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let store: Arc<dyn TaskStore> = if args.persist {
        open_store(&config.store)?
    } else {
        Arc::new(InMemoryTaskStore::new())
    };
    let method = args.method.map(Into::into).unwrap_or(config.extraction.method);
    let extractor = extractor_for(&config, method)?;
    let orchestrator = Orchestrator::new(store, extractor, config.batch.clone());

    let job_id = orchestrator.submit(documents).await?;
    info!("Submitted job {}", job_id);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let job = loop {
        let job = orchestrator.status(&job_id).await?;
        pb.set_position(job.finished() as u64);
        if job.status.is_terminal() {
            break job;
        }
        tokio::time::sleep(orchestrator.poll_interval()).await;
    };
    pb.finish_with_message("Complete");

    let results = orchestrator.results(&job_id).await?;

    if let Some(ref output_dir) = args.output_dir {
        for result in &results {
            write_result(output_dir, result, args.format)?;
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        job.finished(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(job.processed_count).green(),
        style(job.failed_count).red()
    );

    let failed: Vec<_> = results
        .iter()
        .filter(|r| r.status == ResultStatus::Failed)
        .collect();
    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.filename,
                result.error_message.as_deref().unwrap_or("unknown error")
            );
        }
    }

    if job.status == JobStatus::Failed {
        anyhow::bail!(
            "Job {} failed{}",
            job.id,
            job.error_message
                .map(|m| format!(": {}", m))
                .unwrap_or_default()
        );
    }

    Ok(())
}

/// Expand `pattern` to the documents it matches, in sorted order.
fn find_documents(pattern: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = glob(pattern)?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .and_then(DocumentKind::from_filename)
                .is_some()
        })
        .collect();
    files.sort();
    Ok(files)
}

fn write_result(output_dir: &Path, result: &ExtractionResult, format: OutputFormat) -> anyhow::Result<()> {
    let Some(data) = &result.extracted_data else {
        return Ok(());
    };

    let record: BillRecord = match serde_json::from_value(data.clone()) {
        Ok(record) => record,
        Err(e) => {
            warn!("Skipping output for {}: {}", result.filename, e);
            return Ok(());
        }
    };

    let stem = Path::new(&result.filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("bill");
    let output_path = output_dir.join(format!("{}.{}", stem, format.extension()));

    fs::write(&output_path, format_bill(&record, format)?)?;
    debug!("Wrote output to {}", output_path.display());
    Ok(())
}

fn write_summary(path: &Path, results: &[ExtractionResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "account_number",
        "bill_date",
        "due_date",
        "amount_due",
        "meters",
        "error",
    ])?;

    for result in results {
        let record: Option<BillRecord> = result
            .extracted_data
            .as_ref()
            .and_then(|data| serde_json::from_value(data.clone()).ok());

        match record {
            Some(record) => wtr.write_record([
                result.filename.as_str(),
                result.status.as_str(),
                record.account_number.as_deref().unwrap_or(""),
                &record.bill_date.map(|d| d.to_string()).unwrap_or_default(),
                &record.due_date.map(|d| d.to_string()).unwrap_or_default(),
                &record.amount_due.map(|a| a.to_string()).unwrap_or_default(),
                &record.meters.len().to_string(),
                "",
            ])?,
            None => wtr.write_record([
                result.filename.as_str(),
                result.status.as_str(),
                "",
                "",
                "",
                "",
                "",
                result.error_message.as_deref().unwrap_or(""),
            ])?,
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_find_documents_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.TXT", "notes.docx"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let pattern = format!("{}/*", dir.path().display());
        let names: Vec<String> = find_documents(&pattern)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.TXT".to_string(), "b.pdf".to_string()]);
    }

    #[test]
    fn test_summary_and_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let record = BillRecord {
            account_number: Some("55-1".to_string()),
            amount_due: Some("10.50".parse().unwrap()),
            ..Default::default()
        };
        let results = vec![
            ExtractionResult::completed("job", "a.pdf", serde_json::to_value(&record).unwrap()),
            ExtractionResult::failed("job", "b.pdf", "No text could be extracted from the document"),
        ];

        for result in &results {
            write_result(dir.path(), result, OutputFormat::Json).unwrap();
        }
        let written: BillRecord =
            serde_json::from_str(&fs::read_to_string(dir.path().join("a.json")).unwrap()).unwrap();
        assert_eq!(written, record);
        assert!(!dir.path().join("b.json").exists());

        let summary = dir.path().join("summary.csv");
        write_summary(&summary, &results).unwrap();
        let content = fs::read_to_string(summary).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[1], "a.pdf,completed,55-1,,,10.50,0,");
        assert_eq!(
            lines[2],
            "b.pdf,failed,,,,,,No text could be extracted from the document"
        );
    }
}
