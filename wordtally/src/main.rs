use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wordtally::core::{DateWordMap, WriterOutcome};
use wordtally::storage::json::JsonWorkbook;
use wordtally::storage::text::{TextDocumentStore, parse_paragraphs};
use wordtally::{ImportConfig, ImportOptions, aggregate, normalize, run_import};

#[derive(Debug, Parser)]
#[command(
    name = "wordtally",
    about = "Import per-day word counts from writer documents into a tracking sheet",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fill empty date cells of every configured writer's row.
    Import(ImportArgs),

    /// Print the canonical MM/DD/YYYY key for each input ("-" when not a date).
    ParseDate(ParseDateArgs),

    /// Print per-date word totals for one text document.
    Tally(TallyArgs),
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// JSON configuration (sheetName, startCell, writers).
    #[arg(long)]
    config: PathBuf,
    /// JSON workbook holding the tracking sheet.
    #[arg(long)]
    workbook: PathBuf,
    /// Directory document refs are resolved against. Defaults to the config's directory.
    #[arg(long)]
    documents: Option<PathBuf>,
    /// Plan and report without writing to the workbook.
    #[arg(long)]
    dry_run: bool,
    /// Emit the run summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ParseDateArgs {
    #[arg(required = true)]
    inputs: Vec<String>,
}

#[derive(Debug, Args)]
struct TallyArgs {
    /// Text document (`# ` lines are section titles).
    input: PathBuf,
    /// Emit JSON instead of `date count` lines.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Import(args) => handle_import(args),
        Commands::ParseDate(args) => handle_parse_date(args),
        Commands::Tally(args) => handle_tally(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_import(args: ImportArgs) -> Result<()> {
    let ImportArgs {
        config,
        workbook,
        documents,
        dry_run,
        json,
    } = args;

    let cfg = ImportConfig::load(&config)?;
    let doc_root = documents.unwrap_or_else(|| parent_dir(&config));
    let mut sheet = JsonWorkbook::open(&workbook, &cfg.sheet_name)
        .with_context(|| format!("opening workbook {:?}", workbook))?;
    let store = TextDocumentStore::new(doc_root);

    let summary = run_import(&cfg, &mut sheet, &store, ImportOptions { dry_run })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    for report in &summary.reports {
        let status = match &report.outcome {
            WriterOutcome::NotFound => "not found in sheet".to_string(),
            WriterOutcome::AlreadyFilled { .. } => "already filled".to_string(),
            WriterOutcome::InvalidStartDate { row, column } => {
                format!("no date header at resume cell (row {row}, column {column})")
            }
            WriterOutcome::Unreadable { reason } => format!("unreadable: {reason}"),
            WriterOutcome::Processed {
                start_date, planned, ..
            } => format!("{planned} cells from {start_date}"),
        };
        println!("{:<20} {}", report.writer, status);
    }
    if dry_run {
        for update in summary.updates.iter() {
            println!(
                "would write {} to {}",
                update.value,
                wordtally::config::CellAddress {
                    row: update.row,
                    column: update.column,
                }
            );
        }
    }
    println!("{}", summary.notice());
    Ok(())
}

fn handle_parse_date(args: ParseDateArgs) -> Result<()> {
    for input in &args.inputs {
        match normalize(input) {
            Some(key) => println!("{key}\t{input}"),
            None => println!("-\t{input}"),
        }
    }
    Ok(())
}

fn handle_tally(args: TallyArgs) -> Result<()> {
    let TallyArgs { input, json } = args;
    let text = fs::read_to_string(&input).with_context(|| format!("reading {:?}", input))?;
    let paragraphs = parse_paragraphs(&text);
    let totals: DateWordMap = aggregate(&paragraphs);

    if json {
        println!("{}", serde_json::to_string_pretty(&totals)?);
    } else if totals.is_empty() {
        eprintln!("No dated sections found in {:?}.", input);
    } else {
        for (date, count) in &totals {
            println!("{date} {count}");
        }
    }
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_dir_defaults_to_current_directory() {
        assert_eq!(parent_dir(Path::new("config.json")), PathBuf::from("."));
        assert_eq!(
            parent_dir(Path::new("team/config.json")),
            PathBuf::from("team")
        );
    }

    #[test]
    fn cli_parses_import_flags() {
        let cli = Cli::try_parse_from([
            "wordtally",
            "--verbose",
            "import",
            "--config",
            "c.json",
            "--workbook",
            "b.json",
            "--dry-run",
        ])
        .expect("parse");
        assert!(cli.verbose);
        match cli.command {
            Commands::Import(args) => {
                assert!(args.dry_run);
                assert!(args.documents.is_none());
            }
            other => panic!("expected import, got {:?}", other),
        }
    }
}
