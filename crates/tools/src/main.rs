//! ldraw-tools - load an LDraw file, re-emit it, optionally report problems

use clap::{Parser as _, ValueEnum};
use ldraw_dom::{CodeStandards, Document, Parser, ParserConfig, Severity};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Standards {
    Full,
    PartsLibrary,
    Omr,
}

impl From<Standards> for CodeStandards {
    fn from(value: Standards) -> Self {
        match value {
            Standards::Full => CodeStandards::Full,
            Standards::PartsLibrary => CodeStandards::PartsLibrary,
            Standards::Omr => CodeStandards::OfficialModelRepository,
        }
    }
}

#[derive(Debug, clap::Parser)]
#[command(name = "ldraw-tools", version, about = "Parse, re-emit and check LDraw files")]
struct Cli {
    /// LDraw file (.ldr, .dat or .mpd)
    file: PathBuf,

    /// Output standards for the emitted code
    #[arg(long, value_enum, default_value = "full")]
    standards: Standards,

    /// Print problems and exit non-zero when there are any
    #[arg(long)]
    check: bool,

    /// Refuse lines that cannot be read instead of keeping them as comments
    #[arg(long)]
    strict: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let text = std::fs::read_to_string(&cli.file)?;
    let mut doc = Document::new();
    let parser = Parser::with_config(ParserConfig { strict: cli.strict });
    let outcome = parser.parse_document(&mut doc, &text)?;
    tracing::info!(
        file = %cli.file.display(),
        pages = outcome.pages.len(),
        modified = outcome.document_modified,
        "loaded"
    );

    let standards = CodeStandards::from(cli.standards);
    print!("{}", doc.to_code(doc.root(), standards)?);

    if !cli.check {
        return Ok(ExitCode::SUCCESS);
    }
    let problems = doc.problems(doc.root(), standards)?;
    for problem in &problems {
        eprintln!("{}", problem);
    }
    let errors = problems
        .iter()
        .filter(|p| p.severity == Severity::Error)
        .count();
    tracing::info!(problems = problems.len(), errors, "check finished");

    Ok(if problems.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
