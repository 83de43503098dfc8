mod cli;
mod output;

use std::{
  io::{self, IsTerminal, Write},
  process::ExitCode,
};

use clap::Parser;
use jl_core::{CoreEngine, CoreError, CoreOptions, StorageOptions};
use thiserror::Error;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::{cli::Cli, output::Printer};

#[derive(Debug, Error)]
enum CliError {
  #[error(transparent)]
  Core(#[from] CoreError),
  #[error("output error: {0}")]
  Io(#[from] io::Error),
  #[error("invalid expression: {0}")]
  Invalid(String),
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();
  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      eprintln!("Error: {e}");
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<(), CliError> {
  if let Some(expr) = &cli.validate {
    jl_core::expr::validate(expr).map_err(|e| CliError::Invalid(e.to_string()))?;
    println!("ok");
    return Ok(());
  }

  let engine = CoreEngine::new(CoreOptions {
    storage: StorageOptions {
      sqlite_path: cli.prefs.clone(),
    },
    ..CoreOptions::default()
  })?;

  let restored = engine.restore_session(&cli.paths)?;
  for w in &restored.rule_warnings {
    warn!(warning = %w, "saved rule");
  }
  for p in &restored.missing {
    eprintln!("not found: {p}");
  }
  debug!(opened = restored.opened.len(), from_args = restored.from_args, "session restored");

  if !cli.rules.is_empty() {
    engine.set_rules(cli.rules.clone())?;
    for w in engine.rule_warnings() {
      eprintln!("warning: {w}");
    }
  }

  let stdout = io::stdout();
  let printer = Printer::new(cli.format, stdout.is_terminal());
  let mut out = stdout.lock();

  printer.files(&mut out, &engine.files())?;
  if cli.columns {
    printer.columns(&mut out, &engine.columns())?;
  } else {
    if let Some(term) = &cli.search {
      engine.set_search_term(term);
      match engine.find_next(None, term) {
        Some(loc) => eprintln!("first match: #{}", loc.ordinal + 1),
        None => eprintln!("no match for {term:?}"),
      }
    }
    let page = engine.visible_page(None, cli.limit.max(1))?;
    printer.page(&mut out, &page)?;
    eprintln!("{} of {} entries visible", engine.visible_count(), engine.entries().len());
  }
  out.flush()?;

  if !cli.no_save {
    engine.save_session()?;
  }
  Ok(())
}
