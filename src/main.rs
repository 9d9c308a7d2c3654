mod cli;

use crate::cli::Cli;
use crate::cli::Commands;

use anyhow::Context as _;
use anyhow::Result;
use bstr::BString;
use bstr::ByteSlice as _;
use clap::Parser as _;
use reposurgeon::cutter;
use reposurgeon::cutter::RevisionRange;
use reposurgeon::error::DumpFormatError;
use reposurgeon::error::SemanticError;
use reposurgeon::interrupt;
use reposurgeon::log as surgeon_log;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = Cli::parse();
    let level = match args.log_level.value() {
        Ok(level) => level,
        Err(err) => {
            eprintln!("repocutter: {err:#}");
            return ExitCode::from(1);
        }
    };
    surgeon_log::init(level);
    if let Err(err) = interrupt::install() {
        log::warn!("could not install signal handlers: {err:#}");
    }
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            let user_error = err.downcast_ref::<SemanticError>().is_some()
                || err.downcast_ref::<DumpFormatError>().is_some()
                || err.downcast_ref::<interrupt::Interrupted>().is_some()
                || err.is::<std::io::Error>();
            // Anything else means an internal invariant broke.
            ExitCode::from(if user_error { 1 } else { 2 })
        }
    }
}

fn parse_range(args: &Cli) -> Result<RevisionRange> {
    match &args.range {
        Some(range) => RevisionRange::parse(range),
        None => Ok(RevisionRange::all()),
    }
}

fn run(args: &Cli) -> Result<()> {
    let stdin = std::io::stdin();
    let input = stdin.lock();
    let stdout = std::io::stdout();
    let output = stdout.lock();
    match &args.command {
        Commands::Select => cutter::select(input, output, &parse_range(args)?, false),
        Commands::Deselect => cutter::select(input, output, &parse_range(args)?, true),
        Commands::Propset(setting) => {
            let (key, value) = setting
                .setting
                .split_once('=')
                .ok_or_else(|| SemanticError("propset needs key=value".to_owned()))?;
            cutter::propset(
                input,
                output,
                &parse_range(args)?,
                key,
                value.as_bytes().into(),
            )
        }
        Commands::Propdel(prop) => cutter::propdel(input, output, &parse_range(args)?, &prop.key),
        Commands::Proprename(rename) => cutter::proprename(
            input,
            output,
            &parse_range(args)?,
            &rename.old,
            &rename.new,
        ),
        Commands::Log => cutter::log_report(input, output),
        Commands::Setlog(setlog) => {
            // The dump occupies stdin, so the report must be a real file.
            let report = BString::from(std::fs::read(&setlog.logentries).with_context(
                || format!("cannot read {}", setlog.logentries.display()),
            )?);
            cutter::setlog(input, output, report.as_bstr())
        }
        Commands::Strip(patterns) => cutter::strip(input, output, &patterns.patterns),
        Commands::Expunge(patterns) => {
            cutter::expunge(input, output, &patterns.patterns, false)
        }
        Commands::Sift(patterns) => cutter::expunge(input, output, &patterns.patterns, true),
        Commands::Pathrename(rename) => {
            cutter::pathrename(input, output, &rename.pattern, &rename.replacement)
        }
        Commands::Renumber => cutter::renumber(input, output),
        Commands::Reduce => cutter::reduce(input, output),
        Commands::See => cutter::see(input, output),
        Commands::Swap => cutter::swap(input, output),
        Commands::Testify => cutter::testify(input, output),
        Commands::Obscure => cutter::obscure(input, output),
        Commands::Version => {
            println!("repocutter {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
