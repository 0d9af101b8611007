//! SafeLens command-line shell.
//!
//! The binary is a thin layer: `analyze` assembles evidence (generator
//! concern) and hands it to the verifier; `verify` feeds an existing
//! package through the same pipeline. All trust decisions happen in the
//! `verifier` crate.

mod api;
mod cli;
mod render;
mod settings;

use {
    anyhow::{Context, Result},
    clap::Parser,
    consensus::ConsensusVerifier,
    evidence::{ParseMode, ParsedPackage, schema},
    settings::Settings,
    std::{io::Read, path::Path, process::ExitCode},
    verifier::{CancellationToken, VerificationReport},
};

pub async fn start(args: impl Iterator<Item = String>) -> ExitCode {
    let args = cli::Args::parse_from(args);
    observe::initialize(
        &args.log_filter,
        if args.log_json {
            observe::Format::Json
        } else {
            observe::Format::Plain
        },
    );

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(?err, "command failed");
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(args: cli::Args) -> Result<ExitCode> {
    let settings = Settings::load(&args.settings)?;

    match args.command {
        cli::Command::Analyze { url, json, export } => {
            analyze(&settings, &url, json, export.as_deref()).await
        }
        cli::Command::Verify {
            file,
            json_input,
            lenient,
            report_json,
        } => {
            let raw = read_package_input(file.as_deref(), json_input.as_deref())?;
            let mode = if lenient || settings.lenient {
                ParseMode::Lenient
            } else {
                ParseMode::Strict
            };
            let parsed = schema::parse_package(&raw, mode)
                .map_err(|err| anyhow::anyhow!("{err}"))?;
            let report = verify_parsed(&parsed);
            if report_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render::report(&parsed.package, &report));
            }
            Ok(exit_code(&report))
        }
        cli::Command::Sources => {
            print!("{}", render::sources());
            Ok(ExitCode::SUCCESS)
        }
        cli::Command::Settings { action } => match action {
            cli::SettingsAction::Init => {
                Settings::init(&args.settings)?;
                println!("wrote {}", args.settings.display());
                Ok(ExitCode::SUCCESS)
            }
            cli::SettingsAction::Show => {
                print!("{}", settings.show());
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

async fn analyze(
    settings: &Settings,
    url: &str,
    json: bool,
    export: Option<&Path>,
) -> Result<ExitCode> {
    let target = api::parse_target(url)?;
    let client = reqwest::Client::new();
    let package = api::assemble_package(&client, settings, &target).await?;

    if let Some(path) = export {
        std::fs::write(path, serde_json::to_vec_pretty(&package)?)
            .with_context(|| format!("writing evidence package to {}", path.display()))?;
        tracing::info!(path = %path.display(), "evidence package exported");
    }

    let parsed = ParsedPackage {
        package,
        warnings: vec![],
    };
    let report = verify_parsed(&parsed);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render::report(&parsed.package, &report));
    }
    Ok(exit_code(&report))
}

fn verify_parsed(parsed: &ParsedPackage) -> VerificationReport {
    let consensus = ConsensusVerifier::new();
    verifier::verify_package(
        &parsed.package,
        Some(&consensus),
        &parsed.warnings,
        &CancellationToken::new(),
    )
}

fn read_package_input(file: Option<&Path>, json: Option<&str>) -> Result<String> {
    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("reading evidence package from {}", path.display()));
    }
    if let Some(inline) = json {
        return Ok(inline.to_owned());
    }
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("reading evidence package from stdin")?;
    Ok(buffer)
}

/// Non-zero exit iff the hash mismatches or a signature is invalid; trust
/// downgrades alone keep the exit clean.
fn fails_exit(report: &VerificationReport) -> bool {
    let signature_invalid = report
        .signatures
        .as_ref()
        .is_some_and(|summary| summary.any_invalid());
    !report.hash_match || signature_invalid
}

fn exit_code(report: &VerificationReport) -> ExitCode {
    if fails_exit(report) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
