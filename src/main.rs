// trl: Legacy DNA sequencer trace ingestion, validation, and normalization.
//
// Copyright 2025 Tommi Mäklin [tommi@maklin.fi].
//
// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.
//
// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//
use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::PathBuf;

use clap::CommandFactory;
use clap::Parser;
use log::error;
use log::info;

use trl::validate::ValidatorOptions;

mod cli;

/// Initializes the logger with verbosity given in `log_max_level`.
fn init_log(log_max_level: usize) {
    stderrlog::new()
    .module(module_path!())
    .quiet(false)
    .verbosity(log_max_level)
    .timestamp(stderrlog::Timestamp::Off)
    .init()
    .unwrap();
}

/// Logs the error and terminates with a nonzero status.
fn abort(err: trl::error::TrlError) -> ! {
    error!("{err}");
    std::process::exit(1);
}

fn main() {
    let cli = cli::Cli::parse();

    // Subcommands:
    match &cli.command {
        // Load, validate, decode, export
        Some(cli::Commands::Load {
            manifest,
            rules,
            out_file,
            base_dir,
            max_err_count,
            max_err_percent,
            verbose,
        }) => {
            init_log(if *verbose { 2 } else { 1 });

            let base_dir = base_dir.clone().unwrap_or_else(|| {
                manifest.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
            });
            let options = ValidatorOptions {
                max_err_count: *max_err_count,
                max_err_percent: *max_err_percent,
                base_dir,
                check_files: true,
            };

            let summary = if let Some(path) = out_file {
                let conn_out = match File::create(path) {
                    Ok(f) => BufWriter::new(f),
                    Err(err) => abort(err.into()),
                };
                trl::run_pipeline(manifest, rules, conn_out, options)
            } else {
                trl::run_pipeline(manifest, rules, BufWriter::new(std::io::stdout()), options)
            };
            match summary {
                Ok(summary) => {
                    info!(
                        "done: {} rows, {} exported, {} failed",
                        summary.total, summary.exported, summary.failed
                    );
                },
                Err(err) => abort(err),
            }
        },

        // Validate only
        Some(cli::Commands::Check {
            manifest,
            rules,
            max_err_count,
            max_err_percent,
            verbose,
        }) => {
            init_log(if *verbose { 2 } else { 1 });

            let catalog = trl::fields::FieldCatalog::standard();
            let rules = match trl::rules::load_rules(rules, &catalog) {
                Ok(rules) => rules,
                Err(err) => abort(err),
            };
            let bytes = match std::fs::read(manifest) {
                Ok(bytes) => bytes,
                Err(err) => abort(err.into()),
            };

            let options = ValidatorOptions {
                max_err_count: *max_err_count,
                max_err_percent: *max_err_percent,
                base_dir: PathBuf::from("."),
                check_files: false,
            };
            let mut validator = trl::validate::Validator::new(&catalog, &rules, options);
            let got = match validator.load(&bytes) {
                Ok(mut rows) => {
                    validator.validate(&mut rows).map(|failures| (rows.len(), failures))
                },
                Err(err) => Err(err),
            };
            match got {
                Ok((total, failures)) => {
                    info!("manifest ok: {} of {} rows valid", total - failures, total);
                },
                Err(err) => abort(err),
            }
        },

        // Single-file summary
        Some(cli::Commands::Dump {
            input_file,
            read_name,
            verbose,
        }) => {
            init_log(if *verbose { 2 } else { 1 });

            let overrides = trl::record::TraceOverrides::default();
            let (format, record) =
                match trl::decode_file(input_file, read_name.as_deref(), &overrides) {
                    Ok(decoded) => decoded,
                    Err(err) => abort(err),
                };

            let mut conn_out = BufWriter::new(std::io::stdout());
            let mut summary = format!("format: {format}\n");
            summary += &format!("bases: {}\n", record.bases.len());
            summary += &format!("samples per channel: {}\n", record.samples_a.len());
            summary += &format!("max signal: {}\n", record.max_trace_value());
            summary += &format!(
                "quality clip: {}..{}\n",
                record.clip_quality_left, record.clip_quality_right
            );
            summary += &format!(
                "adapter clip: {}..{}\n",
                record.clip_adapter_left, record.clip_adapter_right
            );
            summary += &format!("confidence scores: {}\n", if record.valid_scores { "present" } else { "absent" });
            if !record.comments.is_empty() {
                summary += &record.comments;
                if !record.comments.ends_with('\n') {
                    summary += "\n";
                }
            }
            let _ = conn_out.write_all(summary.as_bytes());
        },
        None => {
            let _ = cli::Cli::command().print_help();
        },
    }
}
