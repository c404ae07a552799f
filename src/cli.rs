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
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    // Load a manifest, validate it, and export the decoded traces
    Load {
        // TraceInfo manifest file
        #[arg(required = true, help = "Manifest file")]
        manifest: PathBuf,

        // Validation rule file
        #[arg(short = 'r', long = "rules", required = true)]
        rules: PathBuf,

        // Output file path, defaults to stdout
        #[arg(short = 'o', long = "output", required = false)]
        out_file: Option<PathBuf>,

        // Directory trace and helper files resolve against, defaults to the manifest's directory
        #[arg(long = "base-dir", required = false)]
        base_dir: Option<PathBuf>,

        // Absolute invalid-row limit, wins over the percentage when set
        #[arg(long = "max-err-count", required = false)]
        max_err_count: Option<usize>,

        // Invalid-row limit as a percentage of the row count
        #[arg(long = "max-err-percent", default_value_t = 5)]
        max_err_percent: u32,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // Validate a manifest without reading the trace files
    Check {
        // TraceInfo manifest file
        #[arg(required = true, help = "Manifest file")]
        manifest: PathBuf,

        // Validation rule file
        #[arg(short = 'r', long = "rules", required = true)]
        rules: PathBuf,

        // Absolute invalid-row limit, wins over the percentage when set
        #[arg(long = "max-err-count", required = false)]
        max_err_count: Option<usize>,

        // Invalid-row limit as a percentage of the row count
        #[arg(long = "max-err-percent", default_value_t = 5)]
        max_err_percent: u32,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // Decode a single trace file and print a summary
    Dump {
        // Input trace file
        #[arg(required = true, help = "Input file")]
        input_file: PathBuf,

        // Read name to extract from a multi-read SFF container
        #[arg(short = 'n', long = "name", required = false)]
        read_name: Option<String>,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },
}
