//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};

use crate::config::{ConfigOverrides, LoadOptions, Variant};

/// Customer lifetime value prediction with BG/NBD and Gamma-Gamma models
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file
    #[arg(short, long, default_value = "flo_data_20k.csv")]
    pub input: String,

    /// Write the scored customers to this CSV file
    #[arg(short, long)]
    pub output: Option<String>,

    /// Configuration file (defaults to cltvforge.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Frame option preset
    #[arg(long, value_enum)]
    pub variant: Option<VariantArg>,

    /// Fixed analysis date, YYYY-MM-DD
    #[arg(long, value_parser = parse_date)]
    pub analysis_date: Option<NaiveDate>,

    /// Number of CLTV segments
    #[arg(short = 'k', long)]
    pub segments: Option<usize>,

    /// CLTV horizon in months
    #[arg(long)]
    pub months: Option<u32>,

    /// Monthly discount rate for the CLTV
    #[arg(long)]
    pub discount_rate: Option<f64>,

    /// Rows in each top-N report
    #[arg(long, default_value = "10")]
    pub top: usize,

    /// Output path for the CLTV plot; a segment chart is written next to it
    #[arg(long)]
    pub plot: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum VariantArg {
    Exploratory,
    Generalized,
}

impl From<VariantArg> for Variant {
    fn from(value: VariantArg) -> Self {
        match value {
            VariantArg::Exploratory => Variant::Exploratory,
            VariantArg::Generalized => Variant::Generalized,
        }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{value}', expected YYYY-MM-DD"))
}

impl Args {
    /// Configuration load options carrying the CLI overrides
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                variant: self.variant.map(Variant::from),
                analysis_date: self.analysis_date,
                segments: self.segments,
                months: self.months,
                discount_rate: self.discount_rate,
                log_level: self.verbose.then(|| "debug".to_string()),
            },
        }
    }
}
