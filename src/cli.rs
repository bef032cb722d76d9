//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::actions::ActionTable;
use crate::data::InputFormat;
use crate::model::Score;

/// RFV customer segmentation from a purchase log
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the purchase log (CSV or spreadsheet)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Input format; inferred from the file extension when omitted
    #[arg(short, long, value_enum)]
    pub format: Option<FormatArg>,

    /// Write the segmentation as CSV to this path
    #[arg(long)]
    pub csv_out: Option<PathBuf>,

    /// Write the segmentation as a spreadsheet to this path
    #[arg(long)]
    pub xlsx_out: Option<PathBuf>,

    /// Render a PNG bar chart of customers per score
    #[arg(long)]
    pub chart: Option<PathBuf>,

    /// Add or replace a marketing action, as SCORE=TEXT
    /// Example: --action "BAA=Oferecer frete grátis"
    #[arg(short, long = "action", value_parser = parse_action_override)]
    pub actions: Vec<(Score, String)>,

    /// Number of customers shown in the console preview
    #[arg(long, default_value = "5")]
    pub head: usize,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// `--format` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Csv,
    Spreadsheet,
}

impl From<FormatArg> for InputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => InputFormat::Csv,
            FormatArg::Spreadsheet => InputFormat::Spreadsheet,
        }
    }
}

impl Args {
    /// Explicit input format, if one was given
    pub fn input_format(&self) -> Option<InputFormat> {
        self.format.map(InputFormat::from)
    }

    /// Built-in marketing table with the command-line overrides applied
    pub fn action_table(&self) -> ActionTable {
        let mut table = ActionTable::default();
        for (score, action) in &self.actions {
            table.insert(*score, action.clone());
        }
        table
    }
}

/// Parse one `SCORE=TEXT` override
pub fn parse_action_override(raw: &str) -> Result<(Score, String), String> {
    let (score, action) = raw
        .split_once('=')
        .ok_or_else(|| format!("Action must be in format 'SCORE=TEXT', got '{}'", raw))?;

    let score: Score = score.parse().map_err(|e| format!("{}", e))?;
    let action = action.trim();
    if action.is_empty() {
        return Err(format!("Action text for {} must not be empty", score));
    }

    Ok((score, action.to_string()))
}
