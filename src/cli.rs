use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

use crate::features::ExtractorOptions;

#[derive(Parser, Debug)]
#[command(name = "phishhunter")]
#[command(about = "Classify URLs as phishing or legitimate and build labelled training data")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Create default configuration file at ./config/phishhunter.toml
    #[arg(long, global = true)]
    pub init: bool,

    /// Configuration file (defaults to ./config/phishhunter.toml, then built-in defaults)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose logging (use -v for INFO, -vv for DEBUG)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export execution logs to a file (specify file path)
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Skip the startup banner
    #[arg(long, global = true)]
    pub no_banner: bool,

    /// Do not query WHOIS during feature extraction
    #[arg(long, global = true)]
    pub no_whois: bool,

    /// Do not render pages for visual similarity scoring
    #[arg(long, global = true)]
    pub no_visual: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract and print the feature vector for a single URL
    #[command(group(ArgGroup::new("view").args(["array", "dict", "source"])))]
    Analyze {
        /// URL to analyse
        #[arg(short, long)]
        url: String,

        /// Print the ordered feature array
        #[arg(long)]
        array: bool,

        /// Print the name-keyed feature mapping (default)
        #[arg(long)]
        dict: bool,

        /// Print the rendered page source
        #[arg(long)]
        source: bool,
    },

    /// Classify a URL, or every URL pair in a reference CSV
    #[command(group(ArgGroup::new("target").required(true).args(["url", "input"])))]
    Hunt {
        /// Single URL to classify
        #[arg(short, long)]
        url: Option<String>,

        /// Reference CSV of `url,status` rows to classify pairwise
        #[arg(short, long, value_name = "REFERENCE_CSV")]
        input: Option<PathBuf>,

        /// Append each feature vector and verdict to this dataset
        #[arg(short = 'a', long = "append-to", value_name = "DATASET")]
        append_to: Option<PathBuf>,

        /// Model file (overrides classifier.model_path)
        #[arg(short, long, value_name = "PATH")]
        model: Option<PathBuf>,

        /// Stop after this many rows have been appended (requires --append-to)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Build a labelled training CSV from a reference CSV
    BuildDataset {
        /// Reference CSV of `url,status` rows
        #[arg(short, long)]
        input: PathBuf,

        /// Dataset CSV to write
        #[arg(short, long)]
        output: PathBuf,

        /// Append to an existing dataset instead of starting a new one
        #[arg(long)]
        append: bool,

        /// Stop after this many rows have been written
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

/// Output view for `analyze`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzeView {
    Array,
    Mapping,
    Source,
}

impl AnalyzeView {
    /// `--dict` and no flag at all both select the mapping; clap keeps the
    /// three flags mutually exclusive.
    pub fn from_flags(array: bool, source: bool) -> Self {
        if array {
            AnalyzeView::Array
        } else if source {
            AnalyzeView::Source
        } else {
            AnalyzeView::Mapping
        }
    }
}

impl Cli {
    pub fn extractor_options(&self) -> ExtractorOptions {
        ExtractorOptions {
            whois: !self.no_whois,
            visual: !self.no_visual,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Some(Commands::Analyze { url, .. }) if url.trim().is_empty() => {
                return Err("URL cannot be empty".to_string());
            }
            Some(Commands::Hunt { url: Some(url), .. }) if url.trim().is_empty() => {
                return Err("URL cannot be empty".to_string());
            }
            Some(Commands::Hunt { limit: Some(0), .. }) | Some(Commands::BuildDataset { limit: Some(0), .. }) => {
                return Err("Limit must be greater than 0".to_string());
            }
            // The limit counts rows written, so without a dataset it would never trigger
            Some(Commands::Hunt { limit: Some(_), append_to: None, .. }) => {
                return Err("--limit requires --append-to".to_string());
            }
            _ => {}
        }
        Ok(())
    }
}
