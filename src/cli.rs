use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP server
    Serve {
        /// Override the configured port
        #[clap(short, long)]
        port: Option<u16>,
    },

    /// Rebuild indexes from <data_dir>/<platform>.tsv
    #[clap(group(ArgGroup::new("target").required(true).args(["platform", "all"])))]
    Build {
        /// shopify, ozon or yandex
        #[clap(short, long)]
        platform: Option<String>,

        /// Build every platform, continuing past failures
        #[clap(long, default_value = "false")]
        all: bool,
    },

    /// Check that a persisted index loads
    Load {
        #[clap(short, long)]
        platform: String,
    },

    /// Top categories of one platform for a product description
    Search {
        #[clap(short, long, default_value = "shopify")]
        platform: String,

        /// Number of results
        #[clap(short, default_value = "5")]
        k: usize,

        text: String,
    },

    /// Map a description through shopify into every other platform
    Chain {
        /// Number of shopify candidates
        #[clap(short, default_value = "3")]
        k: usize,

        text: String,
    },

    /// Remove a persisted index
    Delete {
        #[clap(short, long)]
        platform: String,
    },

    /// Show supported platforms and which indexes exist on disk
    Status {},

    /// Convert an upstream taxonomy export into category TSV
    Convert {
        #[clap(value_enum)]
        format: ExportFormat,

        input: PathBuf,

        output: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// `gid://... : text` listing
    Shopify,
    /// Ozon category tree JSON
    Ozon,
    /// Yandex Market category tree JSON
    Yandex,
}
