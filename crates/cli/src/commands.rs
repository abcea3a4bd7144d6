use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Load CSV input into the configured table
    Import(ImportArgs),
    /// Print the effective configuration, `extend` chain resolved
    Config {
        #[arg(long, help = "Config file path")]
        config: PathBuf,

        #[arg(
            long,
            help = "If specified, writes the configuration to this file instead of stdout"
        )]
        output: Option<PathBuf>,
    },
    /// Open and close one connection to the configured database
    TestConn {
        #[arg(long, help = "Config file path")]
        config: PathBuf,
    },
}

#[derive(Args)]
pub struct ImportArgs {
    #[arg(long, help = "Config file path")]
    pub config: PathBuf,

    /// Input file, or a directory whose files are imported one by one
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, help = "Only import files whose name matches this regex")]
    pub include: Option<String>,

    #[arg(long, help = "Skip files whose name matches this regex")]
    pub skip: Option<String>,

    /// Number of workers; defaults to, and is capped at, the available cores
    #[arg(long)]
    pub threads: Option<usize>,

    #[arg(long, help = "Overrides batchSize from the config file")]
    pub batch_size: Option<i64>,

    #[arg(long, help = "Overrides limit from the config file")]
    pub limit: Option<u64>,

    #[arg(long, help = "Log statements and record values")]
    pub verbose: bool,

    #[arg(long, help = "Log progress every few seconds")]
    pub progress: bool,
}
