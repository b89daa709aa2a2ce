//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line interface for the courier download engine.
#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Fetch download manifests and retrieve their files")]
#[command(version)]
pub struct Cli {
    /// Directory downloads are placed in
    #[arg(long = "download-dir", global = true, default_value = "downloads")]
    pub download_dir: PathBuf,

    /// Transfer tool binary
    #[arg(long = "transfer-bin", global = true, env = "COURIER_TRANSFER_BIN", default_value = "rclone")]
    pub transfer_bin: PathBuf,

    /// Archive tool binary
    #[arg(long = "extract-bin", global = true, env = "COURIER_EXTRACT_BIN", default_value = "7z")]
    pub extract_bin: PathBuf,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download everything a manifest describes
    Download {
        /// Manifest source: an HTTPS URL or a local JSON file
        source: String,

        /// Bearer token sent when fetching the manifest over HTTP
        #[arg(long, env = "COURIER_TOKEN")]
        token: Option<String>,

        /// Parallel transfers (capped)
        #[arg(long, default_value_t = 3)]
        parallel: usize,

        /// Skip archive extraction after download
        #[arg(long)]
        no_extract: bool,
    },

    /// Inspect or clear the download history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
}

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// List past downloads, newest first
    List,
    /// Remove all history records
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_download_args() {
        let cli = Cli::parse_from([
            "courier",
            "download",
            "https://svc/manifest",
            "--parallel",
            "5",
            "--no-extract",
        ]);
        match cli.command {
            Commands::Download {
                source,
                parallel,
                no_extract,
                token,
            } => {
                assert_eq!(source, "https://svc/manifest");
                assert_eq!(parallel, 5);
                assert!(no_extract);
                assert!(token.is_none());
            }
            Commands::History { .. } => panic!("expected download command"),
        }
    }

    #[test]
    fn test_global_args() {
        let cli = Cli::parse_from([
            "courier",
            "--download-dir",
            "/tmp/dl",
            "history",
            "list",
        ]);
        assert_eq!(cli.download_dir, PathBuf::from("/tmp/dl"));
        assert!(matches!(
            cli.command,
            Commands::History {
                command: HistoryCommands::List
            }
        ));
    }
}
