use clap::{Args, Parser, Subcommand};

use crate::config::BackendKind;

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "scanlog",
    about = "Geotagged QR scan history",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Storage backend; overrides the config file.
    #[arg(long, global = true, value_enum, env = "SCANLOG_BACKEND")]
    pub backend: Option<BackendKind>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Open the selected backend and report whether it is usable.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    #[command(flatten)]
    Scan(ScanCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ScanCommand {
    /// Record a decoded scan.
    Add(AddArgs),
    /// List scans, newest first.
    List {
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
        /// Show at most this many scans.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show a single scan.
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Delete a scan.
    Delete { id: i64 },
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct AddArgs {
    /// Decoded payload of the scanned code.
    pub qr_data: String,
    #[arg(long, allow_negative_numbers = true)]
    pub lat: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub lon: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub alt: Option<f64>,
    #[arg(long)]
    pub accuracy: Option<f64>,
    /// Capture time in epoch milliseconds; defaults to now.
    #[arg(long)]
    pub timestamp: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_health_subcommand() {
        let cli = Cli::try_parse_from(["scanlog", "health"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Health);
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli =
            Cli::try_parse_from(["scanlog", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Config(ConfigCommand::Init));
    }

    #[test]
    fn parses_add_with_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "scanlog",
            "add",
            "https://example.com",
            "--lat",
            "40.0",
            "--lon",
            "-3.0",
            "--accuracy",
            "5",
            "--timestamp",
            "1000",
        ])
        .expect("parse should succeed");

        assert_eq!(
            cli.command,
            Command::Scan(ScanCommand::Add(AddArgs {
                qr_data: "https://example.com".into(),
                lat: Some(40.0),
                lon: Some(-3.0),
                alt: None,
                accuracy: Some(5.0),
                timestamp: Some(1000),
            }))
        );
    }

    #[test]
    fn parses_backend_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["scanlog", "list", "--json", "--backend", "key-value"])
            .expect("parse should succeed");
        assert_eq!(cli.backend, Some(BackendKind::KeyValue));
        assert_eq!(
            cli.command,
            Command::Scan(ScanCommand::List {
                json: true,
                limit: None
            })
        );
    }

    #[test]
    fn parses_delete_by_id() {
        let cli = Cli::try_parse_from(["scanlog", "delete", "7"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Scan(ScanCommand::Delete { id: 7 }));
    }

    #[test]
    fn requires_a_subcommand() {
        assert!(Cli::try_parse_from(["scanlog"]).is_err());
    }
}
