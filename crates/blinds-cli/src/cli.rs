//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Reusable output format arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, conflicts_with = "format")]
    pub json: bool,
}

impl OutputArgs {
    /// The effective format after applying `--json`.
    pub fn resolved(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "blinds")]
#[command(author, version, about = "Control a fleet of BLE blinds controllers", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Address prefix identifying blinds controllers (overrides config)
    #[arg(long, global = true, value_name = "PREFIX")]
    pub prefix: Option<String>,

    /// Milliseconds between reconnection attempts (overrides config)
    #[arg(long, global = true, value_name = "MS")]
    pub interval_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Discover blinds controllers and show their connection state
    List {
        /// Seconds to scan and connect before printing
        #[arg(short, long, default_value = "5", value_name = "SECS")]
        wait: u64,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Move one device to a position
    Set {
        /// Device address or alias
        device: String,

        /// Target position in percent open (0 = closed, 100 = open)
        #[arg(value_parser = clap::value_parser!(u32).range(0..=100))]
        percent: u32,

        /// Give up after this many seconds
        #[arg(short = 'T', long, default_value = "30", value_name = "SECS")]
        timeout: u64,
    },

    /// Print position updates and missing devices until interrupted
    Watch {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Inspect or edit the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the configuration file path
    Path,
    /// Print the effective configuration
    Show,
    /// Give a device a friendly name
    Alias {
        /// Alias name (e.g. "living-room")
        name: String,
        /// Device address
        device: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_set() {
        let cli = Cli::parse_from(["blinds", "set", "living-room", "75"]);
        match cli.command {
            Commands::Set {
                device,
                percent,
                timeout,
            } => {
                assert_eq!(device, "living-room");
                assert_eq!(percent, 75);
                assert_eq!(timeout, 30);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_set_rejects_out_of_range_percent() {
        assert!(Cli::try_parse_from(["blinds", "set", "kitchen", "101"]).is_err());
    }

    #[test]
    fn test_global_overrides() {
        let cli = Cli::parse_from([
            "blinds",
            "list",
            "--json",
            "--prefix",
            "03:80:E1",
            "--interval-ms",
            "500",
        ]);
        assert_eq!(cli.prefix.as_deref(), Some("03:80:E1"));
        assert_eq!(cli.interval_ms, Some(500));
        match cli.command {
            Commands::List { wait, output } => {
                assert_eq!(wait, 5);
                assert_eq!(output.resolved(), OutputFormat::Json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["blinds", "-v", "-q", "watch"]).is_err());
    }

    #[test]
    fn test_parse_config_alias() {
        let cli = Cli::parse_from(["blinds", "config", "alias", "office", "03:80:E1:00:00:01"]);
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Alias { .. }
            }
        ));
    }
}
