//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tripagent - conversational flight and hotel planner
#[derive(Parser)]
#[command(
    name = "ta",
    about = "Conversational flight and hotel planner",
    version,
    after_help = "Logs are written to: ~/.local/share/tripagent/logs/tripagent.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, help = "Log level override")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Start an interactive planning conversation
    Chat,

    /// Log in to the travel backend
    Login {
        /// Username; prompted for when omitted
        username: Option<String>,
    },

    /// Log out and discard stored credentials
    Logout,

    /// Score and rank candidates from a JSON file, offline
    Score {
        /// File holding a JSON array of candidates
        file: PathBuf,

        /// Budget cap used by the price component
        #[arg(short, long)]
        budget: Option<f64>,

        /// Preferred flight duration in minutes
        #[arg(short, long)]
        duration: Option<u32>,

        /// Desired hotel amenity; repeatable
        #[arg(short, long = "amenity")]
        amenities: Vec<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for the score command
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Path of the log file named in `after_help`
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripagent")
        .join("logs")
        .join("tripagent.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["ta"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_chat() {
        let cli = Cli::parse_from(["ta", "chat"]);
        assert!(matches!(cli.command, Some(Command::Chat)));
    }

    #[test]
    fn test_cli_parse_login_with_username() {
        let cli = Cli::parse_from(["ta", "login", "ada"]);
        if let Some(Command::Login { username }) = cli.command {
            assert_eq!(username.as_deref(), Some("ada"));
        } else {
            panic!("Expected Login command");
        }
    }

    #[test]
    fn test_cli_parse_logout() {
        let cli = Cli::parse_from(["ta", "logout"]);
        assert!(matches!(cli.command, Some(Command::Logout)));
    }

    #[test]
    fn test_cli_parse_score() {
        let cli = Cli::parse_from([
            "ta",
            "score",
            "candidates.json",
            "--budget",
            "500",
            "--amenity",
            "wifi",
            "--amenity",
            "pool",
        ]);
        if let Some(Command::Score {
            file,
            budget,
            amenities,
            format,
            ..
        }) = cli.command
        {
            assert_eq!(file, PathBuf::from("candidates.json"));
            assert_eq!(budget, Some(500.0));
            assert_eq!(amenities, vec!["wifi", "pool"]);
            assert!(matches!(format, OutputFormat::Text));
        } else {
            panic!("Expected Score command");
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("invalid".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["ta", "-c", "/path/to/config.yml", "chat"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
    }
}
