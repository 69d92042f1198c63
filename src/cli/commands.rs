//! CLI command definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(name = "grantscout")]
#[command(about = "Conversation-aware grant search: serve the API or ask from the terminal")]
#[command(version)]
pub struct Cli {
    /// Enable verbose debug logging (default: level from config)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: config.toml, then config.example.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host address to bind to (default: from config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (default: from config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Enable CORS for all origins
        #[arg(long)]
        cors: bool,
    },
    /// Ask a single question and print the answer with its grants
    Ask {
        /// The question
        query: String,
        /// Session id, to continue an earlier conversation in this process
        #[arg(short, long)]
        session: Option<String>,
        /// Number of grants to retrieve before ranking
        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,
        /// Include closed and inactive grants
        #[arg(long)]
        all: bool,
        /// Print the whole ranked shortlist, not just the cards
        #[arg(long)]
        shortlist: bool,
    },
    /// Initialize database schema and indexes
    Init {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Import grants from a JSON file and embed their text
    Import {
        /// JSON array of grant records
        path: PathBuf,
    },
    /// Show current configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask() {
        let cli = Cli::parse_from(["grantscout", "-v", "ask", "net zero grants", "--all", "-k", "5"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Ask {
                query, top_k, all, ..
            } => {
                assert_eq!(query, "net zero grants");
                assert_eq!(top_k, 5);
                assert!(all);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_parse_serve_with_config() {
        let cli = Cli::parse_from(["grantscout", "serve", "--port", "9000", "-c", "prod.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("prod.toml")));
        assert!(matches!(
            cli.command,
            Commands::Serve {
                port: Some(9000),
                cors: false,
                ..
            }
        ));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
