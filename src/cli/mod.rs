//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ticketscope",
    version,
    about = "Support ticket triage companion with semantic code and wiki retrieval",
    long_about = "Ticketscope indexes a codebase and wiki pages for semantic retrieval, and turns the \
                  evidence attached to a support ticket (HAR captures, log-search links, ticket fields) \
                  into a concrete log search or an explicit request for more data."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/ticketscope/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a source tree into a code collection
    Index {
        /// Root directory (defaults to codebase.root)
        root: Option<PathBuf>,

        /// Collection name (defaults to codebase.collection)
        #[arg(long)]
        collection: Option<String>,

        /// Stop after this many files
        #[arg(long)]
        max_files: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Index an exported wiki space (one JSON page per line)
    IndexWiki {
        /// Export file (defaults to wiki.export_file)
        export: Option<PathBuf>,

        /// Collection name (defaults to wiki.collection)
        #[arg(long)]
        collection: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask a question against an indexed collection
    Query {
        /// Question text
        question: String,

        /// Collection name (defaults to codebase.collection)
        #[arg(long)]
        collection: Option<String>,

        /// Number of chunks to return (defaults to index.default_top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Extract identifiers and timestamps from a HAR capture
    Har {
        /// Path to the .har file
        file: PathBuf,

        /// Scan every entry, not only failed requests
        #[arg(long)]
        all: bool,
    },

    /// Parse a log-search link, resolving it first if it is a short link
    SearchUrl {
        /// Full or short log-search URL
        url: String,

        /// Reference time for relative expressions (RFC 3339, defaults to now)
        #[arg(long)]
        now: Option<String>,
    },

    /// Triage a ticket and print the report as JSON
    Triage {
        /// Ticket JSON file
        ticket: PathBuf,

        /// Additional HAR captures to attach
        #[arg(long = "har", value_name = "FILE")]
        captures: Vec<PathBuf>,

        /// Reference time for relative expressions (RFC 3339, defaults to now)
        #[arg(long)]
        now: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_triage() {
        let cli = Cli::try_parse_from([
            "ticketscope",
            "triage",
            "ticket.json",
            "--har",
            "a.har",
            "--har",
            "b.har",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Triage {
                ticket, captures, ..
            } => {
                assert_eq!(ticket, PathBuf::from("ticket.json"));
                assert_eq!(captures.len(), 2);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
