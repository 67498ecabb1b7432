//! Command-line interface definition

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hearth", version, about = "PTY + ACP conversation orchestrator")]
pub struct Cli {
    /// Application data root (defaults to the user cache dir)
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Directory holding extensions.json (defaults to <base>/extensions)
    #[arg(long, global = true)]
    pub extensions_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute one command as a block and print its output
    Exec {
        /// Conversation id (a fresh one is minted when omitted)
        #[arg(short, long)]
        conversation: Option<String>,
        /// Working directory for the command
        #[arg(long)]
        cwd: Option<String>,
        /// The command line to run
        cmd: String,
    },

    /// Write raw bytes to a conversation's PTY
    Send {
        #[arg(short, long)]
        conversation: String,
        /// Data to send (supports \n, \r, \xNN escapes via shell quoting)
        data: String,
    },

    /// Wait for a pattern in a conversation's output spool
    WaitFor {
        #[arg(short, long)]
        conversation: String,
        /// Pattern (substring or regex; ignored for prompt matches)
        pattern: String,
        /// substring | regex | prompt
        #[arg(long, default_value = "substring")]
        match_type: String,
        #[arg(long, default_value_t = 0)]
        from_cursor: u64,
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
    },

    /// Read raw spool bytes from a cursor
    ReadSpool {
        #[arg(short, long)]
        conversation: String,
        #[arg(long, default_value_t = 0)]
        from_cursor: u64,
        #[arg(long, default_value_t = 65_536)]
        max_bytes: u64,
    },

    /// Show a conversation's PTY status
    Status {
        #[arg(short, long)]
        conversation: String,
    },

    /// Query the block index
    Blocks {
        #[arg(short, long)]
        conversation: String,
        #[command(subcommand)]
        command: BlocksCommand,
    },

    /// List registered ACP extensions
    Extensions,

    /// Warm up every registered ACP extension
    WarmUp,

    /// Send one prompt to an ACP agent and stream the turn
    Prompt {
        /// Conversation id (a fresh one is minted when omitted)
        #[arg(short, long)]
        conversation: Option<String>,
        /// Extension id (e.g. gemini)
        #[arg(short, long)]
        extension: String,
        /// Session working directory
        #[arg(long)]
        cwd: Option<String>,
        /// The prompt text
        text: String,
    },

    /// Tail a conversation's live event feed
    Tail {
        #[arg(short, long)]
        conversation: String,
    },
}

#[derive(Subcommand)]
pub enum BlocksCommand {
    /// List blocks since a byte cursor into blocks.jsonl
    Since {
        #[arg(long, default_value_t = 0)]
        cursor: u64,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Get one block's metadata
    Get { block_id: String },
    /// Read raw output bytes from a block
    Read {
        block_id: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 65_536)]
        max_bytes: u64,
    },
    /// Search a block's output for a substring
    Search {
        block_id: String,
        query: String,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn exec_parses() {
        let cli = Cli::parse_from(["hearth", "exec", "-c", "c1", "--cwd", "/tmp", "echo hi"]);
        match cli.command {
            Commands::Exec {
                conversation,
                cwd,
                cmd,
            } => {
                assert_eq!(conversation.as_deref(), Some("c1"));
                assert_eq!(cwd.as_deref(), Some("/tmp"));
                assert_eq!(cmd, "echo hi");
            }
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn blocks_since_parses_with_defaults() {
        let cli = Cli::parse_from(["hearth", "blocks", "-c", "c1", "since"]);
        match cli.command {
            Commands::Blocks { command, .. } => match command {
                BlocksCommand::Since { cursor, limit } => {
                    assert_eq!(cursor, 0);
                    assert_eq!(limit, 50);
                }
                _ => panic!("expected since"),
            },
            _ => panic!("expected blocks"),
        }
    }
}
