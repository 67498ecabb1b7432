use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use hearth_cli::cli::{Cli, Commands};
use hearth_cli::commands;
use hearth_daemon::{Core, CoreConfig};
use hearth_shells::LocalSupervisor;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = format!(
        "hearth={log},hearth_daemon={log},hearth_acp={log},hearth_pty={log},hearth_shells={log}",
        log = log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .with_writer(std::io::stderr)
        .init();

    let base_dir = cli
        .base_dir
        .or_else(|| dirs::cache_dir().map(|d| d.join("hearth")))
        .unwrap_or_else(|| PathBuf::from(".hearth"));
    let mut config = CoreConfig::new(base_dir);
    if let Some(extensions_dir) = cli.extensions_dir {
        config = config.with_extensions_dir(extensions_dir);
    }

    let supervisor = Arc::new(LocalSupervisor::new());
    let core = Core::new(config, supervisor);
    core.load_extensions()?;

    match cli.command {
        Commands::Exec {
            conversation,
            cwd,
            cmd,
        } => commands::exec::execute(core.clone(), fresh_id(conversation), cwd, cmd).await?,

        Commands::Send { conversation, data } => {
            commands::pty::send(core.clone(), conversation, data).await?
        }

        Commands::WaitFor {
            conversation,
            pattern,
            match_type,
            from_cursor,
            timeout_ms,
        } => {
            commands::pty::wait_for(
                core.clone(),
                conversation,
                pattern,
                match_type,
                from_cursor,
                timeout_ms,
            )
            .await?
        }

        Commands::ReadSpool {
            conversation,
            from_cursor,
            max_bytes,
        } => commands::pty::read_spool(core.clone(), conversation, from_cursor, max_bytes).await?,

        Commands::Status { conversation } => {
            commands::pty::status(core.clone(), conversation).await?
        }

        Commands::Blocks {
            conversation,
            command,
        } => commands::blocks::execute(core.clone(), conversation, command).await?,

        Commands::Extensions => commands::acp::list_extensions(core.clone())?,

        Commands::WarmUp => commands::acp::warm_up(core.clone()).await?,

        Commands::Prompt {
            conversation,
            extension,
            cwd,
            text,
        } => {
            commands::acp::prompt(core.clone(), fresh_id(conversation), extension, cwd, text)
                .await?
        }

        Commands::Tail { conversation } => commands::tail::execute(core.clone(), conversation).await?,
    }

    core.shutdown().await;
    Ok(())
}

fn fresh_id(requested: Option<String>) -> String {
    requested.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
}
