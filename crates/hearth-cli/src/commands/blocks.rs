//! `hearth blocks` - queries over the block index

use std::sync::Arc;

use anyhow::Result;

use hearth_daemon::Core;

use crate::cli::BlocksCommand;

pub async fn execute(core: Arc<Core>, conversation: String, command: BlocksCommand) -> Result<()> {
    let engine = core.pty().get_or_create(&conversation).await;
    let index = engine.index();
    match command {
        BlocksCommand::Since { cursor, limit } => {
            let page = index.since(cursor, limit).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        BlocksCommand::Get { block_id } => {
            let block = index.get(&block_id).await?;
            println!("{}", serde_json::to_string_pretty(&block)?);
        }
        BlocksCommand::Read {
            block_id,
            offset,
            max_bytes,
        } => {
            let (data, _, next_offset) = index.read_output(&block_id, offset, max_bytes).await?;
            print!("{data}");
            eprintln!("next_offset: {next_offset}");
        }
        BlocksCommand::Search {
            block_id,
            query,
            limit,
        } => {
            let hits = index.search(&block_id, &query, limit).await?;
            for hit in hits {
                println!("{}: {}", hit.line, hit.text);
            }
        }
    }
    Ok(())
}
