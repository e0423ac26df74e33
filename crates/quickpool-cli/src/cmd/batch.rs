use std::path::PathBuf;

use clap::Args;
use quickpool_core::{BatchCommand, BatchParams, LockClass};

use super::{default_documents_path, open_coordinator, CLI_CONTEXT};

#[derive(Args)]
pub struct BatchArgs {
    pub db_name: String,

    /// One or more SQL statements, run inside a single exclusive
    /// transaction and rolled back on the first failure
    #[arg(required = true)]
    pub statements: Vec<String>,

    #[arg(long)]
    pub documents_path: Option<PathBuf>,
}

pub async fn run(args: BatchArgs, json: bool) -> anyhow::Result<()> {
    let documents_path = args.documents_path.unwrap_or_else(default_documents_path);
    let coordinator = open_coordinator(&documents_path, &args.db_name, 0).await?;

    coordinator
        .request_lock(&args.db_name, CLI_CONTEXT, LockClass::Write)
        .await?;

    let commands = args
        .statements
        .into_iter()
        .map(|sql| BatchCommand {
            sql,
            params: BatchParams::Single(vec![]),
        })
        .collect();

    let result = coordinator
        .execute_batch(&args.db_name, CLI_CONTEXT, commands)
        .await;

    coordinator.release_lock(&args.db_name, CLI_CONTEXT).await?;
    coordinator.close(&args.db_name).await?;
    let result = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("rows_affected: {}", result.rows_affected);
    }
    Ok(())
}
