use std::path::PathBuf;

use clap::Args;
use quickpool_core::LockClass;

use super::{default_documents_path, open_coordinator, CLI_CONTEXT};

#[derive(Args)]
pub struct LoadFileArgs {
    pub db_name: String,

    /// File with one SQL statement per line, run inside a single
    /// exclusive transaction and rolled back on the first failure
    pub path: PathBuf,

    #[arg(long)]
    pub documents_path: Option<PathBuf>,
}

pub async fn run(args: LoadFileArgs, json: bool) -> anyhow::Result<()> {
    let documents_path = args.documents_path.unwrap_or_else(default_documents_path);
    let coordinator = open_coordinator(&documents_path, &args.db_name, 0).await?;

    coordinator
        .request_lock(&args.db_name, CLI_CONTEXT, LockClass::Write)
        .await?;

    let result = coordinator
        .load_file(&args.db_name, CLI_CONTEXT, args.path)
        .await;

    coordinator.release_lock(&args.db_name, CLI_CONTEXT).await?;
    coordinator.close(&args.db_name).await?;
    let result = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "ran {} statements, rows_affected: {}",
            result.commands, result.rows_affected
        );
    }
    Ok(())
}
