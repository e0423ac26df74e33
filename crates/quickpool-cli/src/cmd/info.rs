use std::path::PathBuf;

use clap::Args;
use quickpool_core::LockClass;

use super::{default_documents_path, open_coordinator, CLI_CONTEXT};

#[derive(Args)]
pub struct InfoArgs {
    pub db_name: String,

    #[arg(long)]
    pub documents_path: Option<PathBuf>,
}

pub async fn run(args: InfoArgs, json: bool) -> anyhow::Result<()> {
    let documents_path = args.documents_path.unwrap_or_else(default_documents_path);
    let coordinator = open_coordinator(&documents_path, &args.db_name, 0).await?;

    coordinator
        .request_lock(&args.db_name, CLI_CONTEXT, LockClass::Read)
        .await?;

    let page_count = coordinator
        .execute_in_context(&args.db_name, CLI_CONTEXT, "PRAGMA page_count", vec![])
        .await?;
    let page_size = coordinator
        .execute_in_context(&args.db_name, CLI_CONTEXT, "PRAGMA page_size", vec![])
        .await?;
    let journal_mode = coordinator
        .execute_in_context(&args.db_name, CLI_CONTEXT, "PRAGMA journal_mode", vec![])
        .await?;
    let table_count = coordinator
        .execute_in_context(
            &args.db_name,
            CLI_CONTEXT,
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
            vec![],
        )
        .await?;

    coordinator.release_lock(&args.db_name, CLI_CONTEXT).await?;

    let first_cell = |result: &quickpool_core::ExecResult| {
        result
            .rows
            .as_ref()
            .and_then(|rows| rows.first())
            .and_then(|row| row.first())
            .map(|(_, v)| format!("{v:?}"))
            .unwrap_or_default()
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "db_name": args.db_name,
                "page_count": first_cell(&page_count),
                "page_size": first_cell(&page_size),
                "journal_mode": first_cell(&journal_mode),
                "table_count": first_cell(&table_count),
            })
        );
    } else {
        println!("Database:     {}", args.db_name);
        println!("  Page count: {}", first_cell(&page_count));
        println!("  Page size:  {}", first_cell(&page_size));
        println!("  Journal:    {}", first_cell(&journal_mode));
        println!("  Tables:     {}", first_cell(&table_count));
    }

    coordinator.close(&args.db_name).await?;
    Ok(())
}
