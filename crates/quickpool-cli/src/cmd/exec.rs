use std::path::PathBuf;

use clap::Args;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};
use quickpool_core::LockClass;

use super::{default_documents_path, open_coordinator, parse_value, CLI_CONTEXT};

#[derive(Args)]
pub struct ExecArgs {
    pub db_name: String,

    /// The SQL statement to run
    pub sql: String,

    /// Bound parameters, in `?1, ?2, ...` order
    pub params: Vec<String>,

    #[arg(long)]
    pub documents_path: Option<PathBuf>,

    /// Take a read lock instead of a write lock
    #[arg(long)]
    pub read_only: bool,
}

pub async fn run(args: ExecArgs, json: bool) -> anyhow::Result<()> {
    let documents_path = args.documents_path.unwrap_or_else(default_documents_path);
    let coordinator = open_coordinator(&documents_path, &args.db_name, if args.read_only { 1 } else { 0 }).await?;

    let class = if args.read_only { LockClass::Read } else { LockClass::Write };
    coordinator.request_lock(&args.db_name, CLI_CONTEXT, class).await?;

    let params = args.params.iter().map(|p| parse_value(p)).collect();
    let result = coordinator
        .execute_in_context(&args.db_name, CLI_CONTEXT, &args.sql, params)
        .await;

    coordinator.release_lock(&args.db_name, CLI_CONTEXT).await?;
    coordinator.close(&args.db_name).await?;
    let result = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if let (Some(rows), Some(metadata)) = (&result.rows, &result.metadata) {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(metadata.iter().map(|c| c.column_name.clone()));
        for row in rows {
            table.add_row(row.iter().map(|(_, v)| format!("{v:?}")));
        }
        println!("{table}");
    } else {
        println!("rows_affected: {}", result.rows_affected);
        if let Some(id) = result.insert_id {
            println!("insert_id: {id}");
        }
    }

    Ok(())
}
