use std::path::PathBuf;

use clap::Args;

use super::{default_documents_path, open_coordinator};

#[derive(Args)]
pub struct InitArgs {
    /// Database name (resolves to `<documents-path>/<name>.sqlite3`)
    pub db_name: String,

    /// Directory the database file is resolved under
    #[arg(long)]
    pub documents_path: Option<PathBuf>,

    /// Number of dedicated read connections (0 = compatibility mode)
    #[arg(long, default_value_t = 0)]
    pub readers: u32,
}

pub async fn run(args: InitArgs) -> anyhow::Result<()> {
    let documents_path = args.documents_path.unwrap_or_else(default_documents_path);
    let coordinator = open_coordinator(&documents_path, &args.db_name, args.readers).await?;
    coordinator.close(&args.db_name).await?;

    println!(
        "Created {} at {}",
        args.db_name,
        documents_path.join(format!("{}.sqlite3", args.db_name)).display()
    );
    Ok(())
}
