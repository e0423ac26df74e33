use std::path::PathBuf;

use clap::Args;

use super::{default_documents_path, open_coordinator};

#[derive(Args)]
pub struct DetachArgs {
    pub db_name: String,

    /// Alias to detach
    pub alias: String,

    #[arg(long)]
    pub documents_path: Option<PathBuf>,
}

pub async fn run(args: DetachArgs) -> anyhow::Result<()> {
    let documents_path = args.documents_path.unwrap_or_else(default_documents_path);
    let coordinator = open_coordinator(&documents_path, &args.db_name, 0).await?;

    let result = coordinator.detach(&args.db_name, &args.alias).await;

    coordinator.close(&args.db_name).await?;
    result?;

    println!("Detached {}", args.alias);
    Ok(())
}
