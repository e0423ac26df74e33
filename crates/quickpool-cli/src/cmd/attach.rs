use std::path::PathBuf;

use clap::Args;

use super::{default_documents_path, open_coordinator};

#[derive(Args)]
pub struct AttachArgs {
    pub db_name: String,

    /// Path to the database file to attach
    pub file_to_attach: PathBuf,

    /// Alias the attached database is addressed by in SQL
    pub alias: String,

    #[arg(long)]
    pub documents_path: Option<PathBuf>,
}

pub async fn run(args: AttachArgs) -> anyhow::Result<()> {
    let documents_path = args.documents_path.unwrap_or_else(default_documents_path);
    let coordinator = open_coordinator(&documents_path, &args.db_name, 0).await?;

    let result = coordinator
        .attach(&args.db_name, &args.file_to_attach, &args.alias)
        .await;

    coordinator.close(&args.db_name).await?;
    result?;

    println!("Attached {} as {}", args.file_to_attach.display(), args.alias);
    Ok(())
}
