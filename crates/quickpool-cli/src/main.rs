mod cmd;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "quickpool", about = "Exercise a quickpool-core database from the command line")]
struct Cli {
    /// Output as JSON instead of human-readable tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new database
    Init(cmd::init::InitArgs),
    /// Show database info (page count, journal mode, table count)
    Info(cmd::info::InfoArgs),
    /// Run one statement in a fresh read or write context
    Exec(cmd::exec::ExecArgs),
    /// Run several statements in one exclusive transaction
    Batch(cmd::batch::BatchArgs),
    /// Load and run one statement per line of a file, in one transaction
    LoadFile(cmd::load_file::LoadFileArgs),
    /// ATTACH another database file under an alias
    Attach(cmd::attach::AttachArgs),
    /// DETACH a previously attached alias
    Detach(cmd::detach::DetachArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    match cli.command {
        Commands::Init(args) => cmd::init::run(args).await,
        Commands::Info(args) => cmd::info::run(args, json).await,
        Commands::Exec(args) => cmd::exec::run(args, json).await,
        Commands::Batch(args) => cmd::batch::run(args, json).await,
        Commands::LoadFile(args) => cmd::load_file::run(args, json).await,
        Commands::Attach(args) => cmd::attach::run(args).await,
        Commands::Detach(args) => cmd::detach::run(args).await,
    }
}
