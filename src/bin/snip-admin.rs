use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use snip::app::open_storage;
use snip::auth::AuthService;
use snip::config::Config;
use snip::storage::Storage;
use snip::sweeper::Sweeper;

#[derive(Parser)]
#[command(name = "snip-admin")]
#[command(about = "Snip maintenance CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one expiry sweep with the configured retention policy
    Sweep,
    /// Print store-wide totals as JSON
    Stats,
    /// Mint a bearer token for an account
    Token {
        /// Account ID (becomes the `sub` claim)
        account_id: String,
        /// Grant admin rights
        #[arg(long)]
        admin: bool,
        /// Token lifetime in hours
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Sweep => {
            let storage = open_storage(&config.database).await?;
            let sweeper = Sweeper::new(storage, config.sweeper.clone());
            let report = sweeper.sweep().await?;
            println!(
                "✓ Sweep finished: {} expired, {} purged",
                report.expired, report.purged
            );
        }
        Commands::Stats => {
            let storage = open_storage(&config.database).await?;
            let totals = storage.totals(chrono::Utc::now().timestamp()).await?;
            println!("{}", serde_json::to_string_pretty(&totals)?);
        }
        Commands::Token {
            account_id,
            admin,
            ttl_hours,
        } => {
            if ttl_hours <= 0 {
                anyhow::bail!("--ttl-hours must be positive");
            }
            let auth = AuthService::new(&config.auth);
            let token = auth
                .issue_token(&account_id, admin, chrono::Duration::hours(ttl_hours))
                .context("JWT_SECRET must be set to mint tokens")?;
            println!("{token}");
        }
    }

    Ok(())
}
