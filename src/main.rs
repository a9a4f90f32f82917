use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use journal::config::Config;
use journal::{build_app, cli, db};

/// Learning journal with automatic tagging
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web server (default)
    Serve,
    /// Create a user who can log in with the given email and password
    CreateUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "JOURNAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Recompute entry/tag associations for every entry
    Retag,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("journal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<(), cli::CliError> {
    let config = Config::from_env()?;
    let pool = db::init_pool(&config.database_url).await?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let app = build_app(pool, config.secure_cookies).await?;
            let listener = TcpListener::bind(config.bind_addr).await?;

            tracing::info!("listening on {}", config.bind_addr);
            axum::serve(listener, app).await?;
        }
        Command::CreateUser { name, email, password } => {
            let user = cli::create_user(&pool, &name, &email, &password).await?;
            println!("Created user:");
            println!("  ID: {}", user.id);
            println!("  Name: {}", user.name);
            println!("  Email: {}", user.email);
        }
        Command::Retag => {
            let summary = cli::retag_all(&pool).await?;
            println!(
                "Retagged {} entries: {} associations added, {} removed",
                summary.entries, summary.added, summary.removed
            );
        }
    }

    Ok(())
}
