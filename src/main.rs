use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use keyhub::config::Config;
use keyhub::db::{AppState, queries};
use keyhub::handlers;
use keyhub::models::{CreateUser, Role};
use keyhub::util;

#[derive(Parser)]
#[command(name = "keyhub", about = "License-key marketplace server", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create an administrator account
    CreateAdmin {
        username: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::CreateAdmin { username, password } => create_admin(&config, &username, &password),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.addr();
    let state = AppState::from_config(&config)?;

    if state.telegram.is_none() {
        tracing::info!("Telegram is not configured; WebApp login disabled");
    }

    let app = handlers::router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn create_admin(config: &Config, username: &str, password: &str) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    let conn = state.db.get()?;

    let password_hash = util::hash_password(password)?;
    let user = queries::create_user(
        &conn,
        &CreateUser {
            username: username.to_string(),
            email: None,
            password_hash: Some(password_hash),
            role: Role::Admin,
            telegram_id: None,
        },
    )?;

    println!("Created admin {} ({})", user.username, user.id);
    Ok(())
}
