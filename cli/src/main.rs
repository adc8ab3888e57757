use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use marketplace::config::{ClientConfig, ConfigError};
use marketplace::error::AuthError;
use marketplace::net::{Credentials, StaticProbe};
use marketplace::session::{GuardDecision, RegisterOutcome, SessionController, evaluate};
use marketplace::user::{DashboardKind, ProfileUpdate, RegisterInput, UserType};
use serde_json::{Value, json};
use tracing_subscriber::filter::LevelFilter;

const DEFAULT_STORE: &str = ".marketplace-session.json";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("profile patch must be a JSON object")]
    PatchNotObject,
    #[error("not signed in")]
    NotSignedIn,
}

#[derive(Parser, Debug)]
#[command(name = "marketplace-cli", about = "Marketplace session CLI")]
struct Cli {
    /// Auth API root; overrides `API_BASE_URL`.
    #[arg(long)]
    api_base_url: Option<String>,

    /// Session file; overrides `SESSION_STORE_PATH`.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Skip the availability probe and use the offline backend.
    #[arg(long)]
    offline: bool,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        /// Email or username.
        identifier: String,
        #[arg(long, env = "MARKETPLACE_PASSWORD")]
        password: String,
        #[arg(long, value_enum)]
        dashboard: Option<Dashboard>,
    },
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MARKETPLACE_PASSWORD")]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        area: Option<String>,
        #[arg(long)]
        provider: bool,
        #[arg(long)]
        service_category: Option<String>,
    },
    Logout,
    Whoami,
    UpdateProfile {
        /// JSON object of fields to change, e.g. `{"bio": "x"}`.
        patch: String,
    },
    /// Print the guard decision for a route.
    Guard {
        path: String,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Dashboard {
    Customer,
    Provider,
}

impl From<Dashboard> for DashboardKind {
    fn from(value: Dashboard) -> Self {
        match value {
            Dashboard::Customer => Self::Customer,
            Dashboard::Provider => Self::Provider,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let level = if cli.verbose { LevelFilter::INFO } else { LevelFilter::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.api_base_url {
        config.api_base_url = url.trim_end_matches('/').to_owned();
    }
    config.store_path = cli
        .store
        .or(config.store_path)
        .or_else(|| Some(PathBuf::from(DEFAULT_STORE)));

    let controller = if cli.offline {
        SessionController::from_config_with_probe(&config, Arc::new(StaticProbe(false)))?
    } else {
        SessionController::from_config(&config)?
    };

    match cli.command {
        Command::Login { identifier, password, dashboard } => {
            let outcome = controller
                .login(&Credentials::new(identifier, password), dashboard.map(DashboardKind::from))
                .await?;
            eprintln!("signed in as {}", outcome.user.display_name());
            print_json(&json!({ "user": outcome.user, "destination": outcome.destination }))
        }
        Command::Register { email, password, first_name, last_name, phone, city, area, provider, service_category } => {
            let input = RegisterInput {
                email,
                password,
                first_name,
                last_name,
                user_type: Some(if provider { UserType::Provider } else { UserType::Customer }),
                phone,
                city,
                area,
                service_category,
                ..RegisterInput::default()
            };
            match controller.register(input).await? {
                RegisterOutcome::Authenticated(outcome) => {
                    eprintln!("signed in as {}", outcome.user.display_name());
                    print_json(&json!({ "user": outcome.user, "destination": outcome.destination }))
                }
                RegisterOutcome::PendingLogin { message } => {
                    println!("{message}");
                    Ok(())
                }
            }
        }
        Command::Logout => {
            controller.logout();
            println!("signed out");
            Ok(())
        }
        Command::Whoami => {
            controller.bootstrap().await;
            let user = controller.snapshot().user.ok_or(CliError::NotSignedIn)?;
            print_json(&serde_json::to_value(user)?)
        }
        Command::UpdateProfile { patch } => {
            let Value::Object(patch) = serde_json::from_str::<Value>(&patch)? else {
                return Err(CliError::PatchNotObject);
            };
            let patch: ProfileUpdate = patch;
            controller.bootstrap().await;
            let user = controller.update_profile(&patch).await?;
            print_json(&serde_json::to_value(user)?)
        }
        Command::Guard { path } => {
            controller.bootstrap().await;
            match evaluate(&path, &controller.snapshot()) {
                GuardDecision::Allow => println!("allow"),
                GuardDecision::Pending => println!("pending"),
                GuardDecision::Redirect(to) => println!("redirect {to}"),
            }
            Ok(())
        }
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
