use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

use rbac_authz::config::AuthzConfig;
use rbac_authz::db;
use rbac_authz::models::{Attributes, Fixture, User};
use rbac_authz::store::{Context, SqliteStore};
use rbac_authz::{AuthzError, AuthzResult, Decision, RbacAuthorizer, StoreError};

const EXIT_DENIED: u8 = 1;
const EXIT_INVALID_REQUEST: u8 = 2;
const EXIT_STORE_FAILURE: u8 = 3;
const EXIT_TIMED_OUT: u8 = 4;

#[derive(Parser, Debug)]
#[command(author, version, about = "RBAC authorization tool", long_about = None)]
struct Cli {
    /// Overrides DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    Migrate,
    /// Load roles and bindings from a JSON fixture
    Seed {
        #[arg(long)]
        file: PathBuf,
    },
    /// Decide a single request; exits 0 when allowed, 1 when denied,
    /// 2 on a malformed request, 3 on a store failure and 4 on timeout
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct CheckArgs {
    #[arg(long)]
    user: String,
    #[arg(long = "group")]
    groups: Vec<String>,
    #[arg(long)]
    verb: String,
    #[arg(long)]
    resource: String,
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long, default_value = "")]
    namespace: String,
    #[arg(long, default_value = "")]
    api_group: String,
    #[arg(long, default_value = "")]
    api_version: String,
    /// Print the full decision trace as JSON
    #[arg(long)]
    trace: bool,
}

impl CheckArgs {
    fn attributes(&self) -> Attributes {
        Attributes::new(&self.verb, &self.resource)
            .with_user(User::new(&self.user).with_groups(self.groups.iter().cloned()))
            .with_resource_name(&self.name)
            .with_namespace(&self.namespace)
            .with_api(&self.api_group, &self.api_version)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    load_env();
    init_tracing();

    let cli = Cli::parse();

    let mut config = AuthzConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config = config.with_database_url(url);
    }

    let pool = db::init(&config).await?;

    match cli.command {
        Commands::Migrate => {
            db::migrate(&pool).await?;
            println!("Migrations applied");
        }
        Commands::Seed { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read fixture {}", file.display()))?;
            let fixture = Fixture::from_json(&raw)
                .with_context(|| format!("invalid fixture {}", file.display()))?;

            db::migrate(&pool).await?;
            SqliteStore::new(pool).load(&fixture).await?;
            println!("Seeded {}", file.display());
        }
        Commands::Check(args) => {
            let authorizer = RbacAuthorizer::new(Arc::new(SqliteStore::new(pool)));
            let ctx = Context::new().with_timeout(config.store_timeout);

            let result = authorizer.authorize_with_trace(&ctx, &args.attributes()).await;
            match &result {
                Ok(decision) if args.trace => println!("{}", serde_json::to_string_pretty(decision)?),
                Ok(decision) => println!("{}", if decision.allowed { "allowed" } else { "denied" }),
                Err(err) => {
                    tracing::error!(kind = err.kind(), error = %err, "authorization check failed");
                    eprintln!("Error: {err}");
                }
            }

            return Ok(ExitCode::from(exit_status(&result)));
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Maps a check result to the process exit status.
fn exit_status(result: &AuthzResult<Decision>) -> u8 {
    let err = match result {
        Ok(decision) if decision.allowed => return 0,
        Ok(_) => return EXIT_DENIED,
        Err(err) => err,
    };

    match err.as_store_error() {
        Some(StoreError::Cancelled | StoreError::DeadlineExceeded) => EXIT_TIMED_OUT,
        Some(_) => EXIT_STORE_FAILURE,
        None if matches!(err, AuthzError::InvalidArgument(_)) => EXIT_INVALID_REQUEST,
        None => EXIT_STORE_FAILURE,
    }
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
