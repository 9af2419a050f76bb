use anyhow::Context;
use clap::{Parser, Subcommand};
use link_auth::JwtAuthenticator;
use link_config::{load as load_config, AppConfig};
use link_database::{
    initialize_database, ChatRoomRepository, NewUser, OrganizationRepository, UserRole,
};
use link_gateway::create_router;
use link_runtime::{telemetry, BackendServices};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "link-server")]
#[command(about = "Link corporate social backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server (default)
    Serve {
        /// Overrides `http.port`
        #[arg(long)]
        port: Option<u16>,
    },
    /// Apply database migrations and exit
    Migrate,
    /// Print a signed bearer token for a user
    IssueToken {
        #[arg(long)]
        user_id: i64,
        /// Lifetime in seconds; defaults to `auth.token_ttl_seconds`
        #[arg(long)]
        ttl: Option<i64>,
    },
    /// Create a demo company, department, chat room and users, printing a token for each user
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(error) = telemetry::init_tracing() {
        eprintln!("{error:#}");
    }

    let config = load_config().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => run_server(config, port).await,
        Commands::Migrate => migrate(&config).await,
        Commands::IssueToken { user_id, ttl } => issue_token(&config, user_id, ttl),
        Commands::Seed => seed(&config).await,
    }
}

async fn run_server(config: AppConfig, port: Option<u16>) -> anyhow::Result<()> {
    info!("starting Link backend");

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let relay = match services.spawn_relay().await {
        Ok(handle) => Some(handle),
        Err(error) => {
            warn!(error = %format!("{error:#}"), "running without the notification relay");
            None
        }
    };

    let app = create_router(services.gateway_state());

    let address = format!(
        "{}:{}",
        config.http.address,
        port.unwrap_or(config.http.port)
    );
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(link_runtime::shutdown_signal())
        .await
        .context("http server error")?;

    if let Some(relay) = relay {
        relay.abort();
    }
    services.users.wait_idle().await;
    info!("backend shut down");
    Ok(())
}

async fn migrate(config: &AppConfig) -> anyhow::Result<()> {
    initialize_database(&config.database)
        .await
        .context("failed to migrate database")?;
    info!(url = %config.database.url, "database is up to date");
    Ok(())
}

fn issue_token(config: &AppConfig, user_id: i64, ttl: Option<i64>) -> anyhow::Result<()> {
    let authenticator = JwtAuthenticator::new(&config.auth);
    let token = match ttl {
        Some(ttl) => authenticator.issue_token_with_ttl(user_id, ttl),
        None => authenticator.issue_token(user_id),
    }
    .context("failed to issue token")?;

    println!("{token}");
    Ok(())
}

async fn seed(config: &AppConfig) -> anyhow::Result<()> {
    let services = BackendServices::initialise(config)
        .await
        .context("failed to initialise backend services")?;

    let organizations = OrganizationRepository::new(services.db_pool.clone());
    let company = organizations
        .create_company("Acme")
        .await
        .context("failed to create demo company")?;
    let department = organizations
        .create_department(company.id, "Research")
        .await
        .context("failed to create demo department")?;
    let room = ChatRoomRepository::new(services.db_pool.clone())
        .create("acme-general", Some(company.id))
        .await
        .context("failed to create demo chat room")?;

    let people = [
        ("Mina Manager", "mina@acme.test", UserRole::CompanyManager, Some(company.id)),
        ("Eli Employee", "eli@acme.test", UserRole::User, Some(company.id)),
        ("Nora Newcomer", "nora@example.test", UserRole::User, None),
    ];

    println!(
        "company {} ({}), department {} ({}), room {}",
        company.id, company.name, department.id, department.name, room.id
    );
    for (name, email, role, company_id) in people {
        let mut user = NewUser::basic(name, email, role);
        user.company_id = company_id;
        let user = services
            .users
            .create(&user)
            .await
            .with_context(|| format!("failed to create {email}"))?;
        let token = services
            .authenticator
            .issue_token(user.id)
            .context("failed to issue token")?;
        println!("user {} {} [{}]\n  token: {token}", user.id, user.name, user.role.as_str());
    }

    services.users.wait_idle().await;
    Ok(())
}
