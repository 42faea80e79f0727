//! CLI entry and dispatch.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use wander_core::client::ApiClient;
use wander_core::config::Config;
use wander_core::credentials::CredentialStore;
use wander_core::dashboard::DashboardCache;
use wander_core::router::{HOME_PATH, Navigator};
use wander_core::session::SessionManager;

mod commands;

#[derive(Parser)]
#[command(name = "wander")]
#[command(version)]
#[command(about = "Terminal client for the WanderApp trip log")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Log in and store the token pair
    Login {
        /// Account username
        #[arg(short, long)]
        username: String,

        /// Account password
        #[arg(short, long, env = "WANDER_PASSWORD")]
        password: String,
    },

    /// Log out and clear stored credentials
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Fetch the dashboard overview
    Dashboard {
        /// Another user's id (defaults to your own dashboard)
        #[arg(long)]
        user: Option<u64>,

        /// Restrict to a single year
        #[arg(long)]
        year: Option<i32>,
    },

    /// Show or change the selected trip tab
    Tab {
        /// New tab (HIKING or SURFING); prints the current tab when omitted
        tab: Option<String>,
    },
}

/// Navigator for a terminal session: there is no page to render, so route
/// changes are tracked and logged.
struct CliNavigator {
    current: Mutex<String>,
}

impl CliNavigator {
    fn new() -> Self {
        Self {
            current: Mutex::new(HOME_PATH.to_string()),
        }
    }
}

impl Navigator for CliNavigator {
    fn current_path(&self) -> String {
        self.current.lock().unwrap().clone()
    }

    fn push(&self, path: &str) {
        tracing::info!(%path, "navigating");
        *self.current.lock().unwrap() = path.to_string();
    }
}

/// Everything a command handler needs, wired once per invocation.
pub(crate) struct App {
    pub client: ApiClient,
    pub session: Arc<SessionManager>,
    pub store: CredentialStore,
    pub dashboard: DashboardCache,
}

fn build_app() -> Result<App> {
    let config = Config::load().context("load config")?;
    let store = CredentialStore::open_default().context("open credential store")?;
    let session = Arc::new(SessionManager::new(config.message_duration()));
    let navigator: Arc<dyn Navigator> = Arc::new(CliNavigator::new());
    let client = ApiClient::new(&config, store.clone(), Arc::clone(&session), navigator);

    Ok(App {
        client,
        session,
        store,
        dashboard: DashboardCache::new(),
    })
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let app = build_app()?;

    match cli.command {
        Commands::Login { username, password } => {
            commands::login(&app, &username, &password).await
        }
        Commands::Logout => commands::logout(&app).await,
        Commands::Whoami => commands::whoami(&app).await,
        Commands::Dashboard { user, year } => commands::dashboard(&app, user, year).await,
        Commands::Tab { tab } => commands::tab(&app, tab.as_deref()),
    }
}
