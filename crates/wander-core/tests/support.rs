//! Shared fixtures for the networked integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use wander_core::client::ApiClient;
use wander_core::config::Config;
use wander_core::credentials::CredentialStore;
use wander_core::router::Navigator;
use wander_core::session::SessionManager;
use wiremock::MockServer;

/// Navigator that records pushes instead of rendering anything.
pub struct RecordingNavigator {
    current: Mutex<String>,
    pushes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new(initial: &str) -> Self {
        Self {
            current: Mutex::new(initial.to_string()),
            pushes: Mutex::new(Vec::new()),
        }
    }

    pub fn pushes(&self) -> Vec<String> {
        self.pushes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.current.lock().unwrap().clone()
    }

    fn push(&self, path: &str) {
        self.pushes.lock().unwrap().push(path.to_string());
        *self.current.lock().unwrap() = path.to_string();
    }
}

/// A fully wired client against a mock server and a temp store.
pub struct TestApp {
    pub server: MockServer,
    pub client: Arc<ApiClient>,
    pub session: Arc<SessionManager>,
    pub store: CredentialStore,
    pub navigator: Arc<RecordingNavigator>,
    _home: TempDir,
}

pub async fn test_app() -> TestApp {
    let server = MockServer::start().await;
    let home = TempDir::new().expect("create temp wander home");
    let store = CredentialStore::open(home.path().join("store.json")).expect("open store");
    let session = Arc::new(SessionManager::new(Duration::from_millis(5000)));
    let navigator = Arc::new(RecordingNavigator::new("/"));

    let config = Config {
        base_url: server.uri(),
        ..Config::default()
    };
    let client = Arc::new(ApiClient::new(
        &config,
        store.clone(),
        Arc::clone(&session),
        Arc::clone(&navigator) as Arc<dyn Navigator>,
    ));

    TestApp {
        server,
        client,
        session,
        store,
        navigator,
        _home: home,
    }
}

pub fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}
