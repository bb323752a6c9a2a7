pub mod auth;
pub mod db;
pub mod error;
pub mod session;
pub mod settings;
pub mod store;
pub mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};

use auth::{IdentityProvider, LocalAuth};
use db::Database;
use session::{RunSessionController, SessionConfig};
use settings::SettingsStore;
use store::SqliteRunStore;

pub use error::{Operation, OperationError, RunError};
pub use utils::logging::{debug_from_env, init_logging};

const DATA_DIR_ENV: &str = "RUNTRACK_DATA_DIR";
const DB_FILE: &str = "runtrack.sqlite3";
const SETTINGS_FILE: &str = "settings.json";

/// `RUNTRACK_DATA_DIR`, else the platform data directory plus `runtrack`.
pub fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|dir| dir.join("runtrack"))
        .ok_or_else(|| anyhow!("no platform data directory; set {DATA_DIR_ENV}"))
}

/// The wired-up collaborators of one application instance.
pub struct App {
    pub db: Database,
    pub auth: Arc<LocalAuth>,
    pub store: Arc<SqliteRunStore>,
    pub settings: SettingsStore,
}

impl App {
    pub fn open(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db = Database::new(data_dir.join(DB_FILE))?;
        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;

        Ok(Self {
            auth: Arc::new(LocalAuth::new(db.clone())),
            store: Arc::new(SqliteRunStore::new(db.clone())),
            db,
            settings,
        })
    }

    /// Starts a session for whoever is signed in right now.
    pub fn start_session(&self) -> RunSessionController {
        let identity: Arc<dyn IdentityProvider> = self.auth.clone();
        RunSessionController::spawn(
            self.store.clone(),
            identity,
            SessionConfig::from(&self.settings.get()),
        )
    }
}
