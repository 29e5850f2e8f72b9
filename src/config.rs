use crate::dashboard::{DashboardRequest, DEFAULT_TOP_N};
use crate::error::{DashboardError, Result};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_DATA_PATH: &str = "Sample - Superstore.xlsx";

pub const ENV_DATA_PATH: &str = "DASHBOARD_DATA_PATH";
pub const ENV_SHEET: &str = "DASHBOARD_SHEET";
pub const ENV_TOP_N: &str = "DASHBOARD_TOP_N";

/// Process-level defaults. CLI flags override these.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data_path: PathBuf,
    pub sheet: Option<String>,
    pub top_n: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            sheet: None,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl Settings {
    /// Reads `.env` (if any) and then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        if let Some(path) = lookup(ENV_DATA_PATH).filter(|v| !v.trim().is_empty()) {
            settings.data_path = PathBuf::from(path);
        }
        settings.sheet = lookup(ENV_SHEET).filter(|v| !v.trim().is_empty());
        if let Some(raw) = lookup(ENV_TOP_N) {
            settings.top_n = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    DashboardError::Config(format!(
                        "{} must be a positive integer, got '{}'",
                        ENV_TOP_N, raw
                    ))
                })?;
        }
        debug!("Settings: {:?}", settings);
        Ok(settings)
    }
}

/// Loads a saved filter preset. Fields missing from the file keep their defaults.
pub fn load_preset(path: &Path) -> Result<DashboardRequest> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DashboardError::Config(format!("cannot read preset {}: {}", path.display(), e))
    })?;
    let request: DashboardRequest = serde_json::from_str(&content)?;
    info!("Loaded filter preset from {}", path.display());
    Ok(request)
}
