use std::path::PathBuf;

use anyhow::Result;
use task_domain::after_save::DEFAULT_COMPLETED_TITLE_FORMAT;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub google_tasks_sync: bool,
    pub caldav_sync: bool,
    pub fixture: Option<PathBuf>,
    pub script: Option<PathBuf>,
    pub completed_title_format: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_vars(|key| std::env::var(key).ok()))
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = lookup("TASKS_GOOGLE_TASKS_SYNC") {
            config.google_tasks_sync = parse_flag("TASKS_GOOGLE_TASKS_SYNC", &value);
        }
        if let Some(value) = lookup("TASKS_CALDAV_SYNC") {
            config.caldav_sync = parse_flag("TASKS_CALDAV_SYNC", &value);
        }
        if let Some(path) = lookup("TASKS_FIXTURE").filter(|path| !path.trim().is_empty()) {
            info!(%path, "using store fixture");
            config.fixture = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("TASKS_SCRIPT").filter(|path| !path.trim().is_empty()) {
            config.script = Some(PathBuf::from(path));
        }
        if let Some(format) = lookup("TASKS_COMPLETED_TITLE_FORMAT") {
            if format.contains("{title}") {
                config.completed_title_format = format;
            } else {
                warn!(%format, "completed title format lacks {{title}}, keeping default");
            }
        }
        config
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            google_tasks_sync: false,
            caldav_sync: false,
            fixture: None,
            script: None,
            completed_title_format: DEFAULT_COMPLETED_TITLE_FORMAT.to_string(),
        }
    }
}

fn parse_flag(key: &str, value: &str) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        other => {
            warn!(key, value = other, "unrecognised boolean, treating as false");
            false
        }
    }
}
