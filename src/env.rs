use std::path::Path;

use rocket::figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://timetable.db?mode=rwc";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl AppConfig {
    /// Defaults, then `Rocket.toml` / `ROCKET_*`, then a bare `DATABASE_URL`,
    /// then `TIMETABLE_*` variables. Later sources win.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(rocket::Config::figment())
            .merge(Env::raw().only(&["database_url"]))
            .merge(Env::prefixed("TIMETABLE_"))
    }

    pub fn load() -> Result<Self, rocket::figment::Error> {
        Self::figment().extract()
    }
}

/// Env files for a Rocket profile, in load order. Later files override
/// earlier ones; `.secrets.env` is never committed.
pub fn env_files_for(profile: &str) -> [&'static str; 3] {
    match profile {
        "production" | "release" => ["config/common.env", "config/prod.env", ".secrets.env"],
        _ => ["config/common.env", "config/dev.env", ".secrets.env"],
    }
}

/// Which env files `load_environment` applied. Log it after `init_tracing`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadedEnv {
    pub profile: String,
    pub loaded: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
}

impl LoadedEnv {
    pub fn log(&self) {
        for path in &self.loaded {
            info!(path, profile = %self.profile, "Loaded environment file");
        }
        for path in &self.skipped {
            warn!(path, profile = %self.profile, "Environment file not found, skipped");
        }
    }
}

/// Loads the env files for `ROCKET_PROFILE` (development when unset) into the
/// process environment. Missing files are skipped.
pub fn load_environment() -> Result<LoadedEnv, dotenvy::Error> {
    let profile = dotenvy::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());
    let mut report = LoadedEnv {
        profile: profile.clone(),
        ..LoadedEnv::default()
    };

    for env_file in env_files_for(&profile) {
        if load_env_file(env_file)? {
            report.loaded.push(env_file);
        } else {
            report.skipped.push(env_file);
        }
    }

    Ok(report)
}

fn load_env_file(path: &str) -> Result<bool, dotenvy::Error> {
    if !Path::new(path).exists() {
        return Ok(false);
    }

    dotenvy::from_filename_override(path)?;
    Ok(true)
}
