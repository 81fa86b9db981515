use std::str::FromStr;

use layouts_core::locale::is_valid_locale;

use crate::error::{EngineError, EngineResult};

/// Engine configuration loaded from environment variables.
///
/// All fields have defaults suitable for local use; the database file is
/// created next to the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// SQLite connection URL.
    pub database_url: String,
    /// Upper bound of the connection pool.
    pub max_connections: u32,
    /// Apply the embedded migrations on startup.
    pub run_migrations: bool,
    /// Main locale of layouts created without an explicit one.
    pub default_locale: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://layouts.db?mode=rwc".to_string(),
            max_connections: 5,
            run_migrations: true,
            default_locale: "en".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                        |
    /// |----------------------|--------------------------------|
    /// | `DATABASE_URL`       | `sqlite://layouts.db?mode=rwc` |
    /// | `DB_MAX_CONNECTIONS` | `5`                            |
    /// | `RUN_MIGRATIONS`     | `true`                         |
    /// | `DEFAULT_LOCALE`     | `en`                           |
    pub fn from_env() -> EngineResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`EngineConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> EngineResult<Self> {
        let defaults = Self::default();

        let database_url = lookup("DATABASE_URL").unwrap_or(defaults.database_url);
        let max_connections = parse_or("DB_MAX_CONNECTIONS", &lookup, defaults.max_connections)?;
        if max_connections == 0 {
            return Err(EngineError::Config(
                "DB_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }
        let run_migrations = parse_or("RUN_MIGRATIONS", &lookup, defaults.run_migrations)?;

        let default_locale = lookup("DEFAULT_LOCALE").unwrap_or(defaults.default_locale);
        if !is_valid_locale(&default_locale) {
            return Err(EngineError::Config(format!(
                "DEFAULT_LOCALE \"{default_locale}\" is not a valid locale"
            )));
        }

        Ok(Self {
            database_url,
            max_connections,
            run_migrations,
            default_locale,
        })
    }
}

fn parse_or<T: FromStr>(
    name: &str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> EngineResult<T> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| EngineError::Config(format!("{name} has an invalid value \"{raw}\""))),
    }
}
