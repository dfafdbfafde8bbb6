use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    pub db_password: String,
    pub db_name: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database: {}@{}:{}/{}",
            config.db_user,
            config.db_host,
            config.db_port,
            config.db_name
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> anyhow::Result<String> {
            let value = lookup(key)
                .ok_or_else(|| anyhow::anyhow!("{} environment variable required", key))?;
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", key);
            }
            Ok(value)
        };

        let port_or = |key: &str, default: u16| -> anyhow::Result<u16> {
            match lookup(key) {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    anyhow::anyhow!("{} must be a valid number between 1-65535", key)
                }),
                None => Ok(default),
            }
        };

        Ok(Self {
            db_host: required("DB_HOST")?,
            db_port: port_or("DB_PORT", DEFAULT_DB_PORT)?,
            db_user: required("DB_USER")?,
            db_password: lookup("DB_PASSWORD")
                .ok_or_else(|| anyhow::anyhow!("DB_PASSWORD environment variable required"))?,
            db_name: required("DB_NAME")?,
            port: port_or("PORT", DEFAULT_PORT)?,
        })
    }

    /// Postgres connection options assembled from the individual settings.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.db_host)
            .port(self.db_port)
            .username(&self.db_user)
            .password(&self.db_password)
            .database(&self.db_name)
    }
}
