use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::time::Duration;

const MAX_CONNECTIONS: u32 = 20;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Startup connection attempts before giving up.
pub const CONNECT_RETRIES: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_secs(1);

const CREATE_USUARIOS: &str = r#"
    CREATE TABLE IF NOT EXISTS usuarios (
        id SERIAL PRIMARY KEY,
        nome VARCHAR(100) NOT NULL,
        cpf VARCHAR(11) UNIQUE NOT NULL,
        email VARCHAR(100) UNIQUE NOT NULL,
        data_nascimento DATE NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
"#;

const CREATE_ENDERECOS: &str = r#"
    CREATE TABLE IF NOT EXISTS enderecos (
        id SERIAL PRIMARY KEY,
        usuario_id INTEGER NOT NULL REFERENCES usuarios(id) ON DELETE CASCADE,
        cep VARCHAR(9) NOT NULL,
        logradouro VARCHAR(100),
        numero VARCHAR(10) NOT NULL,
        complemento VARCHAR(100),
        bairro VARCHAR(50),
        cidade VARCHAR(50),
        estado VARCHAR(2),
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
"#;

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    /// Pool settings shared by the server and the tests.
    pub fn pool_options() -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(IDLE_TIMEOUT)
    }

    /// Connects and bootstraps the schema, retrying with a fixed delay.
    ///
    /// This is the only retry in the service; request handling never retries.
    pub async fn new(options: PgConnectOptions) -> anyhow::Result<Self> {
        let mut attempt = 1;
        loop {
            match Self::try_connect(options.clone()).await {
                Ok(pool) => {
                    tracing::info!("Database connected and tables verified");
                    return Ok(Self { pool });
                }
                Err(e) if attempt < CONNECT_RETRIES => {
                    tracing::warn!(
                        "Database connection attempt {}/{} failed: {}",
                        attempt,
                        CONNECT_RETRIES,
                        e
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "Database connection attempt {}/{} failed: {}",
                        attempt,
                        CONNECT_RETRIES,
                        e
                    );
                    return Err(anyhow::anyhow!(e).context(format!(
                        "could not connect to database after {} attempts",
                        CONNECT_RETRIES
                    )));
                }
            }
        }
    }

    async fn try_connect(options: PgConnectOptions) -> Result<PgPool, sqlx::Error> {
        let pool = Self::pool_options().connect_with(options).await?;
        ensure_schema(&pool).await?;
        Ok(pool)
    }
}

/// Creates `usuarios` and `enderecos` when missing. Safe to run repeatedly.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_USUARIOS).execute(pool).await?;
    sqlx::query(CREATE_ENDERECOS).execute(pool).await?;
    Ok(())
}
