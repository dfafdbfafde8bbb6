//! Data access for `usuarios` and `enderecos`.
//!
//! Every statement is parameterized and every call reports its outcome to
//! [`Metrics`].
use crate::errors::{AppError, ResultExt};
use crate::metrics::Metrics;
use crate::models::{Address, NewAddress, NewUser, User, UserChanges};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

const USERS_TABLE: &str = "usuarios";
const ADDRESSES_TABLE: &str = "enderecos";

/// Runs a statement, logging its duration and recording metrics.
///
/// `db_operations_total` counts successes only; `user_operations_total`
/// counts both outcomes for the users table.
async fn track<T, F>(
    metrics: &Metrics,
    table: &'static str,
    operation: &'static str,
    statement: F,
) -> Result<T, sqlx::Error>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let start = Instant::now();
    let result = statement.await;
    let elapsed = start.elapsed();

    match &result {
        Ok(_) => {
            tracing::debug!("{} {} completed in {:?}", operation, table, elapsed);
            metrics.record_db_operation(operation, table);
        }
        Err(e) => {
            tracing::warn!("{} {} failed after {:?}: {}", operation, table, elapsed, e);
        }
    }
    if table == USERS_TABLE {
        metrics.record_user_operation(operation, result.is_ok());
    }

    result
}

/// Translates write failures.
///
/// Unique violations become `Conflict` with the constraint name. The only
/// foreign key is `enderecos.usuario_id`, so a violation means the owner is
/// gone. Any other error raised by the engine is a data problem and becomes
/// `BadRequest`. Pool and transport errors stay `DatabaseError`.
fn map_write_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_foreign_key_violation() {
            return AppError::NotFound("user not found".to_string());
        }
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().unwrap_or("unique constraint");
            return AppError::Conflict(constraint.to_string());
        }
        return AppError::BadRequest(db_err.message().to_string());
    }
    AppError::DatabaseError(err)
}

/// Builds the partial `UPDATE` for a user.
///
/// Only supplied fields appear in the `SET` clause, followed by
/// `updated_at = CURRENT_TIMESTAMP`. An empty change set is rejected.
pub fn build_user_update(
    id: i32,
    changes: &UserChanges,
) -> Result<QueryBuilder<'static, Postgres>, AppError> {
    if changes.is_empty() {
        return Err(AppError::BadRequest(
            "no fields supplied for update".to_string(),
        ));
    }

    let mut query = QueryBuilder::new("UPDATE usuarios SET ");
    {
        let mut set = query.separated(", ");

        if let Some(ref nome) = changes.nome {
            set.push("nome = ").push_bind_unseparated(nome.clone());
        }
        if let Some(ref cpf) = changes.cpf {
            set.push("cpf = ").push_bind_unseparated(cpf.clone());
        }
        if let Some(ref email) = changes.email {
            set.push("email = ").push_bind_unseparated(email.clone());
        }
        if let Some(data_nascimento) = changes.data_nascimento {
            set.push("data_nascimento = ")
                .push_bind_unseparated(data_nascimento);
        }
        set.push("updated_at = CURRENT_TIMESTAMP");
    }

    query.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

    Ok(query)
}

/// Database storage for users
pub struct UserStorage {
    pool: PgPool,
    metrics: Arc<Metrics>,
}

impl UserStorage {
    pub fn new(pool: PgPool, metrics: Arc<Metrics>) -> Self {
        Self { pool, metrics }
    }

    /// Inserts a user and returns the stored row.
    pub async fn create(&self, user: &NewUser) -> Result<User, AppError> {
        let statement = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO usuarios (nome, cpf, email, data_nascimento)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&user.nome)
        .bind(&user.cpf)
        .bind(&user.email)
        .bind(user.data_nascimento)
        .fetch_one(&self.pool);

        track(&self.metrics, USERS_TABLE, "create", statement)
            .await
            .map_err(map_write_error)
    }

    /// All users ordered by id.
    pub async fn list(&self) -> Result<Vec<User>, AppError> {
        let statement =
            sqlx::query_as::<_, User>("SELECT * FROM usuarios ORDER BY id ASC").fetch_all(&self.pool);

        track(&self.metrics, USERS_TABLE, "read", statement)
            .await
            .context("listing users")
    }

    /// Applies a partial update. `Ok(None)` means no user has that id.
    pub async fn update(&self, id: i32, changes: &UserChanges) -> Result<Option<User>, AppError> {
        let mut query = build_user_update(id, changes)?;
        let statement = query.build_query_as::<User>().fetch_optional(&self.pool);

        track(&self.metrics, USERS_TABLE, "update", statement)
            .await
            .map_err(map_write_error)
    }

    /// Deletes a user (addresses cascade). Returns the affected row count.
    pub async fn delete(&self, id: i32) -> Result<u64, AppError> {
        let statement = sqlx::query("DELETE FROM usuarios WHERE id = $1")
            .bind(id)
            .execute(&self.pool);

        let result = track(&self.metrics, USERS_TABLE, "delete", statement)
            .await
            .with_context(|| format!("deleting user {}", id))?;

        Ok(result.rows_affected())
    }

    pub async fn exists(&self, id: i32) -> Result<bool, AppError> {
        let statement = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM usuarios WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool);

        track(&self.metrics, USERS_TABLE, "read", statement)
            .await
            .with_context(|| format!("checking user {}", id))
    }
}

/// Database storage for addresses, always scoped to the owning user
pub struct AddressStorage {
    pool: PgPool,
    metrics: Arc<Metrics>,
}

impl AddressStorage {
    pub fn new(pool: PgPool, metrics: Arc<Metrics>) -> Self {
        Self { pool, metrics }
    }

    /// Inserts an address for `usuario_id`. The caller checks the user exists.
    pub async fn create(&self, usuario_id: i32, address: &NewAddress) -> Result<Address, AppError> {
        let statement = sqlx::query_as::<_, Address>(
            r#"
            INSERT INTO enderecos
                (usuario_id, cep, logradouro, numero, complemento, bairro, cidade, estado)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(usuario_id)
        .bind(&address.cep)
        .bind(&address.logradouro)
        .bind(&address.numero)
        .bind(&address.complemento)
        .bind(&address.bairro)
        .bind(&address.cidade)
        .bind(&address.estado)
        .fetch_one(&self.pool);

        track(&self.metrics, ADDRESSES_TABLE, "create", statement)
            .await
            .map_err(map_write_error)
    }

    pub async fn list(&self, usuario_id: i32) -> Result<Vec<Address>, AppError> {
        let statement = sqlx::query_as::<_, Address>(
            "SELECT * FROM enderecos WHERE usuario_id = $1 ORDER BY id ASC",
        )
        .bind(usuario_id)
        .fetch_all(&self.pool);

        track(&self.metrics, ADDRESSES_TABLE, "read", statement)
            .await
            .with_context(|| format!("listing addresses of user {}", usuario_id))
    }

    pub async fn find(&self, usuario_id: i32, endereco_id: i32) -> Result<Option<Address>, AppError> {
        let statement = sqlx::query_as::<_, Address>(
            "SELECT * FROM enderecos WHERE id = $1 AND usuario_id = $2",
        )
        .bind(endereco_id)
        .bind(usuario_id)
        .fetch_optional(&self.pool);

        track(&self.metrics, ADDRESSES_TABLE, "read", statement)
            .await
            .with_context(|| format!("loading address {} of user {}", endereco_id, usuario_id))
    }

    /// Replaces an owned address. `Ok(None)` means it does not belong to the user.
    pub async fn update(
        &self,
        usuario_id: i32,
        endereco_id: i32,
        address: &NewAddress,
    ) -> Result<Option<Address>, AppError> {
        let statement = sqlx::query_as::<_, Address>(
            r#"
            UPDATE enderecos
            SET cep = $1,
                logradouro = $2,
                numero = $3,
                complemento = $4,
                bairro = $5,
                cidade = $6,
                estado = $7,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $8 AND usuario_id = $9
            RETURNING *
            "#,
        )
        .bind(&address.cep)
        .bind(&address.logradouro)
        .bind(&address.numero)
        .bind(&address.complemento)
        .bind(&address.bairro)
        .bind(&address.cidade)
        .bind(&address.estado)
        .bind(endereco_id)
        .bind(usuario_id)
        .fetch_optional(&self.pool);

        track(&self.metrics, ADDRESSES_TABLE, "update", statement)
            .await
            .map_err(map_write_error)
    }

    /// Deletes an owned address. Returns the affected row count.
    pub async fn delete(&self, usuario_id: i32, endereco_id: i32) -> Result<u64, AppError> {
        let statement = sqlx::query("DELETE FROM enderecos WHERE id = $1 AND usuario_id = $2")
            .bind(endereco_id)
            .bind(usuario_id)
            .execute(&self.pool);

        let result = track(&self.metrics, ADDRESSES_TABLE, "delete", statement)
            .await
            .with_context(|| format!("deleting address {} of user {}", endereco_id, usuario_id))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::fmt;

    #[test]
    fn test_update_touches_only_supplied_fields() {
        let changes = UserChanges {
            email: Some("novo@example.com".into()),
            ..Default::default()
        };

        let query = build_user_update(7, &changes).unwrap();
        assert_eq!(
            query.sql(),
            "UPDATE usuarios SET email = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *"
        );
    }

    #[test]
    fn test_update_keeps_column_order() {
        let changes = UserChanges {
            nome: Some("Ana".into()),
            cpf: Some("11144477735".into()),
            email: Some("ana@example.com".into()),
            data_nascimento: NaiveDate::from_ymd_opt(1985, 3, 9),
        };

        let query = build_user_update(1, &changes).unwrap();
        assert_eq!(
            query.sql(),
            "UPDATE usuarios SET nome = $1, cpf = $2, email = $3, data_nascimento = $4, \
             updated_at = CURRENT_TIMESTAMP WHERE id = $5 RETURNING *"
        );
    }

    #[test]
    fn test_empty_update_rejected() {
        match build_user_update(1, &UserChanges::default()) {
            Err(AppError::BadRequest(msg)) => assert_eq!(msg, "no fields supplied for update"),
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("empty update must be rejected"),
        }
    }

    /// Minimal engine error carrying a kind and an optional constraint.
    #[derive(Debug)]
    struct EngineError {
        kind: ErrorKind,
        constraint: Option<&'static str>,
    }

    impl fmt::Display for EngineError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "engine error: {:?}", self.kind)
        }
    }

    impl std::error::Error for EngineError {}

    impl DatabaseError for EngineError {
        fn message(&self) -> &str {
            "value too long for type character varying(2)"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn constraint(&self) -> Option<&str> {
            self.constraint
        }

        fn kind(&self) -> ErrorKind {
            match self.kind {
                ErrorKind::UniqueViolation => ErrorKind::UniqueViolation,
                ErrorKind::ForeignKeyViolation => ErrorKind::ForeignKeyViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    fn engine_error(kind: ErrorKind, constraint: Option<&'static str>) -> sqlx::Error {
        sqlx::Error::Database(Box::new(EngineError { kind, constraint }))
    }

    #[test]
    fn test_missing_owner_is_not_found() {
        let err = map_write_error(engine_error(
            ErrorKind::ForeignKeyViolation,
            Some("enderecos_usuario_id_fkey"),
        ));
        match err {
            AppError::NotFound(msg) => assert_eq!(msg, "user not found"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unique_violation_names_constraint() {
        let err = map_write_error(engine_error(
            ErrorKind::UniqueViolation,
            Some("usuarios_cpf_key"),
        ));
        match err {
            AppError::Conflict(constraint) => assert_eq!(constraint, "usuarios_cpf_key"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_other_engine_errors_are_bad_request() {
        let err = map_write_error(engine_error(ErrorKind::Other, None));
        match err {
            AppError::BadRequest(msg) => {
                assert_eq!(msg, "value too long for type character varying(2)")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_pool_errors_stay_internal() {
        let err = map_write_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AppError::DatabaseError(_)));
    }
}
