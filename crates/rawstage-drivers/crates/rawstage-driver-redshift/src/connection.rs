//! Redshift connection over the Postgres wire protocol

use crate::tls::RedshiftTlsConnector;
use async_trait::async_trait;
use bytes::BytesMut;
use rawstage_core::{
    ColumnMeta, Connection, ConnectionConfig, QueryResult, RawstageError, Result, Row,
    StatementResult, TlsMode, Transaction, Value,
};
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_postgres::{
    Client, NoTls, Row as PgRow, Statement,
    config::SslMode,
    types::{FromSql, ToSql, Type},
};

pub(crate) const DEFAULT_PORT: u16 = 5439;

/// Runtime that owns the tokio-postgres connection tasks.
///
/// Connections outlive whichever runtime the caller happens to connect from,
/// so the background I/O task is spawned here instead.
fn get_redshift_runtime() -> &'static tokio::runtime::Runtime {
    static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .thread_name("rawstage-redshift-runtime")
            .build()
            .expect("Failed to create Tokio runtime for Redshift driver")
    })
}

pub(crate) fn format_redshift_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let code = db_error.code();
    let mut message = db_error.message().to_string();

    if let Some(detail) = db_error.detail()
        && !detail.trim().is_empty()
    {
        message.push_str(&format!(" (detail: {})", detail));
    }

    if let Some(hint) = db_error.hint()
        && !hint.trim().is_empty()
    {
        message.push_str(&format!(" (hint: {})", hint));
    }

    match code.code() {
        "23505" => format!("duplicate value violates unique constraint: {}", message),
        "23502" => format!("null value violates not-null constraint: {}", message),
        "42P01" => format!("relation does not exist: {}", message),
        "42701" => format!("column already exists: {}", message),
        "22P02" => format!("invalid input syntax: {}", message),
        // Redshift reports JSON_PARSE and SUPER size failures as XX000
        "XX000" => format!("internal error: {}", message),
        _ => format!("{} (code: {:?})", message, code),
    }
}

fn query_error(context: &str, error: &tokio_postgres::Error) -> RawstageError {
    RawstageError::Query(format!("{}: {}", context, format_redshift_error(error)))
}

/// Redshift connection wrapper
pub struct RedshiftConnection {
    client: Arc<Mutex<Client>>,
    closed: AtomicBool,
}

impl RedshiftConnection {
    /// Connect to a Redshift cluster.
    ///
    /// A zero port falls back to 5439. TLS follows `config.tls`; only
    /// `TlsMode::Disable` connects in plain text.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let host = config.host.as_str();
        if host.is_empty() {
            return Err(RawstageError::Configuration(
                "Redshift host cannot be empty".to_string(),
            ));
        }
        let port = if config.port == 0 {
            DEFAULT_PORT
        } else {
            config.port
        };
        let database = config
            .database
            .clone()
            .unwrap_or_else(|| "dev".to_string());

        tracing::info!(
            host = %host,
            port = %port,
            database = %database,
            ssl_mode = %config.tls.mode.as_sslmode(),
            "connecting to Redshift cluster"
        );

        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(host).port(port).dbname(&database);

        if let Some(user) = &config.username {
            pg_config.user(user);
        }
        if let Some(password) = &config.password {
            pg_config.password(password);
        }
        if let Some(application_name) = config.params.get("application_name") {
            pg_config.application_name(application_name);
        }
        if let Some(timeout) = config
            .params
            .get("connect_timeout")
            .and_then(|secs| secs.parse::<u64>().ok())
        {
            pg_config.connect_timeout(std::time::Duration::from_secs(timeout));
        }

        pg_config.ssl_mode(match config.tls.mode {
            TlsMode::Disable => SslMode::Disable,
            TlsMode::Prefer => SslMode::Prefer,
            TlsMode::Require | TlsMode::VerifyCa | TlsMode::VerifyFull => SslMode::Require,
        });

        let runtime = get_redshift_runtime();

        let client = if RedshiftTlsConnector::is_disabled(&config.tls) {
            let (client, connection) = runtime
                .spawn({
                    let pg_config = pg_config.clone();
                    async move { pg_config.connect(NoTls).await }
                })
                .await
                .map_err(|e| RawstageError::Connection(format!("Redshift connection task failed: {}", e)))?
                .map_err(|e| {
                    RawstageError::Connection(format!(
                        "Failed to connect to Redshift: {}",
                        format_redshift_error(&e)
                    ))
                })?;

            runtime.spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "Redshift connection error");
                }
            });
            client
        } else {
            let tls = RedshiftTlsConnector::build(&config.tls)
                .map_err(|e| RawstageError::Security(format!("{:#}", e)))?;

            let (client, connection) = runtime
                .spawn({
                    let pg_config = pg_config.clone();
                    async move { pg_config.connect(tls).await }
                })
                .await
                .map_err(|e| RawstageError::Connection(format!("Redshift connection task failed: {}", e)))?
                .map_err(|e| {
                    RawstageError::Connection(format!(
                        "Failed to connect to Redshift: {}",
                        format_redshift_error(&e)
                    ))
                })?;

            runtime.spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "Redshift connection error");
                }
            });
            client
        };

        tracing::info!(host = %host, port = %port, database = %database, "Redshift connection established");
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RawstageError::Connection("connection is closed".to_string()));
        }
        Ok(())
    }
}

/// Owned parameter values handed to tokio-postgres
#[derive(Debug)]
enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    DateTime(chrono::NaiveDateTime),
    DateTimeUtc(chrono::DateTime<chrono::Utc>),
}

impl PgValue {
    /// Convert a `Value` into the variant that matches the prepared
    /// statement's parameter type, so integers are written with the right
    /// width and timestamps travel in binary form.
    fn from_value_for_type(value: &Value, target_type: &Type) -> Result<Self> {
        Ok(match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int16(v) => Self::coerce_int(*v as i64, target_type)?,
            Value::Int32(v) => Self::coerce_int(*v as i64, target_type)?,
            Value::Int64(v) => Self::coerce_int(*v, target_type)?,
            Value::Float64(v) => PgValue::Float64(*v),
            Value::String(v) => PgValue::String(v.clone()),
            // SUPER has no binary encoding; JSON_PARSE takes the text form
            Value::Json(v) => PgValue::String(v.to_string()),
            Value::DateTime(v) => match *target_type {
                Type::TIMESTAMPTZ => PgValue::DateTimeUtc(v.and_utc()),
                _ => PgValue::DateTime(*v),
            },
            Value::DateTimeUtc(v) => match *target_type {
                Type::TIMESTAMP => PgValue::DateTime(v.naive_utc()),
                Type::TIMESTAMPTZ => PgValue::DateTimeUtc(*v),
                _ => PgValue::String(v.to_rfc3339()),
            },
        })
    }

    fn coerce_int(value: i64, target_type: &Type) -> Result<Self> {
        let out_of_range = |_| {
            RawstageError::InvalidInput(format!(
                "integer {} does not fit a {} parameter",
                value,
                target_type.name()
            ))
        };
        Ok(match *target_type {
            Type::INT2 => PgValue::Int16(i16::try_from(value).map_err(out_of_range)?),
            Type::INT4 => PgValue::Int32(i32::try_from(value).map_err(out_of_range)?),
            _ => PgValue::Int64(value),
        })
    }
}

impl ToSql for PgValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<postgres_types::IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            PgValue::Null => Ok(postgres_types::IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::Int16(v) => v.to_sql(ty, out),
            PgValue::Int32(v) => v.to_sql(ty, out),
            PgValue::Int64(v) => v.to_sql(ty, out),
            PgValue::Float64(v) => v.to_sql(ty, out),
            PgValue::String(v) => v.to_sql(ty, out),
            PgValue::DateTime(v) => v.to_sql(ty, out),
            PgValue::DateTimeUtc(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

/// Raw UTF-8 payload of a column whose type tokio-postgres doesn't know,
/// such as SUPER
#[derive(Debug)]
struct PgFallbackString(String);

impl<'a> FromSql<'a> for PgFallbackString {
    fn from_sql(
        _: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(Self(String::from_utf8_lossy(raw).into_owned()))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn bind_params(statement: &Statement, params: &[Value]) -> Result<Vec<PgValue>> {
    let param_types = statement.params();
    if param_types.len() != params.len() {
        return Err(RawstageError::InvalidInput(format!(
            "statement expects {} parameters, {} supplied",
            param_types.len(),
            params.len()
        )));
    }

    params
        .iter()
        .zip(param_types)
        .map(|(value, target_type)| PgValue::from_value_for_type(value, target_type))
        .collect()
}

async fn execute_on(client: &Client, sql: &str, params: &[Value]) -> Result<StatementResult> {
    let statement = client
        .prepare(sql)
        .await
        .map_err(|e| query_error("Failed to prepare statement", &e))?;

    let pg_params = bind_params(&statement, params)?;
    let param_refs: Vec<&(dyn ToSql + Sync)> =
        pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

    let affected_rows = client
        .execute(&statement, &param_refs)
        .await
        .map_err(|e| query_error("Failed to execute statement", &e))?;

    Ok(StatementResult { affected_rows })
}

async fn query_on(client: &Client, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let start_time = std::time::Instant::now();

    let statement = client
        .prepare(sql)
        .await
        .map_err(|e| query_error("Failed to prepare query", &e))?;

    let pg_params = bind_params(&statement, params)?;
    let param_refs: Vec<&(dyn ToSql + Sync)> =
        pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

    let pg_rows = client
        .query(&statement, &param_refs)
        .await
        .map_err(|e| query_error("Failed to execute query", &e))?;

    // Column metadata comes from the statement so empty results keep their columns
    let columns: Vec<ColumnMeta> = statement
        .columns()
        .iter()
        .enumerate()
        .map(|(ordinal, col)| ColumnMeta {
            name: col.name().to_string(),
            data_type: col.type_().name().to_string(),
            ordinal,
        })
        .collect();
    let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let rows = pg_rows
        .iter()
        .map(|pg_row| {
            let values = (0..columns.len())
                .map(|idx| redshift_to_value(pg_row, idx))
                .collect();
            Row::new(column_names.clone(), values)
        })
        .collect::<Vec<_>>();

    let execution_time_ms = start_time.elapsed().as_millis() as u64;
    tracing::debug!(row_count = rows.len(), execution_time_ms, "query executed successfully");

    Ok(QueryResult {
        columns,
        rows,
        execution_time_ms,
    })
}

/// Redshift transaction wrapper
///
/// Holds a handle to the shared client; statements run in the session that
/// issued `BEGIN`.
pub struct RedshiftTransaction {
    client: Arc<Mutex<Client>>,
    finished: bool,
}

impl Drop for RedshiftTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Redshift transaction dropped without commit or rollback");
        }
    }
}

#[async_trait]
impl Transaction for RedshiftTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("committing Redshift transaction");
        let client = self.client.lock().await;
        client
            .batch_execute("COMMIT")
            .await
            .map_err(|e| query_error("Failed to commit transaction", &e))?;
        drop(client);
        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("rolling back Redshift transaction");
        let client = self.client.lock().await;
        client
            .batch_execute("ROLLBACK")
            .await
            .map_err(|e| query_error("Failed to rollback transaction", &e))?;
        drop(client);
        self.finished = true;
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        tracing::debug!(sql_preview = %sql.chars().take(100).collect::<String>(), "executing query in transaction");
        let client = self.client.lock().await;
        query_on(&client, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        tracing::debug!(sql_preview = %sql.chars().take(100).collect::<String>(), "executing statement in transaction");
        let client = self.client.lock().await;
        execute_on(&client, sql, params).await
    }
}

#[async_trait]
impl Connection for RedshiftConnection {
    fn driver_name(&self) -> &str {
        "redshift"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>(), param_count = params.len()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.ensure_open()?;
        let client = self.client.lock().await;
        let result = execute_on(&client, sql, params).await?;
        tracing::debug!(affected_rows = result.affected_rows, "statement executed");
        Ok(result)
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.ensure_open()?;
        let client = self.client.lock().await;
        query_on(&client, sql, params).await
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        let client = self.client.lock().await;
        client
            .batch_execute(sql)
            .await
            .map_err(|e| query_error("Failed to execute batch", &e))
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.ensure_open()?;
        tracing::debug!("beginning Redshift transaction");

        let client = self.client.lock().await;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| query_error("Failed to begin transaction", &e))?;
        drop(client);

        Ok(Box::new(RedshiftTransaction {
            client: Arc::clone(&self.client),
            finished: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("closing Redshift connection");
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.client.try_lock().is_ok_and(|c| c.is_closed())
    }
}

/// Convert a result column into a `Value`
fn redshift_to_value(row: &PgRow, idx: usize) -> Value {
    let type_name = row.columns()[idx].type_().name();

    match type_name {
        "bool" => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "int2" => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(Value::Int16)
            .unwrap_or(Value::Null),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(Value::Int32)
            .unwrap_or(Value::Null),
        "int8" => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(Value::Int64)
            .unwrap_or(Value::Null),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Float64(v as f64))
            .unwrap_or(Value::Null),
        "float8" => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(Value::Float64)
            .unwrap_or(Value::Null),
        "text" | "varchar" | "char" | "bpchar" | "name" => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .ok()
            .flatten()
            .map(Value::Json)
            .unwrap_or(Value::Null),
        "timestamp" => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .ok()
            .flatten()
            .map(Value::DateTimeUtc)
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<_, Option<PgFallbackString>>(idx)
            .ok()
            .flatten()
            .map(|value| Value::String(value.0))
            .unwrap_or(Value::Null),
    }
}
