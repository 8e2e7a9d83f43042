//! PostgreSQL driver over `sqlx::PgConnection`

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Number, Value};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Postgres, Row as _, TypeInfo, ValueRef};
use tracing::debug;

use super::connection::{ConnectionFactory, ConnectionInfo, DbConnection, Row};
use crate::error::DriverError;

const APPLICATION_NAME: &str = "pgmux";

/// Opens one `PgConnection` per pooled slot
pub struct PostgresConnectionFactory {
    connect_timeout: Duration,
}

impl PostgresConnectionFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for PostgresConnectionFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl ConnectionFactory for PostgresConnectionFactory {
    async fn connect(
        &self,
        info: &ConnectionInfo,
        read_only: bool,
    ) -> Result<Box<dyn DbConnection>, DriverError> {
        let options = PgConnectOptions::new()
            .host(info.host_for(read_only))
            .port(info.port)
            .username(&info.user)
            .password(&info.password)
            .database(&info.database)
            .application_name(APPLICATION_NAME);

        let mut conn = tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| DriverError::Connect(format!("timed out after {:?}", self.connect_timeout)))?
            .map_err(|e| DriverError::Connect(e.to_string()))?;

        if read_only {
            sqlx::Executor::execute(&mut conn, sqlx::raw_sql("SET default_transaction_read_only = on"))
                .await
                .map_err(|e| DriverError::Connect(e.to_string()))?;
        }

        debug!(
            host = info.host_for(read_only),
            database = %info.database,
            read_only,
            "[Postgres] Connected"
        );
        Ok(Box::new(PgDbConnection { conn }))
    }
}

struct PgDbConnection {
    conn: PgConnection,
}

#[async_trait]
impl DbConnection for PgDbConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&mut self.conn)
            .await
            .map_err(driver_error)?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DriverError> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&mut self.conn)
            .await
            .map_err(driver_error)?;
        Ok(result.rows_affected())
    }

    async fn execute_script(&mut self, sql: &str) -> Result<(), DriverError> {
        sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql))
            .await
            .map_err(driver_error)?;
        Ok(())
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.conn.close().await {
            debug!("[Postgres] Error while closing connection: {}", e);
        }
    }
}

fn driver_error(e: sqlx::Error) -> DriverError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) => {
            DriverError::Broken(e.to_string())
        }
        other => DriverError::Statement(other.to_string()),
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [Value],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(v) => query.bind(*v),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64()),
            },
            Value::String(s) => query.bind(s.as_str()),
            other => query.bind(sqlx::types::Json(other)),
        };
    }
    query
}

/// Convert a row into column-name keyed JSON, by Postgres type name
fn decode_row(row: &PgRow) -> Row {
    let mut out = Row::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let value = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => Value::Null,
            Ok(raw) => {
                let type_name = raw.type_info().name().to_ascii_uppercase();
                decode_value(row, idx, &type_name)
            }
            Err(_) => Value::Null,
        };
        out.insert(column.name().to_string(), value);
    }
    out
}

fn decode_value(row: &PgRow, idx: usize, type_name: &str) -> Value {
    match type_name {
        "BOOL" => row.try_get::<bool, _>(idx).map(Value::Bool).ok(),
        "INT2" => row.try_get::<i16, _>(idx).map(Value::from).ok(),
        "INT4" => row.try_get::<i32, _>(idx).map(Value::from).ok(),
        "INT8" => row.try_get::<i64, _>(idx).map(Value::from).ok(),
        "FLOAT4" => row
            .try_get::<f32, _>(idx)
            .ok()
            .and_then(|v| Number::from_f64(v as f64))
            .map(Value::Number),
        "FLOAT8" => row
            .try_get::<f64, _>(idx)
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        "JSON" | "JSONB" => row
            .try_get::<sqlx::types::Json<Value>, _>(idx)
            .map(|json| json.0)
            .ok(),
        "UUID" => row
            .try_get::<uuid::Uuid, _>(idx)
            .map(|v| Value::String(v.to_string()))
            .ok(),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
            .map(|v| Value::String(v.to_rfc3339()))
            .ok(),
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .map(|v| Value::String(v.to_string()))
            .ok(),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(idx)
            .map(|v| Value::String(v.to_string()))
            .ok(),
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(idx)
            .map(|v| Value::String(format!("\\x{}", hex_string(&v))))
            .ok(),
        _ => row.try_get::<String, _>(idx).map(Value::String).ok(),
    }
    .unwrap_or(Value::Null)
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
