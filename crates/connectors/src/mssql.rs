//! SQL Server connection over TDS.
//!
//! Rows are converted cell by cell into JSON values. Binary columns (query and
//! plan hashes) become `0x`-prefixed uppercase hex strings so they can be used
//! directly as correlation keys and substituted back into follow-up queries.
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;
use tiberius::{Client, ColumnData, Config};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use querylens_common::config::ConnectionSettings;
use querylens_common::models::Row;
use querylens_error::{ErrorCode, QueryLensError, Result};

use crate::DiagnosticConnection;

type TdsClient = Client<Compat<TcpStream>>;

pub struct MssqlConnection {
    // TDS sessions are strictly request/response; the mutex serializes statements.
    client: Mutex<TdsClient>,
}

impl MssqlConnection {
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let connection_string = settings.connection_string.as_ref().ok_or_else(|| {
            QueryLensError::new(ErrorCode::InvalidConfig, "No connection string configured")
                .with_hint(
                    "Set connection.connection_string or QUERYLENS__CONNECTION__CONNECTION_STRING",
                )
        })?;

        let config = Config::from_ado_string(connection_string.expose_secret()).map_err(|e| {
            QueryLensError::new(
                ErrorCode::InvalidConfig,
                format!("Invalid connection string: {}", e),
            )
        })?;

        let timeout = Duration::from_secs(settings.connect_timeout_secs);
        let client = match Self::open(config.clone(), timeout).await {
            Ok(client) => client,
            // Azure SQL gateways redirect to the node that owns the database.
            Err(tiberius::error::Error::Routing { host, port }) => {
                tracing::info!(%host, port, "Following SQL Server routing redirect");
                let mut config = config;
                config.host(&host);
                config.port(port);
                Self::open(config, timeout).await.map_err(to_connectivity)?
            }
            Err(e) => return Err(to_connectivity(e)),
        };

        tracing::debug!("Connected to SQL Server");
        Ok(Self {
            client: Mutex::new(client),
        })
    }

    async fn open(config: Config, timeout: Duration) -> tiberius::Result<TdsClient> {
        let tcp = tokio::time::timeout(timeout, TcpStream::connect(config.get_addr()))
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("Connection timed out after {:?}", timeout),
                )
            })??;
        tcp.set_nodelay(true)?;
        Client::connect(config, tcp.compat_write()).await
    }
}

#[async_trait]
impl DiagnosticConnection for MssqlConnection {
    fn kind(&self) -> &'static str {
        "mssql"
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        let mut client = self.client.lock().await;
        let stream = client
            .simple_query(sql.to_string())
            .await
            .map_err(to_query_error)?;
        let rows = stream.into_first_result().await.map_err(to_query_error)?;

        Ok(rows
            .iter()
            .map(|row| {
                row.cells()
                    .map(|(column, data)| (column.name().to_string(), cell_to_value(data)))
                    .collect()
            })
            .collect())
    }
}

fn to_connectivity(err: tiberius::error::Error) -> QueryLensError {
    QueryLensError::connectivity(format!("Failed to connect to SQL Server: {}", err))
}

fn to_query_error(err: tiberius::error::Error) -> QueryLensError {
    match err {
        tiberius::error::Error::Io { .. } => {
            QueryLensError::connectivity(format!("Connection lost: {}", err))
        }
        other => QueryLensError::query_failed(other.to_string()),
    }
}

fn cell_to_value(data: &ColumnData<'static>) -> Value {
    let value = match data {
        ColumnData::U8(v) => v.map(Value::from),
        ColumnData::I16(v) => v.map(Value::from),
        ColumnData::I32(v) => v.map(Value::from),
        ColumnData::I64(v) => v.map(Value::from),
        ColumnData::F32(v) => v.map(|f| Value::from(f as f64)),
        ColumnData::F64(v) => v.map(Value::from),
        ColumnData::Bit(v) => v.map(Value::from),
        ColumnData::String(v) => v.as_ref().map(|s| Value::String(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| Value::String(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| Value::String(hex_literal(b))),
        ColumnData::Numeric(v) => v.map(|n| {
            Value::from(n.value() as f64 / 10f64.powi(i32::from(n.scale())))
        }),
        // Temporal and XML columns are expected to be converted to text in the query.
        _ => None,
    };
    value.unwrap_or(Value::Null)
}

/// Format bytes as a T-SQL binary literal, e.g. `0x1A2B`.
pub fn hex_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{:02X}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_hex_literal() {
        assert_eq!(hex_literal(&[0x1a, 0x00, 0xff]), "0x1A00FF");
        assert_eq!(hex_literal(&[]), "0x");
    }

    #[test]
    fn test_cell_conversion() {
        assert_eq!(cell_to_value(&ColumnData::I64(Some(7))), Value::from(7));
        assert_eq!(cell_to_value(&ColumnData::I32(None)), Value::Null);
        assert_eq!(cell_to_value(&ColumnData::Bit(Some(true))), Value::Bool(true));
        assert_eq!(
            cell_to_value(&ColumnData::String(Some(Cow::Borrowed("orders")))),
            Value::String("orders".to_string())
        );
        assert_eq!(
            cell_to_value(&ColumnData::Binary(Some(Cow::Owned(vec![0xab, 0x01])))),
            Value::String("0xAB01".to_string())
        );
    }

    #[tokio::test]
    async fn test_connect_without_connection_string() {
        let settings = ConnectionSettings::default();
        let err = MssqlConnection::connect(&settings).await.err().unwrap();
        assert_eq!(err.code, ErrorCode::InvalidConfig);
    }
}
