//! Environment capability checks run once before each analysis cycle.
//!
//! The version and database checks run in order and short-circuit. The
//! permission and login-mode probes are independent, so they are spawned as two
//! tasks and joined; the cycle is admitted only if both report success.

use std::sync::Arc;

use querylens_common::models::Row;
use querylens_connectors::DiagnosticConnection;
use querylens_error::{ErrorCode, ErrorContext, QueryLensError, Result};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

pub const VERSION_QUERY: &str =
    "SELECT CAST(SERVERPROPERTY('ProductVersion') AS NVARCHAR(128)) AS product_version";

pub const DATABASES_QUERY: &str = "SELECT name AS database_name, compatibility_level, \
     is_query_store_on FROM sys.databases WHERE database_id > 4 AND state = 0";

pub const PERMISSION_QUERY: &str = "SELECT CASE WHEN IS_SRVROLEMEMBER('sysadmin') = 1 \
     OR HAS_PERMS_BY_NAME(NULL, NULL, 'VIEW SERVER STATE') = 1 THEN 1 ELSE 0 END AS has_permission";

pub const LOGIN_MODE_QUERY: &str = "SELECT CAST(SERVERPROPERTY('IsIntegratedSecurityOnly') AS INT) \
     AS integrated_security_only, c.auth_scheme FROM sys.dm_exec_connections AS c \
     WHERE c.session_id = @@SPID";

/// Minimum compatibility level accepted in legacy mode (SQL Server 2005).
pub const LEGACY_MIN_COMPATIBILITY_LEVEL: f64 = 90.0;

/// One boolean per check. Checks that never ran stay `false`.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub major_version: Option<u32>,
    pub version_supported: bool,
    pub database_capable: bool,
    pub permission_granted: bool,
    pub login_mode_supported: bool,
    /// Databases that met the capability bar.
    pub capable_databases: Vec<String>,
    /// First connectivity failure seen by any probe.
    pub connectivity_error: Option<QueryLensError>,
}

impl ValidationReport {
    pub fn admitted(&self) -> bool {
        self.connectivity_error.is_none()
            && self.version_supported
            && self.database_capable
            && self.permission_granted
            && self.login_mode_supported
    }

    pub fn failed_checks(&self) -> Vec<&'static str> {
        [
            ("version", self.version_supported),
            ("database_capability", self.database_capable),
            ("permission", self.permission_granted),
            ("login_mode", self.login_mode_supported),
        ]
        .into_iter()
        .filter(|(_, passed)| !passed)
        .map(|(name, _)| name)
        .collect()
    }

    fn record_failure(&mut self, probe: &str, error: QueryLensError) {
        warn!(probe, error = %error, "Precondition probe failed");
        if error.code == ErrorCode::ConnectivityError && self.connectivity_error.is_none() {
            self.connectivity_error = Some(error);
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreconditionValidator {
    supported_versions: Vec<u32>,
    legacy_mode: bool,
}

impl PreconditionValidator {
    pub fn new(supported_versions: Vec<u32>, legacy_mode: bool) -> Self {
        Self {
            supported_versions,
            legacy_mode,
        }
    }

    /// Run every check and report the individual outcomes. Probe errors count as
    /// failed checks; nothing is retried. A lost connection stops the remaining checks.
    pub async fn validate(&self, connection: Arc<dyn DiagnosticConnection>) -> ValidationReport {
        let mut report = ValidationReport::default();

        match connection.query(VERSION_QUERY).await.and_then(|rows| major_version(&rows)) {
            Ok(major) => {
                report.major_version = Some(major);
                report.version_supported = self.supported_versions.contains(&major);
            }
            Err(e) => report.record_failure("version", e),
        }
        if !report.version_supported {
            return report;
        }

        match connection.query(DATABASES_QUERY).await {
            Ok(rows) => {
                report.capable_databases = rows
                    .iter()
                    .filter(|row| self.database_is_capable(row))
                    .filter_map(|row| row.get_str("database_name").map(str::to_string))
                    .collect();
                report.database_capable = !report.capable_databases.is_empty();
            }
            Err(e) => report.record_failure("database_capability", e),
        }
        if !report.database_capable {
            return report;
        }

        let permission = tokio::spawn(probe_permission(Arc::clone(&connection)));
        let login_mode = tokio::spawn(probe_login_mode(Arc::clone(&connection)));
        let (permission, login_mode) = tokio::join!(permission, login_mode);

        report.permission_granted = probe_outcome(&mut report, "permission", permission);
        report.login_mode_supported = probe_outcome(&mut report, "login_mode", login_mode);

        debug!(?report, "Precondition checks finished");
        report
    }

    /// Like [`validate`](Self::validate), but a rejection becomes an error. A
    /// connectivity failure is returned as is.
    pub async fn check(
        &self,
        connection: Arc<dyn DiagnosticConnection>,
    ) -> Result<ValidationReport> {
        let mut report = self.validate(connection).await;
        if let Some(e) = report.connectivity_error.take() {
            return Err(e);
        }
        if report.admitted() {
            info!(
                major_version = ?report.major_version,
                databases = report.capable_databases.len(),
                "Environment admitted"
            );
            return Ok(report);
        }

        let context = ErrorContext::Environment {
            major_version: report.major_version,
            supported_versions: self.supported_versions.clone(),
            failed_checks: report.failed_checks().iter().map(|c| c.to_string()).collect(),
        };

        let err = if !report.version_supported {
            QueryLensError::new(
                ErrorCode::UnsupportedVersion,
                match report.major_version {
                    Some(v) => format!("SQL Server major version {} is not supported", v),
                    None => "Could not determine the SQL Server version".to_string(),
                },
            )
            .with_hint(format!(
                "Supported major versions: {:?}",
                self.supported_versions
            ))
        } else {
            let mut err = QueryLensError::new(
                ErrorCode::UnsupportedEnvironment,
                format!(
                    "Environment rejected, failed checks: {}",
                    report.failed_checks().join(", ")
                ),
            );
            if !report.database_capable && !self.legacy_mode {
                err = err.with_hint(
                    "Enable Query Store on a user database or set probe.legacy_mode",
                );
            }
            err
        };

        Err(err.with_context(context))
    }

    fn database_is_capable(&self, row: &Row) -> bool {
        if self.legacy_mode {
            row.get_f64("compatibility_level")
                .is_some_and(|level| level >= LEGACY_MIN_COMPATIBILITY_LEVEL)
        } else {
            row.get_bool("is_query_store_on").unwrap_or(false)
        }
    }
}

/// `"16.0.4135.4"` -> 16
fn major_version(rows: &[Row]) -> Result<u32> {
    let version = rows
        .first()
        .and_then(|row| row.get_str("product_version"))
        .ok_or_else(|| QueryLensError::query_failed("Version probe returned no product_version"))?;

    version
        .split('.')
        .next()
        .and_then(|major| major.trim().parse().ok())
        .ok_or_else(|| {
            QueryLensError::query_failed(format!("Unparseable product version '{}'", version))
        })
}

async fn probe_permission(connection: Arc<dyn DiagnosticConnection>) -> Result<bool> {
    let rows = connection.query(PERMISSION_QUERY).await?;
    Ok(rows
        .first()
        .and_then(|row| row.get_bool("has_permission"))
        .unwrap_or(false))
}

/// Mixed-mode servers accept any login; Windows-only servers need a Windows session.
async fn probe_login_mode(connection: Arc<dyn DiagnosticConnection>) -> Result<bool> {
    let rows = connection.query(LOGIN_MODE_QUERY).await?;
    let Some(row) = rows.first() else {
        return Ok(false);
    };

    match row.get_bool("integrated_security_only") {
        Some(false) => Ok(true),
        Some(true) => Ok(matches!(
            row.get_str("auth_scheme"),
            Some("NTLM") | Some("KERBEROS")
        )),
        None => Ok(false),
    }
}

fn probe_outcome(
    report: &mut ValidationReport,
    name: &str,
    joined: std::result::Result<Result<bool>, JoinError>,
) -> bool {
    match joined {
        Ok(Ok(passed)) => passed,
        Ok(Err(e)) => {
            report.record_failure(name, e);
            false
        }
        Err(e) => {
            warn!(probe = name, error = %e, "Precondition probe task did not complete");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querylens_connectors::MemoryConnection;

    fn version(v: &str) -> Vec<Row> {
        vec![Row::new().with("product_version", v)]
    }

    fn database(name: &str, level: i64, query_store: bool) -> Row {
        Row::new()
            .with("database_name", name)
            .with("compatibility_level", level)
            .with("is_query_store_on", query_store)
    }

    fn healthy() -> MemoryConnection {
        MemoryConnection::new()
            .respond("ProductVersion", version("16.0.4135.4"))
            .respond("sys.databases", vec![database("sales", 160, true)])
            .respond("VIEW SERVER STATE", vec![Row::new().with("has_permission", 1)])
            .respond(
                "IsIntegratedSecurityOnly",
                vec![Row::new()
                    .with("integrated_security_only", 0)
                    .with("auth_scheme", "SQL")],
            )
    }

    fn validator() -> PreconditionValidator {
        PreconditionValidator::new(vec![14, 15, 16], false)
    }

    #[tokio::test]
    async fn test_healthy_environment_admitted() {
        let report = validator().validate(Arc::new(healthy())).await;
        assert!(report.admitted());
        assert_eq!(report.major_version, Some(16));
        assert_eq!(report.capable_databases, vec!["sales"]);
        assert!(report.failed_checks().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_version_short_circuits() {
        let conn = Arc::new(
            MemoryConnection::new()
                .respond("ProductVersion", version("12.0.6024.0"))
                .respond("sys.databases", vec![database("sales", 120, true)]),
        );
        let report = validator().validate(conn.clone()).await;
        assert!(!report.version_supported);
        assert_eq!(conn.count_matching("sys.databases"), 0);

        let err = validator().check(conn).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedVersion);
    }

    #[tokio::test]
    async fn test_query_store_required_outside_legacy_mode() {
        let conn = || {
            MemoryConnection::new()
                .respond("ProductVersion", version("15.0.2000.5"))
                .respond("sys.databases", vec![database("old", 100, false)])
                .respond("VIEW SERVER STATE", vec![Row::new().with("has_permission", 1)])
                .respond(
                    "IsIntegratedSecurityOnly",
                    vec![Row::new().with("integrated_security_only", 0)],
                )
        };

        let report = validator().validate(Arc::new(conn())).await;
        assert!(!report.database_capable);

        let legacy = PreconditionValidator::new(vec![15], true);
        assert!(legacy.validate(Arc::new(conn())).await.admitted());
    }

    #[tokio::test]
    async fn test_permission_error_rejects_regardless_of_login_mode() {
        let conn = MemoryConnection::new()
            .respond("ProductVersion", version("16.0.1000.6"))
            .respond("sys.databases", vec![database("sales", 160, true)])
            .fail(
                "VIEW SERVER STATE",
                QueryLensError::query_failed("permission denied"),
            )
            .respond(
                "IsIntegratedSecurityOnly",
                vec![Row::new().with("integrated_security_only", 0)],
            );

        let report = validator().validate(Arc::new(conn)).await;
        assert!(!report.permission_granted);
        assert!(report.login_mode_supported);
        assert!(!report.admitted());
        assert_eq!(report.failed_checks(), vec!["permission"]);
    }

    #[tokio::test]
    async fn test_permission_false_rejects() {
        let conn = MemoryConnection::new()
            .respond("ProductVersion", version("16.0.1000.6"))
            .respond("sys.databases", vec![database("sales", 160, true)])
            .respond("VIEW SERVER STATE", vec![Row::new().with("has_permission", 0)])
            .respond(
                "IsIntegratedSecurityOnly",
                vec![Row::new().with("integrated_security_only", 0)],
            );

        let err = validator().check(Arc::new(conn)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedEnvironment);
        match err.context {
            Some(ErrorContext::Environment { failed_checks, .. }) => {
                assert_eq!(failed_checks, vec!["permission"]);
            }
            other => panic!("unexpected context: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_windows_only_server_needs_windows_session() {
        let conn = |scheme: &str| {
            MemoryConnection::new()
                .respond("ProductVersion", version("14.0.1000.169"))
                .respond("sys.databases", vec![database("sales", 140, true)])
                .respond("VIEW SERVER STATE", vec![Row::new().with("has_permission", 1)])
                .respond(
                    "IsIntegratedSecurityOnly",
                    vec![Row::new()
                        .with("integrated_security_only", 1)
                        .with("auth_scheme", scheme)],
                )
        };

        assert!(validator().validate(Arc::new(conn("KERBEROS"))).await.admitted());
        assert!(!validator().validate(Arc::new(conn("SQL"))).await.admitted());
    }

    #[tokio::test]
    async fn test_lost_connection_is_not_a_rejection() {
        let conn = MemoryConnection::new().fail(
            "ProductVersion",
            QueryLensError::connectivity("connection reset"),
        );

        let err = validator().check(Arc::new(conn)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConnectivityError);
        assert_eq!(err.message, "connection reset");
        assert!(err.context.is_none());
    }

    #[tokio::test]
    async fn test_lost_connection_in_concurrent_probe_surfaces() {
        let conn = Arc::new(
            MemoryConnection::new()
                .respond("ProductVersion", version("16.0.1000.6"))
                .respond("sys.databases", vec![database("sales", 160, true)])
                .respond("VIEW SERVER STATE", vec![Row::new().with("has_permission", 1)])
                .fail(
                    "IsIntegratedSecurityOnly",
                    QueryLensError::connectivity("socket closed"),
                ),
        );

        let report = validator().validate(conn.clone()).await;
        assert!(report.permission_granted);
        assert!(!report.admitted());

        let err = validator().check(conn).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConnectivityError);
    }

    #[tokio::test]
    async fn test_login_mode_error_rejects() {
        let conn = MemoryConnection::new()
            .respond("ProductVersion", version("16.0.1000.6"))
            .respond("sys.databases", vec![database("sales", 160, true)])
            .respond("VIEW SERVER STATE", vec![Row::new().with("has_permission", 1)])
            .fail(
                "IsIntegratedSecurityOnly",
                QueryLensError::query_failed("invalid column name"),
            );

        let report = validator().validate(Arc::new(conn)).await;
        assert!(report.permission_granted);
        assert!(!report.login_mode_supported);
        assert!(report.connectivity_error.is_none());
        assert_eq!(report.failed_checks(), vec!["login_mode"]);
    }

    #[tokio::test]
    async fn test_database_probe_error_rejects_before_concurrent_probes() {
        let conn = Arc::new(
            MemoryConnection::new()
                .respond("ProductVersion", version("16.0.1000.6"))
                .fail(
                    "sys.databases",
                    QueryLensError::query_failed("permission denied on sys.databases"),
                )
                .respond("VIEW SERVER STATE", vec![Row::new().with("has_permission", 1)]),
        );

        let err = validator().check(conn.clone()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedEnvironment);
        assert_eq!(conn.count_matching("VIEW SERVER STATE"), 0);
        match err.context {
            Some(ErrorContext::Environment { failed_checks, .. }) => {
                assert_eq!(
                    failed_checks,
                    vec!["database_capability", "permission", "login_mode"]
                );
            }
            other => panic!("unexpected context: {:?}", other),
        }
    }

    #[test]
    fn test_major_version_parsing() {
        assert_eq!(major_version(&version("15.0.2000.5")).unwrap(), 15);
        assert!(major_version(&version("banana")).is_err());
        assert!(major_version(&[]).is_err());
    }
}
