use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tracing::{debug, warn};

use crate::acquire::{ConnectFailure, Connector};
use crate::connection_string::{ConnectionString, SslMode};
use crate::logging::LOG_TARGET;

use super::connection::PgConnection;

/// Opens `tokio-postgres` sessions, negotiating TLS according to the string's `sslmode`.
///
/// `verify-ca` and `verify-full` are handed to the driver as `require`; the TLS connector
/// then checks the certificate chain, and for `verify-full` the host name as well.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector {
    verify_certificates: bool,
}

/// Which server certificate checks the TLS connector performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CertificateChecks {
    chain: bool,
    host_name: bool,
}

impl PgConnector {
    /// Connector with libpq `sslmode=require` semantics: traffic is encrypted but the server
    /// certificate is not verified.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify the server certificate chain and host name against the system trust store,
    /// whatever non-verifying `sslmode` the string names.
    #[must_use]
    pub fn with_certificate_verification(mut self, verify: bool) -> Self {
        self.verify_certificates = verify;
        self
    }

    fn certificate_checks(&self, mode: Option<SslMode>) -> CertificateChecks {
        let mode = mode.unwrap_or(SslMode::Prefer);
        CertificateChecks {
            chain: self.verify_certificates || mode.verifies_certificate(),
            host_name: self.verify_certificates || mode.verifies_host_name(),
        }
    }

    fn build_tls_connector(
        &self,
        mode: Option<SslMode>,
    ) -> Result<MakeTlsConnector, ConnectFailure> {
        let checks = self.certificate_checks(mode);
        let mut builder = TlsConnector::builder();
        builder
            .danger_accept_invalid_certs(!checks.chain)
            .danger_accept_invalid_hostnames(!checks.host_name);
        let connector = builder
            .build()
            .map_err(|e| ConnectFailure::Fatal(format!("failed to build TLS connector: {e}")))?;
        Ok(MakeTlsConnector::new(connector))
    }
}

/// Rewrite modes the driver does not parse into the closest one it does.
fn driver_connection_string(
    connection_string: &ConnectionString,
    mode: Option<SslMode>,
) -> ConnectionString {
    match mode {
        Some(mode) if mode.driver_mode() != mode => {
            connection_string.with_option("sslmode", mode.driver_mode().as_str())
        }
        _ => connection_string.clone(),
    }
}

fn parse_config(
    connection_string: &ConnectionString,
    mode: Option<SslMode>,
) -> Result<tokio_postgres::Config, ConnectFailure> {
    let driver_string = driver_connection_string(connection_string, mode);
    tokio_postgres::Config::from_str(driver_string.expose()).map_err(|e| {
        let msg = format!("invalid connection string: {e}");
        ConnectFailure::Fatal(connection_string.redact(&msg))
    })
}

#[async_trait]
impl Connector for PgConnector {
    type Connection = PgConnection;

    async fn connect(
        &self,
        connection_string: &ConnectionString,
        timeout: Duration,
    ) -> Result<PgConnection, ConnectFailure> {
        let mode = connection_string.ssl_mode();
        let mut config = parse_config(connection_string, mode)?;
        config.connect_timeout(timeout);
        let tls = self.build_tls_connector(mode)?;

        debug!(
            target: LOG_TARGET,
            "connecting to PostgreSQL with TLS mode {:?} ({:?})",
            config.get_ssl_mode(),
            self.certificate_checks(mode)
        );

        // connect_timeout only bounds each socket connect; the outer timeout also covers
        // the TLS handshake and authentication.
        let (client, connection) = match tokio::time::timeout(timeout, config.connect(tls)).await
        {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(ConnectFailure::Operational(e.to_string())),
            Err(_) => {
                return Err(ConnectFailure::Operational(format!(
                    "timeout expired after {}s",
                    timeout.as_secs()
                )));
            }
        };

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(target: LOG_TARGET, error = %e, "PostgreSQL connection error");
            }
        });

        Ok(PgConnection::new(client, driver))
    }
}
