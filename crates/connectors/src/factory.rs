use crate::sql::{
    base::{connection::SqlConnection, error::ConnectorError},
    mysql::adapter::MySqlConnection,
    postgres::adapter::PgConnection,
};
use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Arc};
use tracing::info;

/// Opens connections for import workers. Every call returns a fresh session.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn SqlConnection>, ConnectorError>;
}

/// Picks the driver from the URL scheme.
#[derive(Debug, Clone)]
pub struct UrlConnectionFactory {
    url: String,
    properties: BTreeMap<String, String>,
}

impl UrlConnectionFactory {
    pub fn new(url: impl Into<String>, properties: BTreeMap<String, String>) -> Self {
        UrlConnectionFactory {
            url: url.into(),
            properties,
        }
    }

    fn scheme(&self) -> Result<&str, ConnectorError> {
        self.url
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| ConnectorError::InvalidUrl(redact(&self.url)))
    }
}

#[async_trait]
impl ConnectionFactory for UrlConnectionFactory {
    async fn connect(&self) -> Result<Arc<dyn SqlConnection>, ConnectorError> {
        let connection: Arc<dyn SqlConnection> = match self.scheme()? {
            "postgres" | "postgresql" => {
                Arc::new(PgConnection::connect(&self.url, &self.properties).await?)
            }
            "mysql" | "mariadb" => {
                Arc::new(MySqlConnection::connect(&self.url, &self.properties).await?)
            }
            other => return Err(ConnectorError::UnsupportedScheme(other.to_string())),
        };
        info!(kind = %connection.kind(), url = %redact(&self.url), "Connected");
        Ok(connection)
    }
}

/// Strips the password from a connection URL for logging.
pub fn redact(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.split_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}
