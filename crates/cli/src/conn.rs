use crate::error::CliError;
use connectors::{
    factory::{ConnectionFactory, UrlConnectionFactory, redact},
    sql::base::connection::DatabaseKind,
};
use engine_config::Configuration;
use tracing::{error, info};

/// Opens one connection with the configured URL and properties, pings it
/// and closes it again.
pub async fn test_connection(config: &Configuration) -> Result<DatabaseKind, CliError> {
    let url = redact(&config.connection_url);
    info!("Testing connection to '{url}'");

    let factory = UrlConnectionFactory::new(
        config.connection_url.clone(),
        config.connection_properties.clone(),
    );
    let connection = factory.connect().await.inspect_err(|e| {
        error!("Failed to connect to '{url}': {e}");
    })?;

    let pinged = connection.ping().await;
    let closed = connection.close().await;
    pinged?;
    closed?;

    let kind = connection.kind();
    info!("Connection to {kind} at '{url}' is working");
    Ok(kind)
}
