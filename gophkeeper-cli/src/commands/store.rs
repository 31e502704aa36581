use std::path::Path;
use std::sync::Arc;

use gophkeeper_core::payload::{CardRecord, CredentialRecord};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::transport::GrpcClient;
use crate::uploader::Uploader;

async fn uploader(config: &Config, catalog: Arc<dyn Catalog>) -> Result<Uploader> {
    tokio::fs::create_dir_all(&config.sync_dir)
        .await
        .map_err(|e| ClientError::Io(format!("cannot create sync dir {}: {e}", config.sync_dir)))?;

    let client = Arc::new(GrpcClient::connect(&config.server).await?);
    Ok(Uploader::new(client, catalog, Path::new(&config.sync_dir)))
}

/// `store files <path>...`
pub async fn files(config: &Config, catalog: Arc<dyn Catalog>, paths: Vec<String>) -> Result<()> {
    uploader(config, catalog).await?.upload_files(&paths).await?;
    println!("Stored {} file(s).", paths.len());
    Ok(())
}

/// `store card`
pub async fn card(config: &Config, catalog: Arc<dyn Catalog>, record: CardRecord) -> Result<()> {
    uploader(config, catalog).await?.upload_card(record).await?;
    println!("Card stored.");
    Ok(())
}

/// `store cred`
pub async fn credentials(
    config: &Config,
    catalog: Arc<dyn Catalog>,
    record: CredentialRecord,
) -> Result<()> {
    uploader(config, catalog)
        .await?
        .upload_credentials(record)
        .await?;
    println!("Credentials stored.");
    Ok(())
}
