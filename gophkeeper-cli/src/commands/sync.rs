use std::path::Path;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::synchronizer::Synchronizer;
use crate::transport::GrpcClient;

/// `sync`
pub async fn run(config: &Config, catalog: Arc<dyn Catalog>) -> Result<()> {
    tokio::fs::create_dir_all(&config.sync_dir)
        .await
        .map_err(|e| ClientError::Io(format!("cannot create sync dir {}: {e}", config.sync_dir)))?;

    let client = Arc::new(GrpcClient::connect(&config.server).await?);

    Synchronizer::new(client, catalog, Path::new(&config.sync_dir))
        .sync()
        .await?;

    println!("Sync complete.");
    Ok(())
}
