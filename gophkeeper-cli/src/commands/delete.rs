use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::deleter::Deleter;
use crate::error::Result;
use crate::transport::GrpcClient;

/// `delete <id>...`
pub async fn run(config: &Config, catalog: Arc<dyn Catalog>, ids: Vec<String>) -> Result<()> {
    let client = Arc::new(GrpcClient::connect(&config.server).await?);

    Deleter::new(client, catalog).delete(&ids).await?;

    println!("Deleted.");
    Ok(())
}
