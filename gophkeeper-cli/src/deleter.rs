use std::sync::Arc;

use tracing::info;

use gophkeeper_core::sync::ResourceKind;

use crate::catalog::Catalog;
use crate::error::{ClientError, Result};
use crate::synchronizer::list_local_resources;
use crate::transport::{GrpcClient, UserAuthorization};

/// Deletes resources on the server and mirrors the deletion locally.
pub struct Deleter {
    client: Arc<GrpcClient>,
    catalog: Arc<dyn Catalog>,
}

impl Deleter {
    pub fn new(client: Arc<GrpcClient>, catalog: Arc<dyn Catalog>) -> Self {
        Self { client, catalog }
    }

    /// Delete the requested ids. Ids the catalog does not know are ignored;
    /// for files the on-disk copy is removed as well.
    pub async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let user = self.catalog.user_data().await?;
        let auth = UserAuthorization::from(&user);

        let local = list_local_resources(&*self.catalog).await?;

        for id in ids {
            let Some(entry) = local.iter().find(|r| &r.id == id) else {
                continue;
            };

            self.client.delete(&auth, &entry.id).await?;

            match entry.kind {
                ResourceKind::Binary => {
                    let data = self.catalog.file_data(&entry.id).await?;
                    self.catalog.delete_file(&entry.id).await?;
                    tokio::fs::remove_file(&data.path).await.map_err(|e| {
                        ClientError::Io(format!("failed to delete file {}: {e}", data.path))
                    })?;
                }
                ResourceKind::Card => self.catalog.delete_card(&entry.id).await?,
                ResourceKind::Credentials => self.catalog.delete_credentials(&entry.id).await?,
            }

            info!(resource_id = %entry.id, "resource deleted");
        }

        Ok(())
    }
}
