use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;

use gophkeeper_core::sync::{compute_sync_plan, LocalResource, ResourceKind};

use crate::catalog::Catalog;
use crate::downloader::Downloader;
use crate::error::{aggregate, ClientError, Result};
use crate::transport::{GrpcClient, UserAuthorization};

/// Default deadline applied to each streaming receive.
const OPERATION_TIMEOUT: Duration = Duration::from_millis(500);

/// Reconciles the local catalog against the server's resource list:
/// missing resources are downloaded, orphaned local rows are deleted.
pub struct Synchronizer {
    client: Arc<GrpcClient>,
    catalog: Arc<dyn Catalog>,
    sync_directory: PathBuf,
    limit: usize,
    operation_timeout: Duration,
}

impl Synchronizer {
    pub fn new(client: Arc<GrpcClient>, catalog: Arc<dyn Catalog>, sync_directory: &Path) -> Self {
        Self {
            client,
            catalog,
            sync_directory: sync_directory.to_path_buf(),
            limit: 1,
            operation_timeout: OPERATION_TIMEOUT,
        }
    }

    /// Bound the download fan-out, the same knob the uploader uses.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Run one reconciliation pass. Per-resource failures accumulate; the
    /// pass fails iff any stage produced an error, reporting the union.
    pub async fn sync(&self) -> Result<()> {
        let user = Arc::new(self.catalog.user_data().await?);
        let auth = UserAuthorization::from(&*user);

        let (remote, local) = tokio::join!(
            self.client.list(&auth, self.operation_timeout),
            list_local_resources(&*self.catalog),
        );
        let remote = remote?;
        let local = local?;

        let plan = compute_sync_plan(&local, &remote);
        info!(
            to_download = plan.to_download.len(),
            to_delete = plan.to_delete.len(),
            "sync plan computed"
        );

        let mut errors = Vec::new();

        // Fetch missing resources with bounded fan-out.
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut tasks = JoinSet::new();
        for id in plan.to_download {
            let semaphore = semaphore.clone();
            let user = user.clone();
            let downloader = Downloader::new(
                self.client.clone(),
                self.catalog.clone(),
                &self.sync_directory,
                self.operation_timeout,
            );

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| ClientError::Io(format!("download limiter closed: {e}")))?;

                downloader.download(&user, &id).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(e) => errors.push(ClientError::Io(format!("download task failed: {e}"))),
            }
        }

        // Remove rows the server no longer has.
        for entry in plan.to_delete {
            if let Err(e) = self.delete_local(&entry).await {
                errors.push(e);
            }
        }

        aggregate(errors)
    }

    async fn delete_local(&self, entry: &LocalResource) -> Result<()> {
        match entry.kind {
            ResourceKind::Binary => {
                let data = self.catalog.file_data(&entry.id).await?;
                self.catalog.delete_file(&entry.id).await?;
                tokio::fs::remove_file(&data.path).await.map_err(|e| {
                    ClientError::Io(format!("failed to delete file {}: {e}", data.path))
                })?;
                Ok(())
            }
            ResourceKind::Card => self.catalog.delete_card(&entry.id).await,
            ResourceKind::Credentials => self.catalog.delete_credentials(&entry.id).await,
        }
    }
}

/// Collect the union of local ids across all three catalog tables, tagged
/// with their kind. Failures in any listing fail the whole collection.
pub async fn list_local_resources(catalog: &dyn Catalog) -> Result<Vec<LocalResource>> {
    let (files, cards, creds) = tokio::try_join!(
        catalog.list_files(),
        catalog.list_cards(),
        catalog.list_credentials(),
    )?;

    let mut local = Vec::with_capacity(files.len() + cards.len() + creds.len());
    local.extend(files.into_iter().map(|f| LocalResource {
        id: f.id,
        kind: ResourceKind::Binary,
    }));
    local.extend(cards.into_iter().map(|c| LocalResource {
        id: c.id,
        kind: ResourceKind::Card,
    }));
    local.extend(creds.into_iter().map(|c| LocalResource {
        id: c.id,
        kind: ResourceKind::Credentials,
    }));

    Ok(local)
}
