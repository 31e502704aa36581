use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;

use gophkeeper_core::crypto::envelope;
use gophkeeper_core::payload::{CardRecord, CredentialRecord, TypedPayload};

use crate::catalog::{CardData, Catalog, CredentialData, FileData, UserData};
use crate::error::{aggregate, ClientError, Result};
use crate::transport::{GrpcClient, UserAuthorization};

/// Chunks sent on an Add stream; must stay under the server receive ceiling.
const UPLOAD_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Empty files carry nothing worth sealing.
const MINIMAL_FILE_SIZE: usize = 1;

/// Seals payloads and pushes them to the server, recording metadata in the
/// local catalog.
pub struct Uploader {
    client: Arc<GrpcClient>,
    catalog: Arc<dyn Catalog>,
    sync_directory: PathBuf,
    limit: usize,
}

impl Uploader {
    pub fn new(client: Arc<GrpcClient>, catalog: Arc<dyn Catalog>, sync_directory: &Path) -> Self {
        Self {
            client,
            catalog,
            sync_directory: sync_directory.to_path_buf(),
            limit: 1,
        }
    }

    /// Bound the number of concurrent uploads in a batch.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Upload a batch of files. Paths whose file name the catalog already
    /// knows are skipped; each accepted file is first copied into the sync
    /// directory so the local mirror matches what was uploaded.
    pub async fn upload_files(&self, files: &[String]) -> Result<()> {
        let unique = self.filter_files(files).await?;
        let user = Arc::new(self.catalog.user_data().await?);

        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut tasks = JoinSet::new();

        for path in unique {
            let semaphore = semaphore.clone();
            let client = self.client.clone();
            let catalog = self.catalog.clone();
            let sync_directory = self.sync_directory.clone();
            let user = user.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| ClientError::Io(format!("upload limiter closed: {e}")))?;

                upload_one_file(&client, &*catalog, &sync_directory, &user, &path).await
            });
        }

        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(e) => errors.push(ClientError::Io(format!("upload task failed: {e}"))),
            }
        }

        aggregate(errors)
    }

    /// Seal and upload one card record, then add it to the catalog under the
    /// server-assigned id.
    pub async fn upload_card(&self, card: CardRecord) -> Result<()> {
        let user = self.catalog.user_data().await?;

        let payload = TypedPayload::Card(card.clone());
        let (id, _key, _salt) = upload_payload(&self.client, &user, &payload).await?;

        self.catalog
            .add_card(&CardData {
                id,
                user_id: user.user_id.clone(),
                name: card.name,
                number: card.number,
                holder: card.holder,
                expiry_date: card.expiry_date,
                security_code: card.security_code.unwrap_or_default(),
            })
            .await
    }

    /// Seal and upload one credential record, then add it to the catalog
    /// under the server-assigned id.
    pub async fn upload_credentials(&self, cred: CredentialRecord) -> Result<()> {
        let user = self.catalog.user_data().await?;

        let payload = TypedPayload::Credentials(cred.clone());
        let (id, _key, _salt) = upload_payload(&self.client, &user, &payload).await?;

        self.catalog
            .add_credentials(&CredentialData {
                id,
                user_id: user.user_id.clone(),
                username: cred.username,
                password: cred.password,
                uri: cred.uri,
                description: cred.description.unwrap_or_default(),
            })
            .await
    }

    /// Resolve each path to an absolute one, dedupe by file name, and drop
    /// names the catalog already knows.
    async fn filter_files(&self, files: &[String]) -> Result<Vec<PathBuf>> {
        let mut unique: HashMap<String, PathBuf> = HashMap::with_capacity(files.len());
        for raw in files {
            let name = file_name(Path::new(raw))?;
            let absolute = std::path::absolute(Path::new(raw))
                .map_err(|e| ClientError::Io(format!("cannot resolve {raw}: {e}")))?;
            unique.insert(name, absolute);
        }

        for known in self.catalog.list_files().await? {
            unique.remove(&known.name);
        }

        Ok(unique.into_values().collect())
    }
}

async fn upload_one_file(
    client: &GrpcClient,
    catalog: &dyn Catalog,
    sync_directory: &Path,
    user: &UserData,
    path: &Path,
) -> Result<()> {
    let (data, name) = copy_file(path, sync_directory).await?;
    let destination = sync_directory.join(&name);

    let payload = TypedPayload::Binary {
        name: name.clone(),
        bytes: data,
    };

    let uploaded = upload_payload(client, user, &payload).await;
    let (id, key, salt) = match uploaded {
        Ok(parts) => parts,
        Err(e) => {
            // The copy is only the local mirror of a successful upload.
            let _ = tokio::fs::remove_file(&destination).await;
            return Err(e);
        }
    };

    info!(resource_id = %id, name = %name, "file uploaded");

    let result = catalog
        .add_file(&FileData {
            id,
            user_id: user.user_id.clone(),
            name,
            path: destination.to_string_lossy().to_string(),
            key,
            salt,
        })
        .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&destination).await;
    }
    result
}

/// Seal a payload and stream it to the server. Returns the assigned id and
/// the per-blob key material.
async fn upload_payload(
    client: &GrpcClient,
    user: &UserData,
    payload: &TypedPayload,
) -> Result<(String, Vec<u8>, Vec<u8>)> {
    let sealed = envelope::seal(&user.master_key, &payload.encode())?;
    let auth = UserAuthorization::from(user);

    let upload = client
        .store(&auth, sealed.salt.clone(), sealed.data.len() as u64)
        .await?;

    for chunk in sealed.data.chunks(UPLOAD_CHUNK_SIZE) {
        if upload.send_chunk(chunk.to_vec()).await.is_err() {
            // The server closed the stream; finish() reports its status.
            break;
        }
    }

    let id = upload.finish().await?;
    Ok((id, sealed.key.to_vec(), sealed.salt))
}

/// Read a file and write its copy into the sync directory.
async fn copy_file(path: &Path, sync_directory: &Path) -> Result<(Vec<u8>, String)> {
    let name = file_name(path)?;

    let buffer = tokio::fs::read(path)
        .await
        .map_err(|e| ClientError::Io(format!("failed to read {}: {e}", path.display())))?;

    if buffer.len() < MINIMAL_FILE_SIZE {
        return Err(ClientError::Io(format!(
            "bad file size: file({}) size({})",
            path.display(),
            buffer.len()
        )));
    }

    let destination = sync_directory.join(&name);
    tokio::fs::write(&destination, &buffer)
        .await
        .map_err(|e| ClientError::Io(format!("failed to copy to {}: {e}", destination.display())))?;

    Ok((buffer, name))
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            ClientError::Io(format!(
                "failed to prepare file name for a path: {}",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(file_name(Path::new("/a/b/c.txt")).unwrap(), "c.txt");
        assert_eq!(file_name(Path::new("plain.bin")).unwrap(), "plain.bin");
        assert!(file_name(Path::new("/")).is_err());
    }

    #[tokio::test]
    async fn test_copy_file_rejects_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("empty.bin");
        tokio::fs::write(&source, b"").await.unwrap();

        let result = copy_file(&source, dir.path()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_copy_file_mirrors_content() {
        let dir = tempfile::tempdir().unwrap();
        let sync_dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.pdf");
        tokio::fs::write(&source, b"content").await.unwrap();

        let (data, name) = copy_file(&source, sync_dir.path()).await.unwrap();
        assert_eq!(data, b"content");
        assert_eq!(name, "doc.pdf");

        let mirrored = tokio::fs::read(sync_dir.path().join("doc.pdf")).await.unwrap();
        assert_eq!(mirrored, b"content");
    }
}
