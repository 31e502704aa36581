use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use gophkeeper_core::crypto::envelope;
use gophkeeper_core::payload::TypedPayload;

use crate::catalog::{CardData, Catalog, CredentialData, FileData, UserData};
use crate::error::{ClientError, Result};
use crate::transport::{GrpcClient, UserAuthorization};

/// Pulls one resource at a time from the server, opens the envelope, and
/// persists the typed payload into the right catalog table.
pub struct Downloader {
    client: Arc<GrpcClient>,
    catalog: Arc<dyn Catalog>,
    sync_directory: PathBuf,
    operation_timeout: Duration,
}

impl Downloader {
    pub fn new(
        client: Arc<GrpcClient>,
        catalog: Arc<dyn Catalog>,
        sync_directory: &Path,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            client,
            catalog,
            sync_directory: sync_directory.to_path_buf(),
            operation_timeout,
        }
    }

    pub async fn download(&self, user: &UserData, resource_id: &str) -> Result<()> {
        let auth = UserAuthorization::from(user);
        let mut stream = self
            .client
            .get(&auth, resource_id, self.operation_timeout)
            .await?;

        // Stream contract: salt first, chunks next, byte count as trailer.
        let mut salt: Option<Vec<u8>> = None;
        let mut buffer = Vec::new();
        let mut received = 0u64;

        loop {
            let frame = stream.recv().await?.ok_or_else(|| {
                ClientError::Protocol("stream ended before the size trailer".to_string())
            })?;

            if let Some(frame_salt) = frame.salt {
                if salt.is_some() {
                    return Err(ClientError::Protocol(
                        "salt has already been received".to_string(),
                    ));
                }
                salt = Some(frame_salt);
                continue;
            }

            if let Some(declared) = frame.size {
                if declared != received {
                    return Err(ClientError::BadLength {
                        received,
                        declared,
                    });
                }
                break;
            }

            if salt.is_none() {
                return Err(ClientError::Protocol(
                    "data received before the blob salt".to_string(),
                ));
            }

            received += frame.data.len() as u64;
            buffer.extend_from_slice(&frame.data);
        }

        let salt = salt
            .ok_or_else(|| ClientError::Protocol("no blob salt received".to_string()))?;

        let opened = envelope::open(&user.master_key, &salt, &buffer)?;
        let payload = TypedPayload::decode(&opened.plaintext)?;

        debug!(resource_id, bytes = received, "resource downloaded");

        match payload {
            TypedPayload::Binary { name, bytes } => {
                let destination = self.sync_directory.join(&name);
                if let Err(e) = tokio::fs::write(&destination, &bytes).await {
                    // Best effort: do not leave a partial file behind.
                    let _ = tokio::fs::remove_file(&destination).await;
                    return Err(ClientError::Io(format!(
                        "failed to write {}: {e}",
                        destination.display()
                    )));
                }

                self.catalog
                    .add_file(&FileData {
                        id: resource_id.to_string(),
                        user_id: user.user_id.clone(),
                        name,
                        path: destination.to_string_lossy().to_string(),
                        key: opened.key.to_vec(),
                        salt,
                    })
                    .await
            }
            TypedPayload::Card(card) => {
                self.catalog
                    .add_card(&CardData {
                        id: resource_id.to_string(),
                        user_id: user.user_id.clone(),
                        name: card.name,
                        number: card.number,
                        holder: card.holder,
                        expiry_date: card.expiry_date,
                        security_code: card.security_code.unwrap_or_default(),
                    })
                    .await
            }
            TypedPayload::Credentials(cred) => {
                self.catalog
                    .add_credentials(&CredentialData {
                        id: resource_id.to_string(),
                        user_id: user.user_id.clone(),
                        username: cred.username,
                        password: cred.password,
                        uri: cred.uri,
                        description: cred.description.unwrap_or_default(),
                    })
                    .await
            }
        }
    }
}
