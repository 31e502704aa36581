use std::sync::Arc;

use tracing::info;

use gophkeeper_core::crypto::master_key::generate_master_key;

use crate::catalog::{Catalog, UserData};
use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::transport::GrpcClient;

/// Register a new account: derive a fresh master key, send its salt to the
/// server, and persist the authenticated session locally.
pub async fn run(
    config: &Config,
    catalog: Arc<dyn Catalog>,
    login: &str,
    password: &str,
    master_password: String,
) -> Result<()> {
    // The slow KDF runs off the reactor.
    let secret = tokio::task::spawn_blocking(move || generate_master_key(master_password.as_bytes()))
        .await
        .map_err(|e| ClientError::Io(format!("key derivation task failed: {e}")))??;

    let client = GrpcClient::connect(&config.server).await?;
    let auth = client.register(login, password, &secret.salt).await?;

    catalog
        .set_user_data(&UserData {
            user_id: auth.user_id.clone(),
            token: auth.token,
            refresh_token: auth.refresh_token,
            master_key: secret.key.clone(),
            key_salt: secret.salt.clone(),
        })
        .await?;

    info!(user_id = %auth.user_id, "registered");
    println!("Registered successfully. User ID: {}", auth.user_id);

    Ok(())
}
