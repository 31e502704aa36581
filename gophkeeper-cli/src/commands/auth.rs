use std::sync::Arc;

use tracing::info;

use gophkeeper_core::crypto::master_key::recover_master_key;

use crate::catalog::{Catalog, UserData};
use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::transport::GrpcClient;

/// Sign in to an existing account: the server returns the key salt, from
/// which the master key is re-derived on this device.
pub async fn run(
    config: &Config,
    catalog: Arc<dyn Catalog>,
    login: &str,
    password: &str,
    master_password: String,
) -> Result<()> {
    let client = GrpcClient::connect(&config.server).await?;
    let auth = client.authorize(login, password).await?;

    let salt = auth.salt.clone();
    let secret =
        tokio::task::spawn_blocking(move || recover_master_key(master_password.as_bytes(), &salt))
            .await
            .map_err(|e| ClientError::Io(format!("key derivation task failed: {e}")))??;

    catalog
        .set_user_data(&UserData {
            user_id: auth.user_id.clone(),
            token: auth.token,
            refresh_token: auth.refresh_token,
            master_key: secret.key.clone(),
            key_salt: secret.salt.clone(),
        })
        .await?;

    info!(user_id = %auth.user_id, "authorized");
    println!("Signed in successfully.");

    Ok(())
}
