pub mod grpc;

pub use grpc::{GrpcClient, ResourceDownload, ResourceFrame, ResourceUpload};

use crate::catalog::UserData;

/// The session credentials attached to every storage call.
#[derive(Debug, Clone)]
pub struct UserAuthorization {
    pub user_id: String,
    pub token: String,
    pub refresh_token: String,
    pub salt: Vec<u8>,
}

impl From<&UserData> for UserAuthorization {
    fn from(user: &UserData) -> Self {
        Self {
            user_id: user.user_id.clone(),
            token: user.token.clone(),
            refresh_token: user.refresh_token.clone(),
            salt: user.key_salt.clone(),
        }
    }
}
