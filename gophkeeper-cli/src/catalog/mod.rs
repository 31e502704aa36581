pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;

/// The authenticated session and master key, one row per catalog.
#[derive(Debug, Clone, Default)]
pub struct UserData {
    pub user_id: String,
    pub token: String,
    pub refresh_token: String,
    pub master_key: Vec<u8>,
    pub key_salt: Vec<u8>,
}

/// A locally known uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileData {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub path: String,
    pub key: Vec<u8>,
    pub salt: Vec<u8>,
}

/// A locally known card record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardData {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub number: String,
    pub holder: String,
    pub expiry_date: String,
    pub security_code: String,
}

/// A locally known credential record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialData {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub password: String,
    pub uri: String,
    pub description: String,
}

/// The client's local catalog: plaintext metadata for every resource the
/// user owns, plus the single session row.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn user_data(&self) -> Result<UserData>;
    async fn set_user_data(&self, user: &UserData) -> Result<()>;

    async fn add_file(&self, data: &FileData) -> Result<()>;
    async fn list_files(&self) -> Result<Vec<FileData>>;
    async fn delete_file(&self, id: &str) -> Result<()>;
    async fn file_data(&self, id: &str) -> Result<FileData>;

    async fn add_card(&self, data: &CardData) -> Result<()>;
    async fn list_cards(&self) -> Result<Vec<CardData>>;
    async fn delete_card(&self, id: &str) -> Result<()>;

    async fn add_credentials(&self, data: &CredentialData) -> Result<()>;
    async fn list_credentials(&self) -> Result<Vec<CredentialData>>;
    async fn delete_credentials(&self, id: &str) -> Result<()>;
}
