pub mod memory;
pub mod pg;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Result, ServerError};

/// Typed user identifier (128-bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(UserId)
            .map_err(|_| ServerError::Unauthenticated("bad user id".to_string()))
    }
}

/// Typed resource identifier (128-bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub Uuid);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ResourceId {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(ResourceId)
            .map_err(|_| ServerError::NotFound)
    }
}

/// A stored user record.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub key_salt: Vec<u8>,
    pub auth_salt: Vec<u8>,
    pub verifier: Vec<u8>,
    pub is_deleted: bool,
}

/// One row of a user's resource listing.
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    pub id: ResourceId,
    pub salt: Vec<u8>,
}

/// Persistence for `(login -> salted verifier, key salt)` records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user; a duplicate login fails with `UserAlreadyExists`.
    async fn add(
        &self,
        login: &str,
        key_salt: &[u8],
        auth_salt: &[u8],
        verifier: &[u8],
    ) -> Result<UserId>;

    /// Look up an active user by login. Soft-deleted rows are invisible.
    async fn get_by_login(&self, login: &str) -> Result<User>;

    /// Look up an active user by id. Soft-deleted rows are invisible.
    async fn get_by_id(&self, id: UserId) -> Result<User>;
}

/// Per-user opaque blob container with streamed reads and writes.
///
/// Ownership isolation is part of the contract: referencing a resource owned
/// by a different user yields the same `NotFound` as a missing one.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Allocate a new resource and return a handle for streamed writes.
    /// Nothing is visible until the handle commits.
    async fn create(&self, user: UserId, salt: &[u8]) -> Result<Box<dyn ResourceWriter>>;

    /// Open an active resource owned by `user` for streamed reads.
    async fn open(&self, user: UserId, id: ResourceId) -> Result<Box<dyn ResourceReader>>;

    /// Enumerate the active resources of `user`.
    async fn list(&self, user: UserId) -> Result<Vec<ResourceEntry>>;

    /// Idempotent soft-delete.
    async fn delete(&self, user: UserId, id: ResourceId) -> Result<()>;
}

/// Write side of a resource handle. Dropping without `commit` aborts the
/// upload and leaves no committed blob.
#[async_trait]
pub trait ResourceWriter: Send {
    fn id(&self) -> ResourceId;

    async fn write(&mut self, chunk: &[u8]) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Read side of a resource handle.
#[async_trait]
pub trait ResourceReader: Send + std::fmt::Debug {
    fn id(&self) -> ResourceId;

    fn salt(&self) -> &[u8];

    /// Read up to `max` bytes. `None` signals end of stream.
    async fn read(&mut self, max: usize) -> Result<Option<Vec<u8>>>;
}
