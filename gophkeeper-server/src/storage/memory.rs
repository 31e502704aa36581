//! In-memory storage backend.
//!
//! Implements the same trait contract as the Postgres backend, including
//! commit-on-close for writes and ownership-scoped reads. Used by tests and
//! usable as a throwaway single-process backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use super::{ResourceEntry, ResourceId, ResourceReader, ResourceStore, ResourceWriter, User, UserId, UserStore};
use crate::error::{Result, ServerError};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    logins: HashMap<String, Uuid>,
    resources: HashMap<Uuid, StoredResource>,
}

struct StoredResource {
    user_id: Uuid,
    salt: Vec<u8>,
    data: Vec<u8>,
    is_deleted: bool,
}

#[derive(Default, Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic mid-update; propagating the panic is
        // the only sound option for an in-memory store.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl UserStore for MemoryStorage {
    async fn add(
        &self,
        login: &str,
        key_salt: &[u8],
        auth_salt: &[u8],
        verifier: &[u8],
    ) -> Result<UserId> {
        let mut inner = self.lock();

        if inner.logins.contains_key(login) {
            return Err(ServerError::UserAlreadyExists(login.to_string()));
        }

        let id = Uuid::new_v4();
        inner.logins.insert(login.to_string(), id);
        inner.users.insert(
            id,
            User {
                id: UserId(id),
                login: login.to_string(),
                key_salt: key_salt.to_vec(),
                auth_salt: auth_salt.to_vec(),
                verifier: verifier.to_vec(),
                is_deleted: false,
            },
        );

        Ok(UserId(id))
    }

    async fn get_by_login(&self, login: &str) -> Result<User> {
        let inner = self.lock();
        inner
            .logins
            .get(login)
            .and_then(|id| inner.users.get(id))
            .filter(|u| !u.is_deleted)
            .cloned()
            .ok_or(ServerError::NotFound)
    }

    async fn get_by_id(&self, id: UserId) -> Result<User> {
        let inner = self.lock();
        inner
            .users
            .get(&id.0)
            .filter(|u| !u.is_deleted)
            .cloned()
            .ok_or(ServerError::NotFound)
    }
}

#[async_trait]
impl ResourceStore for MemoryStorage {
    async fn create(&self, user: UserId, salt: &[u8]) -> Result<Box<dyn ResourceWriter>> {
        Ok(Box::new(MemoryWriter {
            store: self.clone(),
            id: ResourceId(Uuid::new_v4()),
            user,
            salt: salt.to_vec(),
            buffer: Vec::new(),
        }))
    }

    async fn open(&self, user: UserId, id: ResourceId) -> Result<Box<dyn ResourceReader>> {
        let inner = self.lock();
        let resource = inner
            .resources
            .get(&id.0)
            .filter(|r| r.user_id == user.0 && !r.is_deleted)
            .ok_or(ServerError::NotFound)?;

        Ok(Box::new(MemoryReader {
            id,
            salt: resource.salt.clone(),
            data: resource.data.clone(),
            pos: 0,
        }))
    }

    async fn list(&self, user: UserId) -> Result<Vec<ResourceEntry>> {
        let inner = self.lock();
        Ok(inner
            .resources
            .iter()
            .filter(|(_, r)| r.user_id == user.0 && !r.is_deleted)
            .map(|(id, r)| ResourceEntry {
                id: ResourceId(*id),
                salt: r.salt.clone(),
            })
            .collect())
    }

    async fn delete(&self, user: UserId, id: ResourceId) -> Result<()> {
        let mut inner = self.lock();
        if let Some(resource) = inner
            .resources
            .get_mut(&id.0)
            .filter(|r| r.user_id == user.0)
        {
            resource.is_deleted = true;
        }
        Ok(())
    }
}

struct MemoryWriter {
    store: MemoryStorage,
    id: ResourceId,
    user: UserId,
    salt: Vec<u8>,
    buffer: Vec<u8>,
}

#[async_trait]
impl ResourceWriter for MemoryWriter {
    fn id(&self) -> ResourceId {
        self.id
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut inner = self.store.lock();
        inner.resources.insert(
            self.id.0,
            StoredResource {
                user_id: self.user.0,
                salt: self.salt,
                data: self.buffer,
                is_deleted: false,
            },
        );
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryReader {
    id: ResourceId,
    salt: Vec<u8>,
    data: Vec<u8>,
    pos: usize,
}

#[async_trait]
impl ResourceReader for MemoryReader {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn salt(&self) -> &[u8] {
        &self.salt
    }

    async fn read(&mut self, max: usize) -> Result<Option<Vec<u8>>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }

        let end = (self.pos + max).min(self.data.len());
        let chunk = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(Some(chunk))
    }
}
