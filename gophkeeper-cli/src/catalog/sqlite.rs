use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::debug;

use super::{CardData, Catalog, CredentialData, FileData, UserData};
use crate::error::{ClientError, Result};

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS user (
        user_id       TEXT PRIMARY KEY,
        token         TEXT,
        refresh_token TEXT,
        master_key    BLOB,
        key_salt      BLOB,
        last_sync_ts  BIGINT
    )",
    "CREATE TABLE IF NOT EXISTS files (
        id       TEXT PRIMARY KEY,
        user_id  TEXT,
        name     TEXT,
        path     TEXT,
        key      BLOB,
        salt     BLOB,
        added_ts BIGINT
    )",
    "CREATE TABLE IF NOT EXISTS cards (
        id            TEXT PRIMARY KEY,
        user_id       TEXT,
        name          TEXT,
        number        TEXT,
        holder        TEXT,
        security_code TEXT,
        expiry_date   TEXT,
        added_ts      BIGINT
    )",
    "CREATE TABLE IF NOT EXISTS creds (
        id          TEXT PRIMARY KEY,
        user_id     TEXT,
        username    TEXT,
        password    TEXT,
        uri         TEXT,
        description TEXT,
        added_ts    BIGINT
    )",
];

/// Local catalog backed by SQLite.
///
/// Synchronous rusqlite calls are wrapped in `tokio::task::spawn_blocking`;
/// writes within the process serialize on the connection mutex.
pub struct SqliteCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalog {
    /// Open (or create) the catalog database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| ClientError::Catalog(format!("open catalog failed: {e}")))?;

        for migration in MIGRATIONS {
            conn.execute(migration, [])
                .map_err(|e| ClientError::Catalog(format!("catalog migration failed: {e}")))?;
        }

        // Enable WAL mode for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| ClientError::Catalog(format!("set WAL mode failed: {e}")))?;

        debug!("opened catalog at {}", db_path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            op(&conn)
        })
        .await
        .map_err(|e| ClientError::Catalog(format!("spawn_blocking failed: {e}")))?
    }
}

fn catalog_err(e: rusqlite::Error) -> ClientError {
    ClientError::Catalog(e.to_string())
}

#[async_trait::async_trait]
impl Catalog for SqliteCatalog {
    async fn user_data(&self) -> Result<UserData> {
        self.blocking(|conn| {
            let result = conn.query_row(
                "SELECT user_id, token, refresh_token, master_key, key_salt FROM user",
                [],
                |row| {
                    Ok(UserData {
                        user_id: row.get(0)?,
                        token: row.get(1)?,
                        refresh_token: row.get(2)?,
                        master_key: row.get(3)?,
                        key_salt: row.get(4)?,
                    })
                },
            );

            match result {
                Ok(user) => Ok(user),
                Err(rusqlite::Error::QueryReturnedNoRows) => Err(ClientError::NotLoggedIn),
                Err(e) => Err(catalog_err(e)),
            }
        })
        .await
    }

    async fn set_user_data(&self, user: &UserData) -> Result<()> {
        let user = user.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO user (user_id, token, refresh_token, master_key, key_salt, last_sync_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id) DO UPDATE SET
                     token = excluded.token,
                     refresh_token = excluded.refresh_token,
                     master_key = excluded.master_key,
                     key_salt = excluded.key_salt,
                     last_sync_ts = excluded.last_sync_ts",
                rusqlite::params![
                    user.user_id,
                    user.token,
                    user.refresh_token,
                    user.master_key,
                    user.key_salt,
                    Utc::now().timestamp(),
                ],
            )
            .map_err(catalog_err)?;
            Ok(())
        })
        .await
    }

    async fn add_file(&self, data: &FileData) -> Result<()> {
        let data = data.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO files (id, user_id, name, path, key, salt, added_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    data.id,
                    data.user_id,
                    data.name,
                    data.path,
                    data.key,
                    data.salt,
                    Utc::now().timestamp(),
                ],
            )
            .map_err(catalog_err)?;
            Ok(())
        })
        .await
    }

    async fn list_files(&self) -> Result<Vec<FileData>> {
        self.blocking(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, user_id, name, path, key, salt FROM files")
                .map_err(catalog_err)?;

            let files = stmt
                .query_map([], |row| {
                    Ok(FileData {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        name: row.get(2)?,
                        path: row.get(3)?,
                        key: row.get(4)?,
                        salt: row.get(5)?,
                    })
                })
                .map_err(catalog_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(catalog_err)?;

            Ok(files)
        })
        .await
    }

    async fn delete_file(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM files WHERE id = ?1", rusqlite::params![id])
                .map_err(catalog_err)?;
            Ok(())
        })
        .await
    }

    async fn file_data(&self, id: &str) -> Result<FileData> {
        let id = id.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT id, user_id, name, path, key, salt FROM files WHERE id = ?1",
                rusqlite::params![id],
                |row| {
                    Ok(FileData {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        name: row.get(2)?,
                        path: row.get(3)?,
                        key: row.get(4)?,
                        salt: row.get(5)?,
                    })
                },
            )
            .map_err(catalog_err)
        })
        .await
    }

    async fn add_card(&self, data: &CardData) -> Result<()> {
        let data = data.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO cards (id, user_id, name, number, holder, security_code, expiry_date, added_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    data.id,
                    data.user_id,
                    data.name,
                    data.number,
                    data.holder,
                    data.security_code,
                    data.expiry_date,
                    Utc::now().timestamp(),
                ],
            )
            .map_err(catalog_err)?;
            Ok(())
        })
        .await
    }

    async fn list_cards(&self) -> Result<Vec<CardData>> {
        self.blocking(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, user_id, name, number, holder, security_code, expiry_date FROM cards",
                )
                .map_err(catalog_err)?;

            let cards = stmt
                .query_map([], |row| {
                    Ok(CardData {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        name: row.get(2)?,
                        number: row.get(3)?,
                        holder: row.get(4)?,
                        security_code: row.get(5)?,
                        expiry_date: row.get(6)?,
                    })
                })
                .map_err(catalog_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(catalog_err)?;

            Ok(cards)
        })
        .await
    }

    async fn delete_card(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM cards WHERE id = ?1", rusqlite::params![id])
                .map_err(catalog_err)?;
            Ok(())
        })
        .await
    }

    async fn add_credentials(&self, data: &CredentialData) -> Result<()> {
        let data = data.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO creds (id, user_id, username, password, uri, description, added_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    data.id,
                    data.user_id,
                    data.username,
                    data.password,
                    data.uri,
                    data.description,
                    Utc::now().timestamp(),
                ],
            )
            .map_err(catalog_err)?;
            Ok(())
        })
        .await
    }

    async fn list_credentials(&self) -> Result<Vec<CredentialData>> {
        self.blocking(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, user_id, username, password, uri, description FROM creds")
                .map_err(catalog_err)?;

            let creds = stmt
                .query_map([], |row| {
                    Ok(CredentialData {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        username: row.get(2)?,
                        password: row.get(3)?,
                        uri: row.get(4)?,
                        description: row.get(5)?,
                    })
                })
                .map_err(catalog_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(catalog_err)?;

            Ok(creds)
        })
        .await
    }

    async fn delete_credentials(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM creds WHERE id = ?1", rusqlite::params![id])
                .map_err(catalog_err)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, SqliteCatalog) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = SqliteCatalog::open(&dir.path().join("catalog.db")).unwrap();
        (dir, catalog)
    }

    fn user() -> UserData {
        UserData {
            user_id: "user-1".to_string(),
            token: "tok".to_string(),
            refresh_token: "refresh".to_string(),
            master_key: vec![7u8; 64],
            key_salt: vec![8u8; 64],
        }
    }

    #[tokio::test]
    async fn test_user_row_upserts() {
        let (_dir, catalog) = open_temp();

        assert!(matches!(
            catalog.user_data().await.unwrap_err(),
            ClientError::NotLoggedIn
        ));

        catalog.set_user_data(&user()).await.unwrap();

        let mut updated = user();
        updated.token = "fresh-token".to_string();
        catalog.set_user_data(&updated).await.unwrap();

        let loaded = catalog.user_data().await.unwrap();
        assert_eq!(loaded.token, "fresh-token");
        assert_eq!(loaded.master_key, vec![7u8; 64]);
    }

    #[tokio::test]
    async fn test_file_crud() {
        let (_dir, catalog) = open_temp();

        let file = FileData {
            id: "f1".to_string(),
            user_id: "user-1".to_string(),
            name: "a.bin".to_string(),
            path: "/tmp/sync/a.bin".to_string(),
            key: vec![1; 32],
            salt: vec![2; 64],
        };
        catalog.add_file(&file).await.unwrap();

        assert_eq!(catalog.list_files().await.unwrap(), vec![file.clone()]);
        assert_eq!(catalog.file_data("f1").await.unwrap(), file);

        catalog.delete_file("f1").await.unwrap();
        assert!(catalog.list_files().await.unwrap().is_empty());
        assert!(catalog.file_data("f1").await.is_err());
    }

    #[tokio::test]
    async fn test_card_crud() {
        let (_dir, catalog) = open_temp();

        let card = CardData {
            id: "c1".to_string(),
            user_id: "user-1".to_string(),
            name: "Test".to_string(),
            number: "5555 5555 5555 5555".to_string(),
            holder: "Jane Doe".to_string(),
            expiry_date: "11/22".to_string(),
            security_code: "111".to_string(),
        };
        catalog.add_card(&card).await.unwrap();
        assert_eq!(catalog.list_cards().await.unwrap(), vec![card]);

        catalog.delete_card("c1").await.unwrap();
        assert!(catalog.list_cards().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_credentials_crud() {
        let (_dir, catalog) = open_temp();

        let cred = CredentialData {
            id: "p1".to_string(),
            user_id: "user-1".to_string(),
            username: "uu1".to_string(),
            password: "sjksjs".to_string(),
            uri: "snshjs".to_string(),
            description: "d".to_string(),
        };
        catalog.add_credentials(&cred).await.unwrap();
        assert_eq!(catalog.list_credentials().await.unwrap(), vec![cred]);

        catalog.delete_credentials("p1").await.unwrap();
        assert!(catalog.list_credentials().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let (_dir, catalog) = open_temp();

        let file = FileData {
            id: "dup".to_string(),
            user_id: "user-1".to_string(),
            name: "x".to_string(),
            path: "/x".to_string(),
            key: vec![],
            salt: vec![],
        };
        catalog.add_file(&file).await.unwrap();
        assert!(catalog.add_file(&file).await.is_err());
    }
}
