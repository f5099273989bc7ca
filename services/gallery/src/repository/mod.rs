//! Narrow persistence seams injected into the catalog and the authenticator.
//!
//! PostgreSQL and S3 back the running service; the in-memory
//! implementations stand in for them in tests.

pub mod memory;
pub mod postgres;
pub mod s3;

use crate::error::Result;
use crate::models::{AdminAccount, Event, NewEvent, NewPhoto, Photo, Session};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::{MemoryStorage, MemoryStore};
pub use postgres::PgStore;
pub use s3::S3Storage;

/// Event records
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Insert an event and return it with its assigned ID
    async fn insert_event(&self, event: NewEvent) -> Result<Event>;

    async fn get_event(&self, id: i64) -> Result<Option<Event>>;

    /// All events, newest first
    async fn list_events(&self) -> Result<Vec<Event>>;

    /// Events whose slug equals `slug` ignoring case
    async fn find_events_by_slug(&self, slug: &str) -> Result<Vec<Event>>;

    /// Delete the event record only; returns false when nothing matched
    async fn delete_event(&self, id: i64) -> Result<bool>;

    /// Cheap connectivity check for readiness
    async fn ping(&self) -> Result<()>;
}

/// Photo records
#[async_trait]
pub trait PhotoRepository: Send + Sync {
    async fn insert_photo(&self, photo: NewPhoto) -> Result<Photo>;

    async fn get_photo(&self, id: i64) -> Result<Option<Photo>>;

    /// Photos of one event, oldest first
    async fn list_photos(&self, event_id: i64) -> Result<Vec<Photo>>;

    async fn delete_photo(&self, id: i64) -> Result<bool>;
}

/// Admin accounts and their sessions
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_admin(&self, email: &str) -> Result<Option<AdminAccount>>;

    /// Create the admin or replace its password hash
    async fn upsert_admin(&self, email: &str, password_hash: &str) -> Result<AdminAccount>;

    async fn insert_session(&self, session: &Session) -> Result<()>;

    async fn find_session(&self, token: Uuid) -> Result<Option<Session>>;

    async fn delete_session(&self, token: Uuid) -> Result<()>;

    /// Delete every session expiring at or before `now`; returns how many
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Binary object storage for covers and photos
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `data` under `key`. Without `upsert` an existing object is an error.
    async fn upload(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        upsert: bool,
    ) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Public retrieval URL for `key`; does not check existence
    fn public_url(&self, key: &str) -> String;

    /// URL that serves `key` as a download named `filename`
    async fn download_url(&self, key: &str, filename: &str) -> Result<String>;
}

/// Content type for an uploaded file, from its extension
pub fn content_type_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("IMG_0001.JPG"), "image/jpeg");
        assert_eq!(content_type_for("scan.png"), "image/png");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
        assert_eq!(content_type_for("archive.tar.gz"), "application/octet-stream");
    }
}
