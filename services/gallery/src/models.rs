use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One photographed occasion with its own gallery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Event {
    /// Server-assigned event ID
    pub id: i64,
    /// Display name
    pub name: String,
    /// URL-safe identifier derived from the name
    pub slug: String,
    /// Calendar date of the occasion
    pub event_date: Option<NaiveDate>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Object key of the cover image; a naming convention, not a column
    pub fn cover_key(&self) -> String {
        cover_key(self.id)
    }
}

pub fn cover_key(event_id: i64) -> String {
    format!("{}/cover.jpg", event_id)
}

/// Fields supplied when inserting an event
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub name: String,
    pub slug: String,
    pub event_date: Option<NaiveDate>,
}

/// A stored photo belonging to an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Photo {
    /// Server-assigned photo ID
    pub id: i64,
    /// Owning event ID
    pub event_id: i64,
    /// Object key: `{event_id}/{folder}/{timestamp}-{filename}`
    pub file_path: String,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when inserting a photo
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub event_id: i64,
    pub file_path: String,
}

/// A file received from the client, held in memory until uploaded
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.filename.is_empty() && self.data.is_empty()
    }
}

/// Administrator credentials as stored
#[derive(Debug, Clone, FromRow)]
pub struct AdminAccount {
    pub id: i64,
    pub email: String,
    /// Argon2 PHC string
    pub password_hash: String,
}

/// An authenticated admin session
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Session {
    /// Opaque token carried in the session cookie
    #[serde(skip)]
    pub token: Uuid,
    pub admin_id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
