//! In-process implementations of the repository traits.
//!
//! They mirror the PostgreSQL and S3 behaviour closely enough to exercise
//! the catalog and the HTTP layer without external services.

use crate::error::{Error, Result};
use crate::models::{AdminAccount, Event, NewEvent, NewPhoto, Photo, Session};
use crate::repository::{EventRepository, ObjectStorage, PhotoRepository, SessionRepository};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    next_event_id: i64,
    next_photo_id: i64,
    next_admin_id: i64,
    events: BTreeMap<i64, Event>,
    photos: BTreeMap<i64, Photo>,
    admins: HashMap<String, AdminAccount>,
    sessions: HashMap<Uuid, Session>,
}

/// Record store held in memory
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn insert_event(&self, event: NewEvent) -> Result<Event> {
        let mut tables = self.tables.lock();
        tables.next_event_id += 1;
        let event = Event {
            id: tables.next_event_id,
            name: event.name,
            slug: event.slug,
            event_date: event.event_date,
            created_at: Utc::now(),
        };
        tables.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn get_event(&self, id: i64) -> Result<Option<Event>> {
        Ok(self.tables.lock().events.get(&id).cloned())
    }

    async fn list_events(&self) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self.tables.lock().events.values().cloned().collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(events)
    }

    async fn find_events_by_slug(&self, slug: &str) -> Result<Vec<Event>> {
        let slug = slug.to_lowercase();
        Ok(self
            .tables
            .lock()
            .events
            .values()
            .filter(|e| e.slug.to_lowercase() == slug)
            .cloned()
            .collect())
    }

    async fn delete_event(&self, id: i64) -> Result<bool> {
        Ok(self.tables.lock().events.remove(&id).is_some())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl PhotoRepository for MemoryStore {
    async fn insert_photo(&self, photo: NewPhoto) -> Result<Photo> {
        let mut tables = self.tables.lock();
        tables.next_photo_id += 1;
        let photo = Photo {
            id: tables.next_photo_id,
            event_id: photo.event_id,
            file_path: photo.file_path,
            created_at: Utc::now(),
        };
        tables.photos.insert(photo.id, photo.clone());
        Ok(photo)
    }

    async fn get_photo(&self, id: i64) -> Result<Option<Photo>> {
        Ok(self.tables.lock().photos.get(&id).cloned())
    }

    async fn list_photos(&self, event_id: i64) -> Result<Vec<Photo>> {
        let mut photos: Vec<Photo> = self
            .tables
            .lock()
            .photos
            .values()
            .filter(|p| p.event_id == event_id)
            .cloned()
            .collect();
        photos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(photos)
    }

    async fn delete_photo(&self, id: i64) -> Result<bool> {
        Ok(self.tables.lock().photos.remove(&id).is_some())
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn find_admin(&self, email: &str) -> Result<Option<AdminAccount>> {
        Ok(self.tables.lock().admins.get(&email.to_lowercase()).cloned())
    }

    async fn upsert_admin(&self, email: &str, password_hash: &str) -> Result<AdminAccount> {
        let mut tables = self.tables.lock();
        let key = email.to_lowercase();
        if let Some(admin) = tables.admins.get_mut(&key) {
            admin.password_hash = password_hash.to_string();
            return Ok(admin.clone());
        }

        tables.next_admin_id += 1;
        let admin = AdminAccount {
            id: tables.next_admin_id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
        };
        tables.admins.insert(key, admin.clone());
        Ok(admin)
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        self.tables
            .lock()
            .sessions
            .insert(session.token, session.clone());
        Ok(())
    }

    async fn find_session(&self, token: Uuid) -> Result<Option<Session>> {
        Ok(self.tables.lock().sessions.get(&token).cloned())
    }

    async fn delete_session(&self, token: Uuid) -> Result<()> {
        self.tables.lock().sessions.remove(&token);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock();
        let before = tables.sessions.len();
        tables.sessions.retain(|_, session| !session.is_expired_at(now));
        Ok((before - tables.sessions.len()) as u64)
    }
}

/// Object storage held in memory
pub struct MemoryStorage {
    base_url: String,
    objects: Mutex<HashMap<String, StoredObject>>,
    /// Keys containing any of these fragments are rejected on upload
    failing: Mutex<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
}

impl MemoryStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
            failing: Mutex::new(Vec::new()),
        }
    }

    /// Reject future uploads whose key contains `fragment`
    pub fn fail_uploads_matching(&self, fragment: impl Into<String>) {
        self.failing.lock().push(fragment.into());
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().get(key).cloned()
    }

    /// Stored keys in lexical order
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(&self, key: &str, data: Bytes, content_type: &str, upsert: bool) -> Result<()> {
        if self.failing.lock().iter().any(|f| key.contains(f.as_str())) {
            return Err(Error::Storage(format!("Upload rejected for {}", key)));
        }

        let mut objects = self.objects.lock();
        if !upsert && objects.contains_key(key) {
            return Err(Error::Storage(format!("The resource already exists: {}", key)));
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.objects.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().contains_key(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    async fn download_url(&self, key: &str, filename: &str) -> Result<String> {
        Ok(format!("{}/{}?download={}", self.base_url, key, filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_slug_lookup_ignores_case() {
        let store = MemoryStore::new();
        store
            .insert_event(NewEvent {
                name: "A B".to_string(),
                slug: "a-b".to_string(),
                event_date: None,
            })
            .await
            .unwrap();

        assert_eq!(store.find_events_by_slug("A-B").await.unwrap().len(), 1);
        assert!(store.find_events_by_slug("a-c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_upsert_rejects_existing() {
        let storage = MemoryStorage::new("http://objects.test/");
        storage
            .upload("1/cover.jpg", Bytes::from_static(b"a"), "image/jpeg", false)
            .await
            .unwrap();

        let err = storage
            .upload("1/cover.jpg", Bytes::from_static(b"b"), "image/jpeg", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));

        storage
            .upload("1/cover.jpg", Bytes::from_static(b"c"), "image/jpeg", true)
            .await
            .unwrap();
        assert_eq!(storage.object("1/cover.jpg").unwrap().data, Bytes::from_static(b"c"));
        assert_eq!(storage.public_url("1/cover.jpg"), "http://objects.test/1/cover.jpg");
    }

    #[tokio::test]
    async fn test_admin_upsert_replaces_hash() {
        let store = MemoryStore::new();
        let first = store.upsert_admin("Admin@Example.com", "h1").await.unwrap();
        let second = store.upsert_admin("admin@example.com", "h2").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(
            store.find_admin("ADMIN@example.com").await.unwrap().unwrap().password_hash,
            "h2"
        );
    }
}
