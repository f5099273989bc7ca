//! Event and photo operations behind the admin console and public gallery.
//!
//! Multi-step operations are not transactional. A failure part-way leaves
//! whatever was already committed: an event without its cover, the first
//! files of an upload batch, or a photo record whose object is gone.

use crate::error::{Error, Result};
use crate::grouping::{
    existing_folders, folder_of, group_by_folder, FolderGroup, ADMIN_DEFAULT_FOLDER,
    PUBLIC_DEFAULT_FOLDER,
};
use crate::models::{Event, NewEvent, NewPhoto, Photo, UploadFile};
use crate::qr;
use crate::repository::{content_type_for, EventRepository, ObjectStorage, PhotoRepository};
use crate::slug::{generate_slug, normalize_slug};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Input of the event creation flow
#[derive(Debug, Clone)]
pub struct CreateEvent {
    pub name: String,
    pub event_date: Option<NaiveDate>,
    pub cover: Option<UploadFile>,
}

/// Row of the event directory
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    #[serde(flatten)]
    pub event: Event,
    /// Conventional cover location; the object may not exist
    pub cover_url: String,
}

/// Photo as shown in the admin console
#[derive(Debug, Clone, Serialize)]
pub struct PhotoView {
    pub id: i64,
    pub file_path: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Everything the detail / upload console displays
#[derive(Debug, Clone, Serialize)]
pub struct EventDetail {
    pub event: Event,
    /// `None` when no cover has been uploaded
    pub cover_url: Option<String>,
    pub folders: Vec<FolderGroup<PhotoView>>,
    /// Folder names offered for the next upload
    pub existing_folders: Vec<String>,
    pub gallery_url: String,
    /// PNG QR code of `gallery_url` as a data URL
    pub qr_code: String,
}

/// Photo as shown in the public gallery
#[derive(Debug, Clone, Serialize)]
pub struct PublicPhoto {
    pub id: i64,
    pub url: String,
    pub preview_url: String,
    pub download_url: String,
}

/// Public, read-only gallery of one event
#[derive(Debug, Clone, Serialize)]
pub struct PublicGallery {
    pub name: String,
    pub slug: String,
    pub event_date: Option<NaiveDate>,
    pub folders: Vec<FolderGroup<PublicPhoto>>,
}

/// Full-size preview of one public photo
#[derive(Debug, Clone, Serialize)]
pub struct PhotoPreview {
    pub id: i64,
    pub folder: String,
    pub url: String,
    pub download_url: String,
    pub close_url: String,
}

/// Event and photo operations over injected repositories
pub struct Catalog {
    events: Arc<dyn EventRepository>,
    photos: Arc<dyn PhotoRepository>,
    storage: Arc<dyn ObjectStorage>,
    base_url: String,
    /// Last millisecond handed out for a photo key
    last_key_ms: AtomicI64,
}

impl Catalog {
    pub fn new(
        events: Arc<dyn EventRepository>,
        photos: Arc<dyn PhotoRepository>,
        storage: Arc<dyn ObjectStorage>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            events,
            photos,
            storage,
            base_url: base_url.into(),
            last_key_ms: AtomicI64::new(0),
        }
    }

    /// Base URL used for public gallery links
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Database connectivity check
    pub async fn ping(&self) -> Result<()> {
        self.events.ping().await
    }

    /// Create an event, then store its cover if one was supplied.
    ///
    /// A failed cover upload is returned as an error but the event stays.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_event(&self, request: CreateEvent) -> Result<Event> {
        if request.name.trim().is_empty() {
            return Err(Error::validation("Event name is required."));
        }

        let slug = generate_slug(&request.name);
        let event = self
            .events
            .insert_event(NewEvent {
                name: request.name,
                slug,
                event_date: request.event_date,
            })
            .await?;

        info!(event_id = event.id, slug = %event.slug, "Event created");
        metrics::counter!("gallery.events.created").increment(1);

        if let Some(cover) = request.cover.filter(|c| !c.data.is_empty()) {
            let content_type = upload_content_type(&cover);
            if let Err(e) = self
                .storage
                .upload(&event.cover_key(), cover.data, &content_type, true)
                .await
            {
                warn!(event_id = event.id, error = %e, "Cover upload failed, event kept without cover");
                return Err(e);
            }
            debug!(event_id = event.id, "Cover uploaded");
        }

        Ok(event)
    }

    /// All events, newest first
    pub async fn list_events(&self) -> Result<Vec<EventSummary>> {
        let events = self.events.list_events().await?;
        Ok(events
            .into_iter()
            .map(|event| EventSummary {
                cover_url: self.storage.public_url(&event.cover_key()),
                event,
            })
            .collect())
    }

    /// Delete the event record. Its photos and stored objects are left behind.
    #[instrument(skip(self))]
    pub async fn delete_event(&self, event_id: i64) -> Result<()> {
        if !self.events.delete_event(event_id).await? {
            return Err(Error::not_found("Event not found."));
        }

        info!(event_id, "Event deleted, photos and objects left in place");
        metrics::counter!("gallery.events.deleted").increment(1);
        Ok(())
    }

    pub async fn event(&self, event_id: i64) -> Result<Event> {
        self.events
            .get_event(event_id)
            .await?
            .ok_or_else(|| Error::not_found("Event not found."))
    }

    /// Detail view: event, cover, photos by folder, share link and QR code
    #[instrument(skip(self))]
    pub async fn event_detail(&self, event_id: i64) -> Result<EventDetail> {
        let event = self.event(event_id).await?;
        let photos = self.photos.list_photos(event_id).await?;

        let cover_key = event.cover_key();
        let cover_url = if self.storage.exists(&cover_key).await? {
            Some(self.storage.public_url(&cover_key))
        } else {
            None
        };

        let gallery_url = self.gallery_link(&event);
        let qr_code = qr::render_data_url(&gallery_url)?;
        let existing_folders = existing_folders(&photos);
        let folders = group_by_folder(photos, ADMIN_DEFAULT_FOLDER)
            .into_iter()
            .map(|group| group.map(|photo| self.photo_view(photo)))
            .collect();

        Ok(EventDetail {
            event,
            cover_url,
            folders,
            existing_folders,
            gallery_url,
            qr_code,
        })
    }

    /// Upload files into `folder`, one at a time.
    ///
    /// The first failure ends the batch; files stored before it remain.
    #[instrument(skip(self, files), fields(file_count = files.len()))]
    pub async fn upload_photos(
        &self,
        event_id: i64,
        folder: &str,
        files: Vec<UploadFile>,
    ) -> Result<Vec<Photo>> {
        let folder = folder.trim();
        if folder.is_empty() {
            return Err(Error::validation("Please enter a folder name."));
        }
        if folder.contains('/') {
            return Err(Error::validation("Folder name must not contain '/'."));
        }

        let files: Vec<UploadFile> = files.into_iter().filter(|f| !f.is_empty()).collect();
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let event = self.event(event_id).await?;
        let total = files.len();
        let mut uploaded = Vec::with_capacity(total);

        for file in files {
            match self.store_photo(event.id, folder, file).await {
                Ok(photo) => uploaded.push(photo),
                Err(e) => {
                    warn!(
                        event_id,
                        uploaded = uploaded.len(),
                        skipped = total - uploaded.len() - 1,
                        error = %e,
                        "Upload batch aborted"
                    );
                    return Err(e);
                }
            }
        }

        info!(event_id, folder = %folder, count = uploaded.len(), "Photos uploaded");
        Ok(uploaded)
    }

    async fn store_photo(&self, event_id: i64, folder: &str, file: UploadFile) -> Result<Photo> {
        let key = photo_key(event_id, folder, self.next_key_timestamp(), &file.filename);
        let content_type = upload_content_type(&file);

        self.storage
            .upload(&key, file.data, &content_type, false)
            .await?;
        let photo = self
            .photos
            .insert_photo(NewPhoto {
                event_id,
                file_path: key,
            })
            .await?;

        metrics::counter!("gallery.photos.uploaded").increment(1);
        Ok(photo)
    }

    /// Current time in milliseconds, strictly after every earlier call.
    ///
    /// Two files with the same name uploaded in the same millisecond still
    /// get distinct keys.
    fn next_key_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last_key_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }

    /// Remove the stored object, then the record.
    ///
    /// If the object removal fails the record is kept.
    #[instrument(skip(self))]
    pub async fn delete_photo(&self, event_id: i64, photo_id: i64) -> Result<()> {
        let photo = self
            .photos
            .get_photo(photo_id)
            .await?
            .filter(|p| p.event_id == event_id)
            .ok_or_else(|| Error::not_found("Photo not found."))?;

        self.storage.remove(&photo.file_path).await?;
        if !self.photos.delete_photo(photo.id).await? {
            warn!(photo_id, "Photo record vanished before delete");
        }

        info!(event_id, photo_id, "Photo deleted");
        metrics::counter!("gallery.photos.deleted").increment(1);
        Ok(())
    }

    /// Link encoded in the event's QR code
    pub fn gallery_link(&self, event: &Event) -> String {
        qr::gallery_link(&self.base_url, &event.slug)
    }

    /// QR code PNG and its download filename
    pub async fn qr_code(&self, event_id: i64) -> Result<(String, Vec<u8>)> {
        let event = self.event(event_id).await?;
        let png = qr::render_png(&self.gallery_link(&event))?;
        Ok((qr::download_filename(&event.slug), png))
    }

    /// Resolve an event by slug, ignoring case and surrounding whitespace
    #[instrument(skip(self))]
    pub async fn resolve_slug(&self, slug: &str) -> Result<Event> {
        let slug = normalize_slug(slug);
        let mut matches = self.events.find_events_by_slug(&slug).await?;

        match matches.len() {
            0 => Err(Error::not_found("Event not found.")),
            1 => Ok(matches.remove(0)),
            n => {
                warn!(slug = %slug, matches = n, "Slug is shared by several events");
                Err(Error::Persistence(format!(
                    "Multiple events share the slug '{}'",
                    slug
                )))
            }
        }
    }

    /// Public gallery of the event behind `slug`
    pub async fn public_gallery(&self, slug: &str) -> Result<PublicGallery> {
        let event = self.resolve_slug(slug).await?;
        let photos = self.photos.list_photos(event.id).await?;

        let folders = group_by_folder(photos, PUBLIC_DEFAULT_FOLDER)
            .into_iter()
            .map(|group| group.map(|photo| self.public_photo_view(&event, photo)))
            .collect();

        Ok(PublicGallery {
            name: event.name,
            slug: event.slug,
            event_date: event.event_date,
            folders,
        })
    }

    /// Enlarged view of one public photo
    pub async fn public_preview(&self, slug: &str, photo_id: i64) -> Result<PhotoPreview> {
        let (event, photo) = self.public_photo(slug, photo_id).await?;
        let view = self.public_photo_view(&event, photo.clone());

        Ok(PhotoPreview {
            id: photo.id,
            folder: folder_of(&photo.file_path)
                .unwrap_or(PUBLIC_DEFAULT_FOLDER)
                .to_string(),
            url: view.url,
            download_url: view.download_url,
            close_url: public_gallery_path(&event.slug),
        })
    }

    /// URL serving a public photo as a download
    pub async fn public_download(&self, slug: &str, photo_id: i64) -> Result<String> {
        let (_, photo) = self.public_photo(slug, photo_id).await?;
        let filename = photo
            .file_path
            .rsplit('/')
            .next()
            .unwrap_or(photo.file_path.as_str());
        self.storage.download_url(&photo.file_path, filename).await
    }

    async fn public_photo(&self, slug: &str, photo_id: i64) -> Result<(Event, Photo)> {
        let event = self.resolve_slug(slug).await?;
        let photo = self
            .photos
            .get_photo(photo_id)
            .await?
            .filter(|p| p.event_id == event.id)
            .ok_or_else(|| Error::not_found("Photo not found."))?;
        Ok((event, photo))
    }

    fn photo_view(&self, photo: Photo) -> PhotoView {
        PhotoView {
            id: photo.id,
            url: self.storage.public_url(&photo.file_path),
            file_path: photo.file_path,
            created_at: photo.created_at,
        }
    }

    fn public_photo_view(&self, event: &Event, photo: Photo) -> PublicPhoto {
        let base = format!("{}/photos/{}", public_gallery_path(&event.slug), photo.id);
        PublicPhoto {
            id: photo.id,
            url: self.storage.public_url(&photo.file_path),
            download_url: format!("{}/download", base),
            preview_url: base,
        }
    }
}

/// Object key for an uploaded photo: `{event}/{folder}/{millis}-{filename}`
pub fn photo_key(event_id: i64, folder: &str, timestamp_ms: i64, filename: &str) -> String {
    let name = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("upload");
    format!("{}/{}/{}-{}", event_id, folder, timestamp_ms, name)
}

fn public_gallery_path(slug: &str) -> String {
    format!("/event/{}", normalize_slug(slug))
}

fn upload_content_type(file: &UploadFile) -> String {
    file.content_type
        .as_deref()
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| content_type_for(&file.filename))
        .to_string()
}
