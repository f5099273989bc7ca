use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::models::{AdminAccount, Event, NewEvent, NewPhoto, Photo, Session};
use crate::repository::{EventRepository, PhotoRepository, SessionRepository};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// PostgreSQL-backed store for events, photos, admins and sessions
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store with connection pool
    pub async fn new(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl EventRepository for PgStore {
    #[instrument(skip(self, event), fields(slug = %event.slug))]
    async fn insert_event(&self, event: NewEvent) -> Result<Event> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (name, slug, event_date, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, name, slug, event_date, created_at
            "#,
        )
        .bind(&event.name)
        .bind(&event.slug)
        .bind(event.event_date)
        .fetch_one(&self.pool)
        .await?;

        debug!(event_id = event.id, "Event inserted");
        Ok(event)
    }

    async fn get_event(&self, id: i64) -> Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, name, slug, event_date, created_at
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    async fn list_events(&self) -> Result<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, name, slug, event_date, created_at
            FROM events
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    #[instrument(skip(self))]
    async fn find_events_by_slug(&self, slug: &str) -> Result<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, name, slug, event_date, created_at
            FROM events
            WHERE lower(slug) = lower($1)
            ORDER BY id
            "#,
        )
        .bind(slug)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    #[instrument(skip(self))]
    async fn delete_event(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PhotoRepository for PgStore {
    #[instrument(skip(self, photo), fields(event_id = photo.event_id, file_path = %photo.file_path))]
    async fn insert_photo(&self, photo: NewPhoto) -> Result<Photo> {
        let photo = sqlx::query_as::<_, Photo>(
            r#"
            INSERT INTO photos (event_id, file_path, created_at)
            VALUES ($1, $2, NOW())
            RETURNING id, event_id, file_path, created_at
            "#,
        )
        .bind(photo.event_id)
        .bind(&photo.file_path)
        .fetch_one(&self.pool)
        .await?;

        Ok(photo)
    }

    async fn get_photo(&self, id: i64) -> Result<Option<Photo>> {
        let photo = sqlx::query_as::<_, Photo>(
            r#"
            SELECT id, event_id, file_path, created_at
            FROM photos
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(photo)
    }

    async fn list_photos(&self, event_id: i64) -> Result<Vec<Photo>> {
        let photos = sqlx::query_as::<_, Photo>(
            r#"
            SELECT id, event_id, file_path, created_at
            FROM photos
            WHERE event_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(photos)
    }

    #[instrument(skip(self))]
    async fn delete_photo(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM photos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionRepository for PgStore {
    async fn find_admin(&self, email: &str) -> Result<Option<AdminAccount>> {
        let admin = sqlx::query_as::<_, AdminAccount>(
            r#"
            SELECT id, email, password_hash
            FROM admins
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(admin)
    }

    async fn upsert_admin(&self, email: &str, password_hash: &str) -> Result<AdminAccount> {
        let admin = sqlx::query_as::<_, AdminAccount>(
            r#"
            INSERT INTO admins (email, password_hash, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT ((lower(email))) DO UPDATE SET password_hash = EXCLUDED.password_hash
            RETURNING id, email, password_hash
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(admin)
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, admin_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(session.token)
        .bind(session.admin_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_session(&self, token: Uuid) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT s.token, s.admin_id, a.email, s.created_at, s.expires_at
            FROM sessions s
            JOIN admins a ON a.id = s.admin_id
            WHERE s.token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn delete_session(&self, token: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        debug!(purged = result.rows_affected(), "Expired sessions purged");
        Ok(result.rows_affected())
    }
}
