//! Gallery Service
//!
//! Event photo gallery for a photography studio. Administrators sign in,
//! create events with an optional cover, upload photos into named folders
//! and share each event's public gallery through a link and QR code.
//! Clients browse, preview and download photos without an account.
//!
//! ## Features
//!
//! - **Admin Console**: session-gated event directory, creation flow and
//!   per-event upload console
//! - **Public Galleries**: case-insensitive slug lookup, photos grouped by
//!   folder, presigned downloads
//! - **Session Gate**: every admin request is checked against the session
//!   store; sign-ins, sign-outs and expiries are broadcast to subscribers
//!
//! ## Architecture
//!
//! ```text
//!   HTTP (axum)                 Catalog                  Backends
//! ┌──────────────┐          ┌──────────────┐       ┌──────────────┐
//! │ Session Gate │─────────▶│ Events       │──────▶│ PostgreSQL   │
//! │ Admin routes │          │ Photos       │       │ events       │
//! └──────────────┘          │ Grouping     │       │ photos       │
//! ┌──────────────┐          │ QR codes     │       │ admins       │
//! │ Public       │─────────▶│              │       │ sessions     │
//! │ gallery      │          └──────────────┘       └──────────────┘
//! └──────────────┘                 │               ┌──────────────┐
//!                                  └──────────────▶│ S3 bucket    │
//!                                                  │ {event}/...  │
//!                                                  └──────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod grouping;
pub mod models;
pub mod qr;
pub mod repository;
pub mod slug;

pub use api::{create_router, start_api_server, AppState};
pub use auth::{Authenticator, CookieSettings, SessionChange};
pub use catalog::{Catalog, CreateEvent, EventDetail, PublicGallery};
pub use config::Config;
pub use error::{Error, Result};
pub use grouping::{group_by_folder, FolderGroup};
pub use models::{Event, Photo, Session, UploadFile};
pub use slug::generate_slug;
