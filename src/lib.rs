//! GEA Portal - certification workflow core
//!
//! Licensed operating organizations (GLABs) run client certification projects
//! through a fixed six-phase lifecycle under oversight of the central
//! authority (GEA).
//!
//! ## Architecture
//! All services operate through the [`store::PortalStore`] trait:
//! Request -> Service (workflow / cpd / collab / directory) -> PortalStore
//!                    \-> NotificationDispatcher -> EmailTransport
//!
//! The [`reminders::ReminderScheduler`] runs once a day and deduplicates
//! through a ledger keyed by (type, target, threshold).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gea_portal::blob_store::LocalDocumentStorage;
//! use gea_portal::config::PortalConfig;
//! use gea_portal::notify::LogEmailTransport;
//! use gea_portal::store::MemoryStore;
//! use gea_portal::Portal;
//!
//! let config = PortalConfig::default();
//! let portal = Portal::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(LocalDocumentStorage::new(config.upload_dir.clone())),
//!     Arc::new(LogEmailTransport),
//!     &config,
//! );
//! # let _ = portal;
//! ```

// Core error handling
pub mod error;

// Entity model and persistence
pub mod models;
pub mod store;

// Roles and phase catalogue
pub mod permissions;
pub mod phases;

// External collaborators
pub mod blob_store;
pub mod notify;

// Services
pub mod collab;
pub mod cpd;
pub mod directory;
pub mod reminders;
pub mod templates;
pub mod workflow;

pub mod config;
pub mod portal;

// REST API (axum)
#[cfg(feature = "server")]
pub mod api;

pub use error::{Blocker, BlockerType, PortalError, PortalResult};
pub use permissions::{Capability, Role};
pub use portal::Portal;
pub use reminders::{CycleReport, ReminderLoop, ReminderScheduler};
pub use store::{MemoryStore, PortalStore};
pub use workflow::{NewProject, PhaseWorkflowEngine, ProjectStatus, MAX_CLIENT_FEE};

#[cfg(feature = "database")]
pub use store::PgPortalStore;
