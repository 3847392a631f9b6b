//! Service wiring
//!
//! Builds every portal service over one store, one document storage and one
//! email transport.

use std::sync::Arc;

use crate::blob_store::DocumentStorage;
use crate::collab::CollabService;
use crate::config::PortalConfig;
use crate::cpd::CpdService;
use crate::directory::DirectoryService;
use crate::notify::{EmailTransport, NotificationDispatcher};
use crate::reminders::ReminderScheduler;
use crate::store::PortalStore;
use crate::templates::TemplateLibrary;
use crate::workflow::PhaseWorkflowEngine;

#[derive(Clone)]
pub struct Portal {
    pub store: Arc<dyn PortalStore>,
    pub notifier: Arc<NotificationDispatcher>,
    pub engine: Arc<PhaseWorkflowEngine>,
    pub collab: Arc<CollabService>,
    pub cpd: Arc<CpdService>,
    pub directory: Arc<DirectoryService>,
    pub scheduler: Arc<ReminderScheduler>,
    pub templates: Arc<TemplateLibrary>,
    pub max_upload_bytes: usize,
}

impl Portal {
    pub fn new(
        store: Arc<dyn PortalStore>,
        documents: Arc<dyn DocumentStorage>,
        email: Arc<dyn EmailTransport>,
        config: &PortalConfig,
    ) -> Self {
        let notifier = Arc::new(NotificationDispatcher::new(store.clone(), email));
        let engine = PhaseWorkflowEngine::new(store.clone(), documents.clone(), notifier.clone())
            .with_max_upload_bytes(config.max_upload_bytes);
        let cpd = CpdService::new(store.clone(), documents.clone(), notifier.clone())
            .with_required_hours(config.cpd_required_hours)
            .with_max_upload_bytes(config.max_upload_bytes);
        let templates = TemplateLibrary::new(store.clone(), documents)
            .with_max_upload_bytes(config.max_upload_bytes);

        Self {
            collab: Arc::new(CollabService::new(store.clone(), notifier.clone())),
            directory: Arc::new(DirectoryService::new(store.clone())),
            scheduler: Arc::new(ReminderScheduler::new(store.clone(), notifier.clone())),
            engine: Arc::new(engine),
            cpd: Arc::new(cpd),
            templates: Arc::new(templates),
            max_upload_bytes: config.max_upload_bytes,
            notifier,
            store,
        }
    }

    #[cfg(feature = "server")]
    pub fn app_state(&self) -> crate::api::AppState {
        crate::api::AppState {
            store: self.store.clone(),
            engine: self.engine.clone(),
            notifier: self.notifier.clone(),
            collab: self.collab.clone(),
            cpd: self.cpd.clone(),
            directory: self.directory.clone(),
            templates: self.templates.clone(),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}
