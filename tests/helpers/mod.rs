//! Shared fixture: a portal over the in-memory store with one GLAB, its admin,
//! an assessor, a client and GEA staff.

#![allow(dead_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;

use gea_portal::blob_store::MemoryDocumentStorage;
use gea_portal::config::{BootstrapConfig, PortalConfig};
use gea_portal::directory::{bootstrap_admins, NewClient, NewGlab, NewUser};
use gea_portal::models::*;
use gea_portal::notify::MemoryEmailTransport;
use gea_portal::store::MemoryStore;
use gea_portal::{NewProject, Portal, Role};

pub struct World {
    pub portal: Portal,
    pub store: Arc<MemoryStore>,
    pub email: MemoryEmailTransport,
    pub documents: Arc<MemoryDocumentStorage>,
    pub gea_admin: User,
    pub gea_staff: User,
    pub glab: Glab,
    pub glab_admin: User,
    pub assessor: User,
    pub client: Client,
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

impl World {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let email = MemoryEmailTransport::new();
        let documents = Arc::new(MemoryDocumentStorage::new());
        let portal = Portal::new(
            store.clone(),
            documents.clone(),
            Arc::new(email.clone()),
            &PortalConfig::default(),
        );

        let gea_admin = bootstrap_admins(store.as_ref(), &BootstrapConfig::default())
            .await
            .unwrap()
            .unwrap();
        let directory = &portal.directory;

        let glab = directory
            .create_glab(
                &gea_admin,
                NewGlab {
                    name: "Savanna Assurance".into(),
                    license_number: "GL-100".into(),
                    country: "Kenya".into(),
                    address: None,
                    contact_email: "office@savanna.test".into(),
                    contact_phone: None,
                    license_type: LicenseType::Annual,
                    license_start_date: Some(date(2024, 3, 1)),
                    next_payment_due: Some(date(2025, 3, 1)),
                },
            )
            .await
            .unwrap();

        let gea_staff = directory
            .create_user(&gea_admin, user("reviewer", Role::GeaStaff, None))
            .await
            .unwrap();
        let glab_admin = directory
            .create_user(
                &gea_admin,
                user("labadmin", Role::GlabAdmin, Some(glab.glab_id)),
            )
            .await
            .unwrap();
        let assessor = directory
            .create_user(
                &gea_admin,
                user("assessor", Role::GlabAssessor, Some(glab.glab_id)),
            )
            .await
            .unwrap();

        let client = directory
            .create_client(
                &glab_admin,
                NewClient {
                    name: "Acme Minerals".into(),
                    country: "Kenya".into(),
                    ..NewClient::default()
                },
            )
            .await
            .unwrap();

        Self {
            portal,
            store,
            email,
            documents,
            gea_admin,
            gea_staff,
            glab,
            glab_admin,
            assessor,
            client,
        }
    }

    pub async fn project(&self, client_fee: i64) -> Project {
        self.portal
            .engine
            .create_project(
                &self.glab_admin,
                NewProject {
                    glab_id: None,
                    client_id: self.client.client_id,
                    assessment_type: AssessmentType::Initial,
                    client_fee: Decimal::from(client_fee),
                },
            )
            .await
            .unwrap()
    }

    /// Complete every required operational item of the current phase
    pub async fn complete_checklist(&self, project: &Project) {
        let items = self
            .portal
            .engine
            .checklist(&self.glab_admin, project.project_id, Some(project.current_phase))
            .await
            .unwrap();
        for item in items.iter().filter(|i| i.blocks_advance()) {
            self.portal
                .engine
                .complete_operational_item(&self.glab_admin, project.project_id, item.item_id)
                .await
                .unwrap();
        }
    }

    pub async fn approve_phase(&self, project: &Project) {
        self.portal
            .engine
            .set_phase_review(
                &self.gea_staff,
                project.project_id,
                ReviewOutcome::Approved,
                None,
            )
            .await
            .unwrap();
    }

    pub async fn reload(&self, project: &Project) -> Project {
        self.portal
            .engine
            .get_project(&self.gea_admin, project.project_id)
            .await
            .unwrap()
    }
}

pub fn user(username: &str, role: Role, glab_id: Option<uuid::Uuid>) -> NewUser {
    NewUser {
        username: username.into(),
        email: format!("{}@portal.test", username),
        full_name: None,
        role,
        glab_id,
        client_id: None,
        assessor_code: None,
        certification_date: None,
    }
}
