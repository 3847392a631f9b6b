//! Phase Templates
//!
//! GEA admins publish a blank form for any document slot of the six phases.
//! Every signed-in user can list the active forms and download them; a new
//! upload for a slot retires the previous one.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::blob_store::{allowed_extension, sanitize_filename, DocumentStorage, ALLOWED_EXTENSIONS};
use crate::error::{PortalError, PortalResult};
use crate::models::*;
use crate::permissions::Capability;
use crate::phases::phase;
use crate::store::PortalStore;
use crate::workflow::access::require;
use crate::workflow::DEFAULT_MAX_UPLOAD_BYTES;

/// Metadata accompanying a template upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTemplate {
    pub phase_number: i32,
    pub document_key: String,
    /// Defaults to the file name
    pub template_name: Option<String>,
}

pub struct TemplateLibrary {
    store: Arc<dyn PortalStore>,
    documents: Arc<dyn DocumentStorage>,
    max_upload_bytes: usize,
}

impl TemplateLibrary {
    pub fn new(store: Arc<dyn PortalStore>, documents: Arc<dyn DocumentStorage>) -> Self {
        Self {
            store,
            documents,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub async fn upload(
        &self,
        actor: &User,
        input: NewTemplate,
        filename: &str,
        content: &[u8],
    ) -> PortalResult<PhaseTemplate> {
        require(actor, Capability::ManageTemplates)?;

        let definition = phase(input.phase_number).ok_or_else(|| {
            PortalError::validation(format!("Unknown phase {}", input.phase_number))
        })?;
        let slot = definition.document_slot(&input.document_key).ok_or_else(|| {
            PortalError::validation(format!(
                "'{}' is not a document of phase {} ({})",
                input.document_key, definition.number, definition.name
            ))
        })?;
        if allowed_extension(filename).is_none() {
            return Err(PortalError::validation(format!(
                "File type not allowed; expected one of {}",
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }
        if content.is_empty() {
            return Err(PortalError::validation("Uploaded file is empty"));
        }
        if content.len() > self.max_upload_bytes {
            return Err(PortalError::validation(format!(
                "File exceeds the {} byte upload limit",
                self.max_upload_bytes
            )));
        }

        let original_filename = sanitize_filename(filename);
        let template_name = input
            .template_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| original_filename.clone());

        let stored_id = self.documents.store(&original_filename, content).await?;
        let template = PhaseTemplate {
            template_id: Uuid::new_v4(),
            phase_number: definition.number,
            document_key: slot.key.to_string(),
            template_name,
            original_filename,
            stored_id,
            file_size: content.len() as i64,
            uploaded_by: actor.user_id,
            uploaded_at: Utc::now(),
            is_active: true,
        };

        if let Err(e) = self.store.insert_phase_template(&template).await {
            if let Err(cleanup) = self.documents.delete(&template.stored_id).await {
                warn!(stored_id = %template.stored_id, "Orphaned template: {}", cleanup);
            }
            return Err(e);
        }

        info!(
            phase = template.phase_number,
            slot = %template.document_key,
            by = %actor.username,
            "Phase template published"
        );
        Ok(template)
    }

    /// Active templates; GEA admins may include retired ones
    pub async fn list(
        &self,
        actor: &User,
        phase_number: Option<i32>,
        include_retired: bool,
    ) -> PortalResult<Vec<PhaseTemplate>> {
        if include_retired {
            require(actor, Capability::ManageTemplates)?;
        } else if !actor.is_active {
            return Err(PortalError::denied("Account is inactive"));
        }
        self.store
            .list_phase_templates(phase_number, !include_retired)
            .await
    }

    pub async fn download(
        &self,
        actor: &User,
        template_id: Uuid,
    ) -> PortalResult<(PhaseTemplate, Vec<u8>)> {
        if !actor.is_active {
            return Err(PortalError::denied("Account is inactive"));
        }
        let template = self
            .store
            .get_phase_template(template_id)
            .await?
            .ok_or_else(|| PortalError::not_found("phase_template", template_id))?;
        let content = self.documents.fetch(&template.stored_id).await?;
        Ok((template, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::MemoryDocumentStorage;
    use crate::permissions::Role;
    use crate::store::MemoryStore;

    fn library() -> (TemplateLibrary, Arc<MemoryDocumentStorage>) {
        let documents = Arc::new(MemoryDocumentStorage::new());
        let library = TemplateLibrary::new(Arc::new(MemoryStore::new()), documents.clone());
        (library, documents)
    }

    fn input(phase_number: i32, key: &str) -> NewTemplate {
        NewTemplate {
            phase_number,
            document_key: key.into(),
            template_name: None,
        }
    }

    #[tokio::test]
    async fn test_new_upload_retires_previous_template() {
        let (library, _) = library();
        let admin = User::new("admin", "admin@gea.test", Role::GeaAdmin);
        let assessor = User::new("assessor", "a@lab.test", Role::GlabAssessor);

        let first = library
            .upload(&admin, input(1, "enrollment_form"), "form v1.docx", b"v1")
            .await
            .unwrap();
        assert_eq!(first.original_filename, "form_v1.docx");
        assert_eq!(first.template_name, "form_v1.docx");

        let second = library
            .upload(&admin, input(1, "enrollment_form"), "form.docx", b"v2")
            .await
            .unwrap();

        let active = library.list(&assessor, Some(1), false).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].template_id, second.template_id);

        let all = library.list(&admin, None, true).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|t| t.template_id == first.template_id && !t.is_active));

        // Retired templates stay downloadable
        let (template, bytes) = library.download(&assessor, first.template_id).await.unwrap();
        assert_eq!(template.template_id, first.template_id);
        assert_eq!(bytes, b"v1");

        let err = library.list(&assessor, None, true).await.unwrap_err();
        assert!(matches!(err, PortalError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let (library, documents) = library();
        let admin = User::new("admin", "admin@gea.test", Role::GeaAdmin);
        let staff = User::new("staff", "staff@gea.test", Role::GeaStaff);

        let err = library
            .upload(&staff, input(1, "enrollment_form"), "form.pdf", b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::PermissionDenied(_)));

        for (phase_number, key, filename, content) in [
            (7, "enrollment_form", "form.pdf", &b"x"[..]),
            (1, "audit_report", "form.pdf", &b"x"[..]),
            (1, "enrollment_form", "form.exe", &b"x"[..]),
            (1, "enrollment_form", "form.pdf", &b""[..]),
        ] {
            let err = library
                .upload(&admin, input(phase_number, key), filename, content)
                .await
                .unwrap_err();
            assert!(matches!(err, PortalError::Validation(_)), "{phase_number}/{key}/{filename}");
        }
        assert_eq!(documents.len().await, 0);

        let err = library.download(&admin, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PortalError::NotFound { .. }));
    }
}
