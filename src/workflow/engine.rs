//! Workflow Engine
//!
//! Every operation takes the acting user first, checks role and organization
//! scope, then goes through a single guarded store primitive. Notifications
//! are sent after the state change and never undo it.

use chrono::{Datelike, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::access::{
    ensure_can_view, ensure_gea_or_own_glab_admin, ensure_operator, project_scope, require,
};
use super::status::{ChecklistProgress, ProjectStatus, QualityProgress};
use super::{NewProject, CLIENT_FEE_SCALE, DEFAULT_MAX_UPLOAD_BYTES, MAX_CLIENT_FEE};
use crate::blob_store::{allowed_extension, DocumentStorage, ALLOWED_EXTENSIONS};
use crate::error::{Blocker, BlockerType, PortalError, PortalResult};
use crate::models::*;
use crate::notify::{NotificationDispatcher, NotificationDraft};
use crate::permissions::{Capability, Role};
use crate::phases::{phase, phase_name, PhaseDefinition, FINAL_PHASE, FIRST_PHASE, PHASES};
use crate::store::{DocumentReviewUpdate, PortalStore};

/// The phase workflow engine
pub struct PhaseWorkflowEngine {
    store: Arc<dyn PortalStore>,
    documents: Arc<dyn DocumentStorage>,
    notifier: Arc<NotificationDispatcher>,
    max_upload_bytes: usize,
}

impl PhaseWorkflowEngine {
    pub fn new(
        store: Arc<dyn PortalStore>,
        documents: Arc<dyn DocumentStorage>,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            documents,
            notifier,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    async fn load_project(&self, project_id: Uuid) -> PortalResult<Project> {
        self.store
            .get_project(project_id)
            .await?
            .ok_or_else(|| PortalError::not_found("project", project_id))
    }

    async fn load_user(&self, user_id: Uuid) -> PortalResult<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| PortalError::not_found("user", user_id))
    }

    fn current_phase(project: &Project) -> PortalResult<&'static PhaseDefinition> {
        phase(project.current_phase).ok_or_else(|| {
            PortalError::Storage(format!(
                "Project {} has out-of-range phase {}",
                project.reference_number, project.current_phase
            ))
        })
    }

    // ── Projects ──

    /// Open a project in phase 1 with both checklists seeded for every phase
    pub async fn create_project(&self, actor: &User, input: NewProject) -> PortalResult<Project> {
        require(actor, Capability::CreateProject)?;

        let glab_id = match actor.role {
            Role::GlabAdmin => {
                let own = actor
                    .glab_id
                    .ok_or_else(|| PortalError::denied("GLAB admin has no GLAB"))?;
                if input.glab_id.is_some_and(|g| g != own) {
                    return Err(PortalError::denied(
                        "GLAB admins can only create projects for their own GLAB",
                    ));
                }
                own
            }
            _ => input
                .glab_id
                .ok_or_else(|| PortalError::validation("glab_id is required"))?,
        };

        if input.client_fee.is_sign_negative() {
            return Err(PortalError::validation("Client fee must not be negative"));
        }
        if input.client_fee.normalize().scale() > CLIENT_FEE_SCALE {
            return Err(PortalError::validation(format!(
                "Client fee must have at most {} decimal places",
                CLIENT_FEE_SCALE
            )));
        }
        if input.client_fee > MAX_CLIENT_FEE {
            return Err(PortalError::validation(format!(
                "Client fee must not exceed {}",
                MAX_CLIENT_FEE
            )));
        }

        let glab = self
            .store
            .get_glab(glab_id)
            .await?
            .ok_or_else(|| PortalError::not_found("glab", glab_id))?;
        if !glab.is_active() {
            return Err(PortalError::blocked(Blocker::new(
                BlockerType::GlabInactive {
                    glab_id,
                    status: glab.status.as_str().to_string(),
                },
                format!("GLAB {} is {}", glab.name, glab.status.as_str()),
            )));
        }

        let client = self
            .store
            .get_client(input.client_id)
            .await?
            .ok_or_else(|| PortalError::not_found("client", input.client_id))?;
        if client.glab_id.is_some_and(|g| g != glab_id) {
            return Err(PortalError::validation(format!(
                "Client {} is assigned to another GLAB",
                client.name
            )));
        }

        let year = Utc::now().year();
        let seq = self.store.count_projects_for_glab_year(glab_id, year).await? + 1;
        let reference_number = format!("{}-{}-{:04}", glab.license_number, year, seq);

        let project = Project::new(
            reference_number,
            glab_id,
            client.client_id,
            input.assessment_type,
            input.client_fee,
            Some(actor.user_id),
        );
        let (checklist, quality) = seed_checklists(project.project_id);
        let log = PhaseLog::new(
            project.project_id,
            None,
            FIRST_PHASE,
            PhaseAction::Created,
            Some(actor.user_id),
            Some("Project created".to_string()),
        );

        self.store
            .create_project(&project, &checklist, &quality, &log)
            .await?;

        info!(
            project = %project.reference_number,
            glab = %glab.name,
            client = %client.name,
            "Project created"
        );
        Ok(project)
    }

    pub async fn list_projects(&self, actor: &User) -> PortalResult<Vec<Project>> {
        match project_scope(actor) {
            Some(scope) => self.store.list_projects(scope).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn get_project(&self, actor: &User, project_id: Uuid) -> PortalResult<Project> {
        let project = self.load_project(project_id).await?;
        ensure_can_view(self.store.as_ref(), actor, &project).await?;
        Ok(project)
    }

    /// Current phase, blockers, progress and documents
    pub async fn project_status(&self, actor: &User, project_id: Uuid) -> PortalResult<ProjectStatus> {
        let project = self.get_project(actor, project_id).await?;
        let definition = Self::current_phase(&project)?;
        let phase_number = project.current_phase;

        let checklist = self.store.checklist(project_id, Some(phase_number)).await?;
        let quality = self
            .store
            .quality_checklist(project_id, Some(phase_number))
            .await?;
        let latest_review = self
            .store
            .latest_phase_review(project_id, phase_number)
            .await?;
        let documents = self.store.documents(project_id, Some(phase_number)).await?;
        let members = self.store.project_members(project_id).await?;

        let blockers = advance_blockers(&project, &checklist, latest_review.as_ref());
        let missing_documents = definition
            .documents
            .iter()
            .filter(|slot| slot.required && !documents.iter().any(|d| d.document_key == slot.key))
            .map(|slot| slot.key)
            .collect();

        debug!(project = %project.reference_number, blockers = blockers.len(), "Status computed");

        Ok(ProjectStatus {
            phase_key: definition.key,
            phase_name: definition.name,
            is_final_phase: phase_number >= FINAL_PHASE,
            can_advance: blockers.is_empty(),
            blockers,
            checklist: ChecklistProgress::of(&checklist),
            quality: QualityProgress::of(&quality),
            latest_review,
            documents,
            missing_documents,
            members,
            project,
        })
    }

    pub async fn phase_history(&self, actor: &User, project_id: Uuid) -> PortalResult<Vec<PhaseLog>> {
        self.get_project(actor, project_id).await?;
        self.store.phase_history(project_id).await
    }

    pub async fn phase_reviews(
        &self,
        actor: &User,
        project_id: Uuid,
    ) -> PortalResult<Vec<PhaseReview>> {
        self.get_project(actor, project_id).await?;
        self.store.phase_reviews(project_id).await
    }

    // ── Checklists ──

    pub async fn checklist(
        &self,
        actor: &User,
        project_id: Uuid,
        phase_number: Option<i32>,
    ) -> PortalResult<Vec<ChecklistItem>> {
        self.get_project(actor, project_id).await?;
        self.store.checklist(project_id, phase_number).await
    }

    pub async fn quality_checklist(
        &self,
        actor: &User,
        project_id: Uuid,
        phase_number: Option<i32>,
    ) -> PortalResult<Vec<QualityChecklistItem>> {
        self.get_project(actor, project_id).await?;
        self.store.quality_checklist(project_id, phase_number).await
    }

    /// Toggle an operational item. Operating side only.
    pub async fn complete_operational_item(
        &self,
        actor: &User,
        project_id: Uuid,
        item_id: Uuid,
    ) -> PortalResult<ChecklistItem> {
        require(actor, Capability::ToggleOperationalItem)?;
        let project = self.load_project(project_id).await?;
        ensure_operator(self.store.as_ref(), actor, &project).await?;

        let item = self
            .store
            .get_checklist_item(item_id)
            .await?
            .filter(|i| i.project_id == project_id)
            .ok_or_else(|| PortalError::not_found("checklist_item", item_id))?;

        let item = self
            .store
            .toggle_checklist_item(item.item_id, actor.user_id, Utc::now())
            .await?
            .ok_or_else(|| PortalError::not_found("checklist_item", item_id))?;

        info!(
            project = %project.reference_number,
            item = %item.item_text,
            completed = item.is_completed,
            "Checklist item toggled"
        );
        Ok(item)
    }

    /// Toggle a quality item. GEA only.
    pub async fn complete_quality_item(
        &self,
        actor: &User,
        project_id: Uuid,
        item_id: Uuid,
        notes: Option<String>,
    ) -> PortalResult<QualityChecklistItem> {
        require(actor, Capability::ToggleQualityItem)?;
        let project = self.load_project(project_id).await?;

        let item = self
            .store
            .get_quality_item(item_id)
            .await?
            .filter(|i| i.project_id == project_id)
            .ok_or_else(|| PortalError::not_found("quality_checklist_item", item_id))?;

        let item = self
            .store
            .toggle_quality_item(item.item_id, actor.user_id, Utc::now(), notes)
            .await?
            .ok_or_else(|| PortalError::not_found("quality_checklist_item", item_id))?;

        info!(
            project = %project.reference_number,
            item = %item.item_text,
            checked = item.is_checked,
            "Quality item toggled"
        );
        Ok(item)
    }

    /// Add a custom required operational item
    pub async fn add_checklist_item(
        &self,
        actor: &User,
        project_id: Uuid,
        phase_number: i32,
        item_text: &str,
    ) -> PortalResult<ChecklistItem> {
        require(actor, Capability::AddChecklistItem)?;
        let project = self.load_project(project_id).await?;

        if phase(phase_number).is_none() {
            return Err(PortalError::validation(format!(
                "Phase must be between {} and {}",
                FIRST_PHASE, FINAL_PHASE
            )));
        }
        let item_text = item_text.trim();
        if item_text.is_empty() {
            return Err(PortalError::validation("Checklist item text is required"));
        }

        let existing = self.store.checklist(project_id, Some(phase_number)).await?;
        let sort_order = existing.iter().map(|i| i.sort_order).max().unwrap_or(0) + 1;

        let mut item = ChecklistItem::new(project_id, phase_number, item_text, true, sort_order);
        item.is_custom = true;
        self.store.insert_checklist_item(&item).await?;

        info!(
            project = %project.reference_number,
            phase = phase_number,
            item = %item.item_text,
            "Custom checklist item added"
        );
        Ok(item)
    }

    // ── Documents ──

    pub async fn documents(
        &self,
        actor: &User,
        project_id: Uuid,
        phase_number: Option<i32>,
    ) -> PortalResult<Vec<Document>> {
        self.get_project(actor, project_id).await?;
        self.store.documents(project_id, phase_number).await
    }

    /// Stored bytes of one document version, for anyone who can see its project
    pub async fn download_document(
        &self,
        actor: &User,
        document_id: Uuid,
    ) -> PortalResult<(Document, Vec<u8>)> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| PortalError::not_found("document", document_id))?;
        let project = self.load_project(document.project_id).await?;
        ensure_can_view(self.store.as_ref(), actor, &project).await?;

        let content = self.documents.fetch(&document.stored_id).await?;
        debug!(
            document = %document.document_id,
            by = %actor.username,
            "Document downloaded"
        );
        Ok((document, content))
    }

    /// Upload a new version of a current-phase document slot
    pub async fn submit_document(
        &self,
        actor: &User,
        project_id: Uuid,
        document_key: &str,
        filename: &str,
        content: &[u8],
    ) -> PortalResult<Document> {
        require(actor, Capability::SubmitDocument)?;
        let project = self.load_project(project_id).await?;
        ensure_operator(self.store.as_ref(), actor, &project).await?;

        let definition = Self::current_phase(&project)?;
        let slot = definition.document_slot(document_key).ok_or_else(|| {
            PortalError::validation(format!(
                "'{}' is not a document of phase {} ({})",
                document_key, definition.number, definition.name
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

        let previous = self
            .store
            .latest_document(project_id, definition.number, slot.key)
            .await?;
        if let Some(prev) = previous.as_ref().filter(|p| p.status == ReviewStatus::Approved) {
            return Err(PortalError::blocked(Blocker::new(
                BlockerType::DocumentApproved {
                    document_id: prev.document_id,
                },
                format!("{} v{} is already approved", slot.name, prev.version),
            )));
        }

        let stored_id = self.documents.store(filename, content).await?;
        let document = Document {
            document_id: Uuid::new_v4(),
            project_id,
            phase_number: definition.number,
            document_key: slot.key.to_string(),
            document_name: slot.name.to_string(),
            version: previous.as_ref().map_or(1, |p| p.version + 1),
            parent_id: previous.as_ref().map(|p| p.document_id),
            original_filename: filename.to_string(),
            stored_id,
            file_size: content.len() as i64,
            uploaded_by: actor.user_id,
            uploaded_at: Utc::now(),
            status: ReviewStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
        };

        if let Err(e) = self.store.insert_document(&document).await {
            if let Err(cleanup) = self.documents.delete(&document.stored_id).await {
                warn!(stored_id = %document.stored_id, "Orphaned upload: {}", cleanup);
            }
            return Err(e);
        }

        info!(
            project = %project.reference_number,
            document = %document.document_key,
            version = document.version,
            "Document uploaded"
        );

        let draft = NotificationDraft::new(
            NotificationType::DocumentUploaded,
            format!("Document uploaded: {}", document.document_name),
            format!(
                "{} uploaded {} v{} for project {} ({}).",
                actor.display_name(),
                document.document_name,
                document.version,
                project.reference_number,
                definition.name
            ),
        )
        .link(LinkType::Document, document.document_id);
        self.dispatch(self.notifier.gea_reviewers().await, &draft).await;

        Ok(document)
    }

    /// Document versions awaiting review, oldest first
    pub async fn pending_reviews(&self, actor: &User) -> PortalResult<Vec<Document>> {
        require(actor, Capability::ReviewDocument)?;
        self.store.pending_documents().await
    }

    /// Review the latest pending version of a document
    pub async fn review_document(
        &self,
        actor: &User,
        document_id: Uuid,
        outcome: ReviewOutcome,
        notes: Option<String>,
    ) -> PortalResult<Document> {
        require(actor, Capability::ReviewDocument)?;
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| PortalError::not_found("document", document_id))?;

        if let Some(blocker) = self.review_blocker(&document).await? {
            return Err(PortalError::blocked(blocker));
        }

        let update = DocumentReviewUpdate {
            document_id,
            outcome,
            reviewed_by: actor.user_id,
            reviewed_at: Utc::now(),
            notes,
        };
        let reviewed = match self.store.review_document(&update).await? {
            Some(doc) => doc,
            None => {
                // Lost a race; report the state that beat us
                let current = self
                    .store
                    .get_document(document_id)
                    .await?
                    .ok_or_else(|| PortalError::not_found("document", document_id))?;
                let blocker = self.review_blocker(&current).await?.unwrap_or_else(|| {
                    Blocker::new(
                        BlockerType::DocumentAlreadyReviewed {
                            document_id,
                            status: current.status.as_str().to_string(),
                        },
                        "Document was reviewed concurrently",
                    )
                });
                return Err(PortalError::blocked(blocker));
            }
        };

        let project = self.load_project(reviewed.project_id).await?;
        info!(
            project = %project.reference_number,
            document = %reviewed.document_key,
            version = reviewed.version,
            outcome = outcome.as_str(),
            "Document reviewed"
        );

        let notification_type = match outcome {
            ReviewOutcome::ChangesRequested => NotificationType::ChangesRequested,
            _ => NotificationType::DocumentReviewed,
        };
        let draft = NotificationDraft::new(
            notification_type,
            format!("{}: {}", reviewed.document_name, review_label(outcome)),
            format!(
                "{} v{} for project {} was marked {} by {}.",
                reviewed.document_name,
                reviewed.version,
                project.reference_number,
                review_label(outcome),
                actor.display_name()
            ),
        )
        .link(LinkType::Document, reviewed.document_id);
        let recipients = self.document_review_recipients(&project, &reviewed, actor).await;
        self.dispatch(recipients, &draft).await;

        Ok(reviewed)
    }

    async fn review_blocker(&self, document: &Document) -> PortalResult<Option<Blocker>> {
        if !document.is_pending() {
            return Ok(Some(Blocker::new(
                BlockerType::DocumentAlreadyReviewed {
                    document_id: document.document_id,
                    status: document.status.as_str().to_string(),
                },
                format!(
                    "{} v{} is already {}",
                    document.document_name, document.version, document.status
                ),
            )));
        }
        let latest = self
            .store
            .latest_document(document.project_id, document.phase_number, &document.document_key)
            .await?;
        match latest {
            Some(latest) if latest.document_id != document.document_id => Ok(Some(Blocker::new(
                BlockerType::DocumentSuperseded {
                    document_id: document.document_id,
                    latest_id: latest.document_id,
                },
                format!(
                    "{} v{} was superseded by v{}",
                    document.document_name, document.version, latest.version
                ),
            ))),
            _ => Ok(None),
        }
    }

    async fn document_review_recipients(
        &self,
        project: &Project,
        document: &Document,
        reviewer: &User,
    ) -> PortalResult<Vec<User>> {
        let mut recipients = self.notifier.glab_admins(project.glab_id).await?;
        if !recipients.iter().any(|u| u.user_id == document.uploaded_by) {
            if let Some(uploader) = self.store.get_user(document.uploaded_by).await? {
                recipients.push(uploader);
            }
        }
        recipients.retain(|u| u.user_id != reviewer.user_id);
        Ok(recipients)
    }

    // ── Phase review and advancement ──

    /// Record a new GEA review of the current phase
    pub async fn set_phase_review(
        &self,
        actor: &User,
        project_id: Uuid,
        outcome: ReviewOutcome,
        notes: Option<String>,
    ) -> PortalResult<PhaseReview> {
        require(actor, Capability::SetPhaseReview)?;
        let project = self.load_project(project_id).await?;

        let review = PhaseReview {
            review_id: Uuid::new_v4(),
            project_id,
            phase_number: project.current_phase,
            outcome,
            reviewer_id: actor.user_id,
            notes,
            reviewed_at: Utc::now(),
        };
        if self.store.record_phase_review(&review).await?.is_none() {
            return Err(self.phase_changed(project_id, project.current_phase).await);
        }

        info!(
            project = %project.reference_number,
            phase = review.phase_number,
            outcome = outcome.as_str(),
            "Phase review recorded"
        );

        let name = phase_name(review.phase_number);
        let (notification_type, title) = match outcome {
            ReviewOutcome::Approved => (
                NotificationType::PhaseApproved,
                format!("Phase {} approved", name),
            ),
            ReviewOutcome::ChangesRequested => (
                NotificationType::ChangesRequested,
                format!("Changes requested for {}", name),
            ),
            ReviewOutcome::Rejected => (
                NotificationType::ChangesRequested,
                format!("Phase {} rejected", name),
            ),
        };
        let mut message = format!(
            "GEA review of phase {} ({}) for project {}: {}.",
            review.phase_number,
            name,
            project.reference_number,
            review_label(outcome)
        );
        if let Some(notes) = review.notes.as_deref().filter(|n| !n.is_empty()) {
            message.push_str(&format!(" Notes: {}", notes));
        }
        let draft = NotificationDraft::new(notification_type, title, message)
            .link(LinkType::Project, project_id);
        let recipients = self
            .notifier
            .project_participants(&project, Some(actor.user_id))
            .await;
        self.dispatch(recipients, &draft).await;

        Ok(review)
    }

    /// Move to the next phase once the checklist and the GEA review allow it
    pub async fn advance_phase(
        &self,
        actor: &User,
        project_id: Uuid,
        notes: Option<String>,
    ) -> PortalResult<Project> {
        require(actor, Capability::AdvancePhase)?;
        let project = self.load_project(project_id).await?;
        ensure_operator(self.store.as_ref(), actor, &project).await?;

        let from = project.current_phase;
        let checklist = self.store.checklist(project_id, Some(from)).await?;
        let review = self.store.latest_phase_review(project_id, from).await?;
        let blockers = advance_blockers(&project, &checklist, review.as_ref());
        if !blockers.is_empty() {
            debug!(
                project = %project.reference_number,
                blockers = blockers.len(),
                "Advance refused"
            );
            return Err(PortalError::PreconditionNotMet { blockers });
        }

        let log = PhaseLog::new(
            project_id,
            Some(from),
            from + 1,
            PhaseAction::Advanced,
            Some(actor.user_id),
            notes,
        );
        let advanced = match self.store.move_project_phase(project_id, from, &log).await? {
            Some(p) => p,
            None => return Err(self.phase_changed(project_id, from).await),
        };

        info!(
            project = %advanced.reference_number,
            from = from,
            to = advanced.current_phase,
            "Project advanced to {}",
            phase_name(advanced.current_phase)
        );
        Ok(advanced)
    }

    /// Administrative move to any phase, including backwards
    pub async fn override_phase(
        &self,
        actor: &User,
        project_id: Uuid,
        to_phase: i32,
        reason: &str,
    ) -> PortalResult<Project> {
        require(actor, Capability::OverridePhase)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PortalError::validation("A reason is required for a phase override"));
        }
        if phase(to_phase).is_none() {
            return Err(PortalError::validation(format!(
                "Phase must be between {} and {}",
                FIRST_PHASE, FINAL_PHASE
            )));
        }

        let project = self.load_project(project_id).await?;
        let from = project.current_phase;
        if from == to_phase {
            return Err(PortalError::validation(format!(
                "Project is already in phase {}",
                to_phase
            )));
        }

        let log = PhaseLog::new(
            project_id,
            Some(from),
            to_phase,
            PhaseAction::Override,
            Some(actor.user_id),
            Some(reason.to_string()),
        );
        let moved = match self.store.move_project_phase(project_id, from, &log).await? {
            Some(p) => p,
            None => return Err(self.phase_changed(project_id, from).await),
        };

        warn!(
            project = %moved.reference_number,
            from = from,
            to = to_phase,
            by = %actor.username,
            reason = reason,
            "Phase overridden"
        );
        Ok(moved)
    }

    async fn phase_changed(&self, project_id: Uuid, expected: i32) -> PortalError {
        let actual = match self.store.get_project(project_id).await {
            Ok(Some(p)) => p.current_phase,
            Ok(None) => return PortalError::not_found("project", project_id),
            Err(e) => return e,
        };
        PortalError::blocked(Blocker::new(
            BlockerType::PhaseChanged { expected, actual },
            format!(
                "Project moved from phase {} to {} during the operation",
                expected, actual
            ),
        ))
    }

    // ── Payments ──

    /// Record a payment milestone. Each milestone can be set once.
    pub async fn record_payment(
        &self,
        actor: &User,
        project_id: Uuid,
        milestone: PaymentMilestone,
        paid_on: NaiveDate,
    ) -> PortalResult<Project> {
        require(actor, Capability::RecordPayment)?;
        let project = self.load_project(project_id).await?;
        ensure_gea_or_own_glab_admin(actor, &project)?;

        let updated = self
            .store
            .record_payment(project_id, milestone, paid_on)
            .await?
            .ok_or_else(|| {
                PortalError::conflict(format!(
                    "{} payment already recorded for {}",
                    milestone.as_str(),
                    project.reference_number
                ))
            })?;

        info!(
            project = %updated.reference_number,
            milestone = milestone.as_str(),
            date = %paid_on,
            "Payment recorded"
        );
        Ok(updated)
    }

    // ── Membership ──

    /// Assign an assessor of the project's GLAB. `false` if already assigned.
    pub async fn assign_assessor(
        &self,
        actor: &User,
        project_id: Uuid,
        assessor_id: Uuid,
    ) -> PortalResult<bool> {
        require(actor, Capability::ManageAssessors)?;
        let project = self.load_project(project_id).await?;
        ensure_gea_or_own_glab_admin(actor, &project)?;

        let assessor = self.load_user(assessor_id).await?;
        if !assessor.belongs_to_glab(project.glab_id) {
            return Err(PortalError::validation(format!(
                "{} does not belong to the project's GLAB",
                assessor.username
            )));
        }
        self.assign_member(actor, &project, &assessor, MemberKind::Assessor)
            .await
    }

    pub async fn remove_assessor(
        &self,
        actor: &User,
        project_id: Uuid,
        assessor_id: Uuid,
    ) -> PortalResult<()> {
        require(actor, Capability::ManageAssessors)?;
        let project = self.load_project(project_id).await?;
        ensure_gea_or_own_glab_admin(actor, &project)?;

        if !self
            .store
            .remove_member(project_id, MemberKind::Assessor, assessor_id)
            .await?
        {
            return Err(PortalError::not_found("project_assessor", assessor_id));
        }
        info!(project = %project.reference_number, assessor = %assessor_id, "Assessor removed");
        Ok(())
    }

    pub async fn assign_expert(
        &self,
        actor: &User,
        project_id: Uuid,
        expert_id: Uuid,
    ) -> PortalResult<bool> {
        require(actor, Capability::AssignExpert)?;
        let project = self.load_project(project_id).await?;
        let expert = self.load_user(expert_id).await?;
        self.assign_member(actor, &project, &expert, MemberKind::TechnicalExpert)
            .await
    }

    pub async fn assign_committee_member(
        &self,
        actor: &User,
        project_id: Uuid,
        member_id: Uuid,
    ) -> PortalResult<bool> {
        require(actor, Capability::AssignCommittee)?;
        let project = self.load_project(project_id).await?;
        let member = self.load_user(member_id).await?;
        self.assign_member(actor, &project, &member, MemberKind::CommitteeMember)
            .await
    }

    async fn assign_member(
        &self,
        actor: &User,
        project: &Project,
        user: &User,
        kind: MemberKind,
    ) -> PortalResult<bool> {
        if user.role != kind.required_role() || !user.is_active {
            return Err(PortalError::validation(format!(
                "{} is not an active {}",
                user.username,
                kind.required_role()
            )));
        }

        let member = ProjectMember {
            project_id: project.project_id,
            user_id: user.user_id,
            kind,
            assigned_by: Some(actor.user_id),
            assigned_at: Utc::now(),
        };
        if !self.store.add_member(&member).await? {
            debug!(project = %project.reference_number, user = %user.username, "Already assigned");
            return Ok(false);
        }

        info!(
            project = %project.reference_number,
            user = %user.username,
            kind = kind.as_str(),
            "Project member assigned"
        );

        let (notification_type, title, role_text) = match kind {
            MemberKind::Assessor => (
                NotificationType::AssessorAssigned,
                format!("Assigned to Project: {}", project.reference_number),
                "an assessor",
            ),
            MemberKind::TechnicalExpert => (
                NotificationType::ExpertAssigned,
                "Assigned to Project".to_string(),
                "a technical expert",
            ),
            MemberKind::CommitteeMember => (
                NotificationType::CommitteeAssigned,
                "Assigned to Certification Committee".to_string(),
                "a certification committee member",
            ),
        };
        let draft = NotificationDraft::new(
            notification_type,
            title,
            format!(
                "You have been assigned as {} to project {}.",
                role_text, project.reference_number
            ),
        )
        .link(LinkType::Project, project.project_id);
        self.dispatch(Ok(vec![user.clone()]), &draft).await;

        Ok(true)
    }

    pub async fn members(&self, actor: &User, project_id: Uuid) -> PortalResult<Vec<ProjectMember>> {
        self.get_project(actor, project_id).await?;
        self.store.project_members(project_id).await
    }

    async fn dispatch(&self, recipients: PortalResult<Vec<User>>, draft: &NotificationDraft) {
        match recipients {
            Ok(users) => {
                self.notifier.notify_many(&users, draft).await;
            }
            Err(e) => warn!(
                notification_type = draft.notification_type.as_str(),
                "Could not resolve notification recipients: {}",
                e
            ),
        }
    }
}

/// Both checklists for every phase, from the phase catalogue
fn seed_checklists(project_id: Uuid) -> (Vec<ChecklistItem>, Vec<QualityChecklistItem>) {
    let mut checklist = Vec::new();
    let mut quality = Vec::new();
    for definition in PHASES.iter() {
        for (i, text) in definition.checklist.iter().enumerate() {
            checklist.push(ChecklistItem::new(
                project_id,
                definition.number,
                *text,
                true,
                i as i32 + 1,
            ));
        }
        for (i, (text, check_type)) in definition.quality_checklist.iter().enumerate() {
            quality.push(QualityChecklistItem::new(
                project_id,
                definition.number,
                *text,
                *check_type,
                i as i32 + 1,
            ));
        }
    }
    (checklist, quality)
}

/// Every reason the project cannot leave its current phase
fn advance_blockers(
    project: &Project,
    checklist: &[ChecklistItem],
    latest_review: Option<&PhaseReview>,
) -> Vec<Blocker> {
    let phase_number = project.current_phase;
    let mut blockers = Vec::new();

    if phase_number >= FINAL_PHASE {
        blockers.push(Blocker::new(
            BlockerType::FinalPhaseReached,
            format!("Project is already in the final phase ({})", phase_name(FINAL_PHASE)),
        ));
    }

    for item in checklist
        .iter()
        .filter(|i| i.phase_number == phase_number && i.blocks_advance())
    {
        blockers.push(
            Blocker::new(
                BlockerType::ChecklistItemIncomplete {
                    item_id: item.item_id,
                    phase: phase_number,
                },
                format!("Checklist item incomplete: {}", item.item_text),
            )
            .with_detail("item_text", serde_json::json!(item.item_text)),
        );
    }

    match latest_review {
        None => blockers.push(Blocker::new(
            BlockerType::PhaseReviewMissing {
                phase: phase_number,
            },
            format!("Phase {} has no GEA review", phase_number),
        )),
        Some(review) if review.outcome != ReviewOutcome::Approved => blockers.push(
            Blocker::new(
                BlockerType::PhaseReviewNotApproved {
                    phase: phase_number,
                    outcome: review.outcome.as_str().to_string(),
                },
                format!(
                    "GEA review of phase {} is {}",
                    phase_number,
                    review_label(review.outcome)
                ),
            )
            .with_detail("reviewer_id", serde_json::json!(review.reviewer_id)),
        ),
        Some(_) => {}
    }

    blockers
}

fn review_label(outcome: ReviewOutcome) -> &'static str {
    match outcome {
        ReviewOutcome::Approved => "approved",
        ReviewOutcome::ChangesRequested => "changes requested",
        ReviewOutcome::Rejected => "rejected",
    }
}
