//! Directory: users, GLABs and clients
//!
//! Administrative records the workflow runs on. Users are deactivated, never
//! deleted. Affiliation rules: GLAB roles carry a `glab_id`, client users carry
//! a `client_id`, every other role carries neither.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::BootstrapConfig;
use crate::error::{Blocker, BlockerType, PortalError, PortalResult};
use crate::models::*;
use crate::permissions::{Capability, Role};
use crate::store::{PortalStore, UserQuery};
use crate::workflow::access::require;

// ── Inputs ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub glab_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub assessor_code: Option<String>,
    /// Assessors only; derives `recertification_due`
    pub certification_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGlab {
    pub name: String,
    pub license_number: String,
    pub country: String,
    pub address: Option<String>,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub license_type: LicenseType,
    pub license_start_date: Option<NaiveDate>,
    pub next_payment_due: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewClient {
    pub name: String,
    pub country: String,
    pub registered_address: Option<String>,
    pub industry_sector: Option<String>,
    pub total_employees: Option<i32>,
    pub number_of_sites: Option<i32>,
    pub primary_contact_name: Option<String>,
    pub primary_contact_email: Option<String>,
    pub primary_contact_phone: Option<String>,
    /// Ignored for GLAB admins, who always create clients for their own GLAB
    pub glab_id: Option<Uuid>,
}

pub struct DirectoryService {
    store: Arc<dyn PortalStore>,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn PortalStore>) -> Self {
        Self { store }
    }

    // ── Users ──

    pub async fn create_user(&self, actor: &User, input: NewUser) -> PortalResult<User> {
        require(actor, Capability::ManageUsers)?;

        let username = input.username.trim();
        let email = input.email.trim();
        if username.is_empty() {
            return Err(PortalError::validation("Username is required"));
        }
        if !email.contains('@') {
            return Err(PortalError::validation(format!("Invalid email: {}", email)));
        }
        self.check_affiliation(input.role, input.glab_id, input.client_id)
            .await?;
        if input.certification_date.is_some() && input.role != Role::GlabAssessor {
            return Err(PortalError::validation(
                "Only assessors carry a certification date",
            ));
        }

        let mut user = User::new(username, email, input.role);
        user.full_name = input.full_name.filter(|n| !n.trim().is_empty());
        user.glab_id = input.glab_id;
        user.client_id = input.client_id;
        user.assessor_code = input.assessor_code;
        user.created_by = Some(actor.user_id);
        if let Some(certified_on) = input.certification_date {
            user.certify(certified_on);
        }

        self.store.insert_user(&user).await?;
        info!(username = %user.username, role = user.role.as_str(), "User created");
        Ok(user)
    }

    async fn check_affiliation(
        &self,
        role: Role,
        glab_id: Option<Uuid>,
        client_id: Option<Uuid>,
    ) -> PortalResult<()> {
        match (role.is_glab(), role.requires_client(), glab_id, client_id) {
            (true, _, Some(glab_id), None) => {
                if self.store.get_glab(glab_id).await?.is_none() {
                    return Err(PortalError::not_found("glab", glab_id));
                }
                Ok(())
            }
            (_, true, None, Some(client_id)) => {
                if self.store.get_client(client_id).await?.is_none() {
                    return Err(PortalError::not_found("client", client_id));
                }
                Ok(())
            }
            (false, false, None, None) => Ok(()),
            (true, ..) => Err(PortalError::validation(format!(
                "{} accounts require a GLAB and no client",
                role
            ))),
            (_, true, ..) => Err(PortalError::validation(format!(
                "{} accounts require a client and no GLAB",
                role
            ))),
            _ => Err(PortalError::validation(format!(
                "{} accounts carry no GLAB or client affiliation",
                role
            ))),
        }
    }

    /// Activate or deactivate an account; deactivating oneself is blocked
    pub async fn set_user_active(
        &self,
        actor: &User,
        user_id: Uuid,
        active: bool,
    ) -> PortalResult<User> {
        require(actor, Capability::ManageUsers)?;
        if user_id == actor.user_id && !active {
            return Err(PortalError::blocked(Blocker::new(
                BlockerType::SelfAction,
                "Cannot deactivate your own account",
            )));
        }

        let user = self
            .store
            .set_user_active(user_id, active)
            .await?
            .ok_or_else(|| PortalError::not_found("user", user_id))?;
        info!(
            username = %user.username,
            active,
            "User {}",
            if active { "activated" } else { "deactivated" }
        );
        Ok(user)
    }

    /// Opt the acting user in or out of notification emails
    pub async fn set_email_notifications(&self, actor: &User, enabled: bool) -> PortalResult<User> {
        self.store
            .set_email_notifications(actor.user_id, enabled)
            .await?
            .ok_or_else(|| PortalError::not_found("user", actor.user_id))
    }

    /// GEA admins see everyone; GLAB admins see their own GLAB
    pub async fn list_users(&self, actor: &User, query: UserQuery) -> PortalResult<Vec<User>> {
        let query = match actor.role {
            Role::GeaAdmin => query,
            Role::GlabAdmin => match actor.glab_id {
                Some(glab_id) => query.in_glab(glab_id),
                None => return Ok(Vec::new()),
            },
            _ => return Err(PortalError::denied("No access to the user directory")),
        };
        debug!(actor = %actor.username, "Listing users");
        self.store.list_users(&query).await
    }

    // ── GLABs ──

    pub async fn create_glab(&self, actor: &User, input: NewGlab) -> PortalResult<Glab> {
        require(actor, Capability::ManageGlabs)?;
        if input.name.trim().is_empty() || input.license_number.trim().is_empty() {
            return Err(PortalError::validation(
                "GLAB name and license number are required",
            ));
        }

        let mut glab = Glab {
            glab_id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            license_number: input.license_number.trim().to_string(),
            country: input.country,
            address: input.address,
            contact_email: input.contact_email,
            contact_phone: input.contact_phone,
            license_type: input.license_type,
            license_start_date: None,
            license_expiry_date: None,
            last_payment_date: None,
            next_payment_due: input.next_payment_due,
            status: GlabStatus::Active,
            created_at: Utc::now(),
            created_by: Some(actor.user_id),
        };
        if let Some(start) = input.license_start_date {
            glab.start_license(input.license_type, start);
        }

        self.store.insert_glab(&glab).await?;
        info!(glab = %glab.name, license = %glab.license_number, "GLAB created");
        Ok(glab)
    }

    pub async fn set_glab_status(
        &self,
        actor: &User,
        glab_id: Uuid,
        status: GlabStatus,
    ) -> PortalResult<Glab> {
        require(actor, Capability::ManageGlabs)?;
        let mut glab = self.load_glab(glab_id).await?;
        glab.status = status;
        self.store.update_glab(&glab).await?;
        info!(glab = %glab.name, status = status.as_str(), "GLAB status changed");
        Ok(glab)
    }

    /// Restart the license term
    pub async fn renew_license(
        &self,
        actor: &User,
        glab_id: Uuid,
        license_type: LicenseType,
        start: NaiveDate,
    ) -> PortalResult<Glab> {
        require(actor, Capability::ManageGlabs)?;
        let mut glab = self.load_glab(glab_id).await?;
        glab.start_license(license_type, start);
        self.store.update_glab(&glab).await?;
        info!(glab = %glab.name, expiry = ?glab.license_expiry_date, "License term started");
        Ok(glab)
    }

    /// Record a license payment and roll the next due date forward one term
    pub async fn record_license_payment(
        &self,
        actor: &User,
        glab_id: Uuid,
        paid_on: NaiveDate,
    ) -> PortalResult<Glab> {
        require(actor, Capability::ManageGlabs)?;
        let mut glab = self.load_glab(glab_id).await?;
        glab.record_payment(paid_on);
        self.store.update_glab(&glab).await?;
        info!(glab = %glab.name, next_due = ?glab.next_payment_due, "License payment recorded");
        Ok(glab)
    }

    pub async fn get_glab(&self, actor: &User, glab_id: Uuid) -> PortalResult<Glab> {
        if !(actor.role.is_gea() || actor.belongs_to_glab(glab_id)) {
            return Err(PortalError::denied("No access to this GLAB"));
        }
        self.load_glab(glab_id).await
    }

    pub async fn list_glabs(&self, actor: &User) -> PortalResult<Vec<Glab>> {
        if actor.role.is_gea() {
            return self.store.list_glabs().await;
        }
        match actor.glab_id {
            Some(glab_id) => Ok(self.store.get_glab(glab_id).await?.into_iter().collect()),
            None => Ok(Vec::new()),
        }
    }

    async fn load_glab(&self, glab_id: Uuid) -> PortalResult<Glab> {
        self.store
            .get_glab(glab_id)
            .await?
            .ok_or_else(|| PortalError::not_found("glab", glab_id))
    }

    // ── Clients ──

    pub async fn create_client(&self, actor: &User, input: NewClient) -> PortalResult<Client> {
        require(actor, Capability::CreateClient)?;
        if input.name.trim().is_empty() {
            return Err(PortalError::validation("Client name is required"));
        }

        let glab_id = if actor.role.is_gea() {
            input.glab_id
        } else {
            actor.glab_id
        };
        if let Some(glab_id) = glab_id {
            self.load_glab(glab_id).await?;
        }

        let client = Client {
            client_id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            country: input.country,
            registered_address: input.registered_address,
            industry_sector: input.industry_sector,
            total_employees: input.total_employees,
            number_of_sites: input.number_of_sites.unwrap_or(1).max(1),
            primary_contact_name: input.primary_contact_name,
            primary_contact_email: input.primary_contact_email,
            primary_contact_phone: input.primary_contact_phone,
            glab_id,
            created_at: Utc::now(),
            created_by: Some(actor.user_id),
        };
        self.store.insert_client(&client).await?;
        info!(client = %client.name, glab = ?client.glab_id, "Client created");
        Ok(client)
    }

    pub async fn get_client(&self, actor: &User, client_id: Uuid) -> PortalResult<Client> {
        let client = self
            .store
            .get_client(client_id)
            .await?
            .ok_or_else(|| PortalError::not_found("client", client_id))?;
        let visible = actor.role.is_gea()
            || actor.client_id == Some(client_id)
            || (actor.role.is_glab() && client.glab_id.is_some() && client.glab_id == actor.glab_id);
        if !visible {
            return Err(PortalError::denied("No access to this client"));
        }
        Ok(client)
    }

    pub async fn list_clients(&self, actor: &User) -> PortalResult<Vec<Client>> {
        if actor.role.is_gea() {
            return self.store.list_clients(None).await;
        }
        match actor.glab_id {
            Some(glab_id) if actor.role.is_glab() => self.store.list_clients(Some(glab_id)).await,
            _ => Ok(Vec::new()),
        }
    }
}

/// Create the configured GEA admin account if it does not exist yet.
///
/// Returns the account when one was created.
pub async fn bootstrap_admins(
    store: &dyn PortalStore,
    config: &BootstrapConfig,
) -> PortalResult<Option<User>> {
    if !config.enabled {
        debug!("Admin bootstrap disabled");
        return Ok(None);
    }
    if store
        .find_user_by_username(&config.admin_username)
        .await?
        .is_some()
    {
        return Ok(None);
    }

    let mut admin = User::new(&config.admin_username, &config.admin_email, Role::GeaAdmin);
    admin.full_name = Some("GEA Administrator".to_string());
    store.insert_user(&admin).await?;
    info!(username = %admin.username, "Bootstrap GEA admin created");
    Ok(Some(admin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: DirectoryService,
        admin: User,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let admin = bootstrap_admins(store.as_ref(), &BootstrapConfig::default())
            .await
            .unwrap()
            .unwrap();
        Fixture {
            service: DirectoryService::new(store.clone()),
            store,
            admin,
        }
    }

    fn new_glab(license_number: &str) -> NewGlab {
        NewGlab {
            name: "Nairobi Lab".into(),
            license_number: license_number.into(),
            country: "Kenya".into(),
            address: None,
            contact_email: "lab@example.com".into(),
            contact_phone: None,
            license_type: LicenseType::Annual,
            license_start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            next_payment_due: None,
        }
    }

    fn new_user(username: &str, role: Role) -> NewUser {
        NewUser {
            username: username.into(),
            email: format!("{}@example.com", username),
            full_name: None,
            role,
            glab_id: None,
            client_id: None,
            assessor_code: None,
            certification_date: None,
        }
    }

    #[tokio::test]
    async fn test_flag_updates_do_not_clobber_each_other() {
        let f = fixture().await;
        let user = f
            .service
            .create_user(&f.admin, new_user("auditor", Role::GeaStaff))
            .await
            .unwrap();

        let (prefs, active) = tokio::join!(
            f.service.set_email_notifications(&user, false),
            f.service.set_user_active(&f.admin, user.user_id, false),
        );
        prefs.unwrap();
        active.unwrap();

        let stored = f.store.get_user(user.user_id).await.unwrap().unwrap();
        assert!(!stored.email_notifications);
        assert!(!stored.is_active);

        let err = f
            .service
            .set_user_active(&f.admin, Uuid::new_v4(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let f = fixture().await;
        let again = bootstrap_admins(f.store.as_ref(), &BootstrapConfig::default())
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(f.store.list_users(&UserQuery::default()).await.unwrap().len(), 1);

        let disabled = BootstrapConfig {
            enabled: false,
            ..BootstrapConfig::default()
        };
        let empty = MemoryStore::new();
        assert!(bootstrap_admins(&empty, &disabled).await.unwrap().is_none());
        assert!(empty.find_user_by_username("gea_admin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_affiliation_rules() {
        let f = fixture().await;
        let glab = f.service.create_glab(&f.admin, new_glab("GL-1")).await.unwrap();

        let err = f
            .service
            .create_user(&f.admin, new_user("orphan", Role::GlabAssessor))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));

        let mut staff = new_user("staffer", Role::GeaStaff);
        staff.glab_id = Some(glab.glab_id);
        assert!(f.service.create_user(&f.admin, staff).await.is_err());

        let mut assessor = new_user("assessor", Role::GlabAssessor);
        assessor.glab_id = Some(glab.glab_id);
        assessor.certification_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        let assessor = f.service.create_user(&f.admin, assessor).await.unwrap();
        assert_eq!(
            assessor.recertification_due,
            NaiveDate::from_ymd_opt(2027, 6, 1)
        );
    }

    #[tokio::test]
    async fn test_cannot_deactivate_self() {
        let f = fixture().await;
        let err = f
            .service
            .set_user_active(&f.admin, f.admin.user_id, false)
            .await
            .unwrap_err();
        assert_eq!(err.blockers()[0].blocker_type, BlockerType::SelfAction);

        let staff = f
            .service
            .create_user(&f.admin, new_user("staffer", Role::GeaStaff))
            .await
            .unwrap();
        let staff = f
            .service
            .set_user_active(&f.admin, staff.user_id, false)
            .await
            .unwrap();
        assert!(!staff.is_active);
    }

    #[tokio::test]
    async fn test_duplicate_license_number_conflicts() {
        let f = fixture().await;
        f.service.create_glab(&f.admin, new_glab("GL-7")).await.unwrap();
        let err = f
            .service
            .create_glab(&f.admin, new_glab("GL-7"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_glab_admin_creates_clients_for_own_glab() {
        let f = fixture().await;
        let glab = f.service.create_glab(&f.admin, new_glab("GL-2")).await.unwrap();
        let other = f.service.create_glab(&f.admin, new_glab("GL-3")).await.unwrap();

        let mut lab_admin = new_user("labadmin", Role::GlabAdmin);
        lab_admin.glab_id = Some(glab.glab_id);
        let lab_admin = f.service.create_user(&f.admin, lab_admin).await.unwrap();

        let client = f
            .service
            .create_client(
                &lab_admin,
                NewClient {
                    name: "Acme Mining".into(),
                    country: "Kenya".into(),
                    glab_id: Some(other.glab_id),
                    ..NewClient::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(client.glab_id, Some(glab.glab_id));
        assert_eq!(client.number_of_sites, 1);
        assert_eq!(f.service.list_clients(&lab_admin).await.unwrap().len(), 1);
        assert_eq!(f.service.list_glabs(&lab_admin).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_license_payment_rolls_due_date() {
        let f = fixture().await;
        let glab = f.service.create_glab(&f.admin, new_glab("GL-4")).await.unwrap();
        assert_eq!(glab.license_expiry_date, NaiveDate::from_ymd_opt(2026, 1, 1));

        let paid = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let glab = f
            .service
            .record_license_payment(&f.admin, glab.glab_id, paid)
            .await
            .unwrap();
        assert_eq!(glab.last_payment_date, Some(paid));
        assert_eq!(glab.next_payment_due, NaiveDate::from_ymd_opt(2026, 3, 1));
    }
}
