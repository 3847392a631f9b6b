//! Users and organizations

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{add_years, CERTIFICATION_CYCLE_YEARS};
use crate::permissions::Role;

/// A portal account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    /// Set for GLAB roles only
    pub glab_id: Option<Uuid>,
    /// Set for client users only
    pub client_id: Option<Uuid>,

    /// Assessor certificate code
    pub assessor_code: Option<String>,
    pub certification_date: Option<NaiveDate>,
    /// certification_date + 3 years
    pub recertification_due: Option<NaiveDate>,

    pub email_notifications: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            full_name: None,
            role,
            glab_id: None,
            client_id: None,
            assessor_code: None,
            certification_date: None,
            recertification_due: None,
            email_notifications: true,
            is_active: true,
            created_at: Utc::now(),
            created_by: None,
        }
    }

    /// Name shown to other users
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }

    /// Record an assessor certification and derive the recertification date
    pub fn certify(&mut self, certified_on: NaiveDate) {
        self.certification_date = Some(certified_on);
        self.recertification_due = Some(add_years(certified_on, CERTIFICATION_CYCLE_YEARS));
    }

    pub fn belongs_to_glab(&self, glab_id: Uuid) -> bool {
        self.glab_id == Some(glab_id)
    }
}

/// License term of a GLAB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "lowercase")
)]
pub enum LicenseType {
    Annual,
    Triennial,
}

impl LicenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Annual => "annual",
            Self::Triennial => "triennial",
        }
    }

    pub fn term_years(&self) -> u32 {
        match self {
            Self::Annual => 1,
            Self::Triennial => 3,
        }
    }
}

/// GLAB license status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "lowercase")
)]
pub enum GlabStatus {
    Active,
    Suspended,
    Terminated,
}

impl GlabStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Terminated => "terminated",
        }
    }
}

/// Licensed operating organization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Glab {
    pub glab_id: Uuid,
    pub name: String,
    pub license_number: String,
    pub country: String,
    pub address: Option<String>,
    pub contact_email: String,
    pub contact_phone: Option<String>,

    pub license_type: LicenseType,
    pub license_start_date: Option<NaiveDate>,
    pub license_expiry_date: Option<NaiveDate>,
    pub last_payment_date: Option<NaiveDate>,
    /// Drives license payment reminders
    pub next_payment_due: Option<NaiveDate>,

    pub status: GlabStatus,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
}

impl Glab {
    /// Start (or restart) the license term
    pub fn start_license(&mut self, license_type: LicenseType, start: NaiveDate) {
        self.license_type = license_type;
        self.license_start_date = Some(start);
        self.license_expiry_date = Some(add_years(start, license_type.term_years()));
    }

    /// Record a license payment; the next one falls due one term later
    pub fn record_payment(&mut self, paid_on: NaiveDate) {
        self.last_payment_date = Some(paid_on);
        self.next_payment_due = Some(add_years(paid_on, self.license_type.term_years()));
    }

    pub fn is_active(&self) -> bool {
        self.status == GlabStatus::Active
    }
}

/// Organization seeking certification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Client {
    pub client_id: Uuid,
    pub name: String,
    pub country: String,
    pub registered_address: Option<String>,
    pub industry_sector: Option<String>,
    pub total_employees: Option<i32>,
    pub number_of_sites: i32,
    pub primary_contact_name: Option<String>,
    pub primary_contact_email: Option<String>,
    pub primary_contact_phone: Option<String>,
    /// Optional pre-assignment to one GLAB
    pub glab_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
}
