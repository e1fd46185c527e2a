use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use super::{ApprovalStatus, ContactInfo, TransitionError, ValidationError, validate_logo_url};

pub type EntityId = Uuid;
pub type UserId = Uuid;

/// Which collection a record lives in. Referral codes are unique per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    ServiceProvider,
    Wholesaler,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::ServiceProvider => "service_provider",
            EntityKind::Wholesaler => "wholesaler",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "service_provider" | "provider" => Some(EntityKind::ServiceProvider),
            "wholesaler" => Some(EntityKind::Wholesaler),
            _ => None,
        }
    }

    /// Backing table for this kind of record.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::ServiceProvider => "service_providers",
            EntityKind::Wholesaler => "wholesalers",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity, ownership and approval state shared by every persisted business.
/// Embedded by `ServiceProvider` and `Wholesaler` rather than inherited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub id: EntityId,
    pub owner_user_id: UserId,
    pub business_name: String,
    pub category: String,
    pub contact_info: ContactInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Bumped by the store on every committed mutation.
    #[serde(default)]
    pub version: i64,
}

/// Caller-supplied fields for a new record.
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub owner_user_id: Option<UserId>,
    pub created_by: UserId,
    pub business_name: String,
    pub category: String,
    pub contact_info: ContactInfo,
    pub logo_url: Option<String>,
}

impl NewEntity {
    pub fn new(
        owner_user_id: UserId,
        business_name: impl Into<String>,
        category: impl Into<String>,
        contact_info: ContactInfo,
    ) -> Self {
        Self {
            owner_user_id: Some(owner_user_id),
            created_by: owner_user_id,
            business_name: business_name.into(),
            category: category.into(),
            contact_info,
            logo_url: None,
        }
    }

    /// Record a different actor as creator, e.g. an admin registering on someone's behalf.
    pub fn with_created_by(mut self, actor: UserId) -> Self {
        self.created_by = actor;
        self
    }

    pub fn with_logo_url(mut self, url: impl Into<String>) -> Self {
        self.logo_url = Some(url.into());
        self
    }

    fn owner(&self) -> Result<UserId, ValidationError> {
        match self.owner_user_id {
            Some(owner) if !owner.is_nil() => Ok(owner),
            _ => Err(ValidationError::MissingOwner),
        }
    }
}

/// Owner-editable profile fields. `None` leaves a field as is;
/// an empty `logo_url` clears the logo.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub business_name: Option<String>,
    pub category: Option<String>,
    pub contact_info: Option<ContactInfo>,
    pub logo_url: Option<String>,
}

impl EntityRecord {
    /// Build a pending record from a validated draft. `created_at == updated_at`.
    pub fn submit(id: EntityId, draft: NewEntity, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let owner_user_id = draft.owner()?;
        let business_name = draft.business_name.trim().to_string();
        if business_name.is_empty() {
            return Err(ValidationError::EmptyBusinessName);
        }
        draft.contact_info.validate()?;
        let logo_url = normalize_logo_url(draft.logo_url)?;

        Ok(Self {
            id,
            owner_user_id,
            business_name,
            category: draft.category.trim().to_string(),
            contact_info: draft.contact_info,
            logo_url,
            referral_code: None,
            created_by: draft.created_by,
            created_at: now,
            updated_at: now,
            status: ApprovalStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
            version: 0,
        })
    }

    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn approve(&mut self, approver: UserId, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.status = self.status.transition_to(ApprovalStatus::Approved)?;
        self.reviewed_by = Some(approver);
        self.reviewed_at = Some(now);
        self.touch(now);
        Ok(())
    }

    pub fn reject(
        &mut self,
        approver: UserId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.status = self.status.transition_to(ApprovalStatus::Rejected)?;
        self.reviewed_by = Some(approver);
        self.reviewed_at = Some(now);
        self.rejection_reason = Some(reason.into());
        self.touch(now);
        Ok(())
    }

    /// Apply an owner edit. Either every field changes or none does.
    pub fn apply_profile(&mut self, update: ProfileUpdate, now: DateTime<Utc>) -> Result<(), ValidationError> {
        let mut next = self.clone();

        if let Some(name) = update.business_name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ValidationError::EmptyBusinessName);
            }
            next.business_name = name;
        }
        if let Some(category) = update.category {
            next.category = category.trim().to_string();
        }
        if let Some(contact) = update.contact_info {
            contact.validate()?;
            next.contact_info = contact;
        }
        if let Some(url) = update.logo_url {
            next.logo_url = normalize_logo_url(Some(url))?;
        }

        next.touch(now);
        *self = next;
        Ok(())
    }
}

fn normalize_logo_url(url: Option<String>) -> Result<Option<String>, ValidationError> {
    match url.map(|u| u.trim().to_string()) {
        Some(u) if u.is_empty() => Ok(None),
        Some(u) => {
            validate_logo_url(&u)?;
            Ok(Some(u))
        }
        None => Ok(None),
    }
}

/// A persisted business record of a particular kind.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    const KIND: EntityKind;

    fn record(&self) -> &EntityRecord;

    fn record_mut(&mut self) -> &mut EntityRecord;

    fn id(&self) -> EntityId {
        self.record().id
    }

    fn status(&self) -> ApprovalStatus {
        self.record().status
    }

    fn version(&self) -> i64 {
        self.record().version
    }

    fn apply_profile(&mut self, update: ProfileUpdate, now: DateTime<Utc>) -> Result<(), ValidationError> {
        self.record_mut().apply_profile(update, now)
    }
}
