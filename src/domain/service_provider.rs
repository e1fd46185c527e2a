use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, EntityId, EntityKind, EntityRecord, NewEntity, ValidationError};

/// A business offering services on the marketplace.
/// Carries nothing beyond the shared record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceProvider {
    #[serde(flatten)]
    pub record: EntityRecord,
}

impl ServiceProvider {
    pub fn submit(id: EntityId, draft: NewEntity, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        Ok(Self {
            record: EntityRecord::submit(id, draft, now)?,
        })
    }
}

impl Entity for ServiceProvider {
    const KIND: EntityKind = EntityKind::ServiceProvider;

    fn record(&self) -> &EntityRecord {
        &self.record
    }

    fn record_mut(&mut self) -> &mut EntityRecord {
        &mut self.record
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::{ApprovalStatus, ContactInfo};

    #[test]
    fn test_document_shape_is_flat() {
        let owner = Uuid::new_v4();
        let provider = ServiceProvider::submit(
            Uuid::new_v4(),
            NewEntity::new(owner, "Fixit", "repairs", ContactInfo::new("", "hi@fixit.test")),
            Utc::now(),
        )
        .unwrap();

        let value = serde_json::to_value(&provider).unwrap();
        assert_eq!(value["businessName"], "Fixit");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["ownerUserId"], owner.to_string());
        assert!(value.get("record").is_none());
        assert!(value.get("referralCode").is_none());

        let back: ServiceProvider = serde_json::from_value(value).unwrap();
        assert_eq!(back, provider);
        assert_eq!(back.status(), ApprovalStatus::Pending);
    }
}
