use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    Branch, Cents, Entity, EntityId, EntityKind, EntityRecord, NewEntity, ProfileUpdate,
    ReferralOutcome, SocialMedia, ValidationError, duplicate_branch_addresses,
};

/// A wholesaler, with its referral ledger and branch network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wholesaler {
    #[serde(flatten)]
    pub record: EntityRecord,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_phones: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    /// Entities that registered with this wholesaler's referral code.
    #[serde(default)]
    pub referrals: BTreeSet<EntityId>,
    #[serde(default)]
    pub points: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_media: Option<SocialMedia>,
    #[serde(default)]
    pub balance: Cents,
    /// In registration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<Branch>,
}

#[derive(Debug, Clone)]
pub struct NewWholesaler {
    pub entity: NewEntity,
    pub phone: String,
    pub additional_phones: Vec<String>,
    pub additional_emails: Vec<String>,
    pub sub_category: Option<String>,
    pub social_media: Option<SocialMedia>,
    pub branches: Vec<Branch>,
}

impl NewWholesaler {
    pub fn new(entity: NewEntity, phone: impl Into<String>) -> Self {
        Self {
            entity,
            phone: phone.into(),
            additional_phones: Vec::new(),
            additional_emails: Vec::new(),
            sub_category: None,
            social_media: None,
            branches: Vec::new(),
        }
    }

    pub fn with_sub_category(mut self, sub_category: impl Into<String>) -> Self {
        self.sub_category = Some(sub_category.into());
        self
    }

    pub fn with_additional_phones(mut self, phones: Vec<String>) -> Self {
        self.additional_phones = phones;
        self
    }

    pub fn with_additional_emails(mut self, emails: Vec<String>) -> Self {
        self.additional_emails = emails;
        self
    }

    pub fn with_social_media(mut self, social_media: SocialMedia) -> Self {
        self.social_media = Some(social_media);
        self
    }

    pub fn with_branch(mut self, branch: Branch) -> Self {
        self.branches.push(branch);
        self
    }
}

/// Wholesaler-only fields the owner may change. `None` leaves a field as is;
/// an empty `sub_category` clears it.
#[derive(Debug, Clone, Default)]
pub struct WholesalerDetailsUpdate {
    pub phone: Option<String>,
    pub sub_category: Option<String>,
    pub additional_phones: Option<Vec<String>>,
    pub additional_emails: Option<Vec<String>>,
    pub social_media: Option<SocialMedia>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SettlementError {
    #[error("balance {balance} cannot absorb {delta}")]
    InsufficientFunds { balance: Cents, delta: Cents },

    #[error("balance {balance} would overflow when applying {delta}")]
    Overflow { balance: Cents, delta: Cents },
}

impl Wholesaler {
    /// The primary phone doubles as the contact phone when the draft leaves it blank.
    pub fn submit(id: EntityId, draft: NewWholesaler, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let phone = draft.phone.trim().to_string();
        if phone.is_empty() {
            return Err(ValidationError::EmptyPhone);
        }
        for branch in &draft.branches {
            branch.validate()?;
        }

        let mut entity = draft.entity;
        if !entity.contact_info.has_phone() {
            entity.contact_info.phone = phone.clone();
        }
        let record = EntityRecord::submit(id, entity, now)?;

        Ok(Self {
            record,
            phone,
            additional_phones: clean_list(draft.additional_phones),
            additional_emails: clean_list(draft.additional_emails),
            sub_category: non_empty(draft.sub_category),
            referrals: BTreeSet::new(),
            points: 0,
            social_media: draft.social_media.filter(|s| !s.is_empty()),
            balance: 0,
            branches: draft.branches,
        })
    }

    pub fn has_referred(&self, entity_id: EntityId) -> bool {
        self.referrals.contains(&entity_id)
    }

    /// Credit a referral. Repeating the same referred id is a no-op.
    pub fn record_referral(
        &mut self,
        referred: EntityId,
        points_per_referral: u32,
        now: DateTime<Utc>,
    ) -> Result<ReferralOutcome, ValidationError> {
        if referred == self.record.id {
            return Err(ValidationError::SelfReferral);
        }
        if !self.referrals.insert(referred) {
            return Ok(ReferralOutcome::AlreadyRecorded);
        }
        self.points = self.points.saturating_add(i64::from(points_per_referral));
        self.record.touch(now);
        Ok(ReferralOutcome::Recorded)
    }

    /// Apply a signed amount to the balance and return the new balance.
    /// On error the balance is left untouched.
    pub fn settle(
        &mut self,
        delta: Cents,
        allow_overdraft: bool,
        now: DateTime<Utc>,
    ) -> Result<Cents, SettlementError> {
        let balance = self.balance;
        let next = balance
            .checked_add(delta)
            .ok_or(SettlementError::Overflow { balance, delta })?;
        if next < 0 && !allow_overdraft {
            return Err(SettlementError::InsufficientFunds { balance, delta });
        }
        self.balance = next;
        self.record.touch(now);
        Ok(next)
    }

    /// Administrative override of the points total. The only path that may lower it.
    pub fn correct_points(&mut self, points: i64, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if points < 0 {
            return Err(ValidationError::NegativePoints(points));
        }
        self.points = points;
        self.record.touch(now);
        Ok(())
    }

    /// Append a branch and report addresses now shared by several branches.
    pub fn add_branch(&mut self, branch: Branch, now: DateTime<Utc>) -> Result<Vec<String>, ValidationError> {
        branch.validate()?;
        self.branches.push(branch);
        self.record.touch(now);
        Ok(duplicate_branch_addresses(&self.branches))
    }

    pub fn update_details(
        &mut self,
        update: WholesalerDetailsUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        if let Some(phone) = update.phone {
            let phone = phone.trim().to_string();
            if phone.is_empty() {
                return Err(ValidationError::EmptyPhone);
            }
            if self.record.contact_info.phone == self.phone {
                self.record.contact_info.phone = phone.clone();
            }
            self.phone = phone;
        }
        if let Some(sub_category) = update.sub_category {
            self.sub_category = non_empty(Some(sub_category));
        }
        if let Some(phones) = update.additional_phones {
            self.additional_phones = clean_list(phones);
        }
        if let Some(emails) = update.additional_emails {
            self.additional_emails = clean_list(emails);
        }
        if let Some(social_media) = update.social_media {
            self.social_media = Some(social_media).filter(|s| !s.is_empty());
        }
        self.record.touch(now);
        Ok(())
    }
}

impl Entity for Wholesaler {
    const KIND: EntityKind = EntityKind::Wholesaler;

    fn record(&self) -> &EntityRecord {
        &self.record
    }

    fn record_mut(&mut self) -> &mut EntityRecord {
        &mut self.record
    }

    fn apply_profile(&mut self, mut update: ProfileUpdate, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if let Some(contact) = update.contact_info.as_mut() {
            if !contact.has_phone() {
                contact.phone = self.phone.clone();
            }
        }
        self.record.apply_profile(update, now)
    }
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use super::*;
    use crate::domain::{ApprovalStatus, ContactInfo};

    fn acme(now: DateTime<Utc>) -> Wholesaler {
        let entity = NewEntity::new(Uuid::new_v4(), "Acme", "groceries", ContactInfo::default());
        Wholesaler::submit(Uuid::new_v4(), NewWholesaler::new(entity, "555-0100"), now).unwrap()
    }

    #[test]
    fn test_submit_backfills_contact_phone() {
        let w = acme(Utc::now());
        assert_eq!(w.record.status, ApprovalStatus::Pending);
        assert_eq!(w.record.contact_info.phone, "555-0100");
        assert_eq!(w.points, 0);
        assert_eq!(w.balance, 0);
        assert!(w.referrals.is_empty());
    }

    #[test]
    fn test_submit_requires_phone() {
        let entity = NewEntity::new(Uuid::new_v4(), "Acme", "groceries", ContactInfo::default());
        let result = Wholesaler::submit(Uuid::new_v4(), NewWholesaler::new(entity, "  "), Utc::now());
        assert_eq!(result, Err(ValidationError::EmptyPhone));
    }

    #[test]
    fn test_submit_rejects_branch_without_address() {
        let entity = NewEntity::new(Uuid::new_v4(), "Acme", "groceries", ContactInfo::default());
        let draft = NewWholesaler::new(entity, "555-0100").with_branch(Branch::new("North", ""));
        assert_eq!(
            Wholesaler::submit(Uuid::new_v4(), draft, Utc::now()),
            Err(ValidationError::EmptyBranchAddress)
        );
    }

    #[test]
    fn test_submit_cleans_lists() {
        let entity = NewEntity::new(Uuid::new_v4(), "Acme", "groceries", ContactInfo::default());
        let draft = NewWholesaler::new(entity, "555-0100")
            .with_additional_phones(vec![" 555-0101 ".into(), "".into(), "555-0101".into()])
            .with_sub_category("  ")
            .with_social_media(SocialMedia::default());
        let w = Wholesaler::submit(Uuid::new_v4(), draft, Utc::now()).unwrap();

        // duplicates are kept, blanks are not
        assert_eq!(w.additional_phones, vec!["555-0101", "555-0101"]);
        assert_eq!(w.sub_category, None);
        assert_eq!(w.social_media, None);
    }

    #[test]
    fn test_record_referral_is_idempotent() {
        let now = Utc::now();
        let mut w = acme(now);
        let referred = Uuid::new_v4();
        let later = now + Duration::minutes(1);

        assert_eq!(w.record_referral(referred, 10, later), Ok(ReferralOutcome::Recorded));
        assert_eq!(w.points, 10);
        assert_eq!(w.record.updated_at, later);

        let again = now + Duration::minutes(2);
        assert_eq!(
            w.record_referral(referred, 10, again),
            Ok(ReferralOutcome::AlreadyRecorded)
        );
        assert_eq!(w.points, 10);
        assert_eq!(w.referrals.len(), 1);
        assert_eq!(w.record.updated_at, later);
    }

    #[test]
    fn test_cannot_refer_self() {
        let mut w = acme(Utc::now());
        let id = w.record.id;
        assert_eq!(
            w.record_referral(id, 1, Utc::now()),
            Err(ValidationError::SelfReferral)
        );
        assert!(w.referrals.is_empty());
    }

    #[test]
    fn test_settle_never_goes_negative() {
        let now = Utc::now();
        let mut w = acme(now);

        assert_eq!(w.settle(5000, false, now), Ok(5000));
        assert_eq!(w.settle(-2000, false, now), Ok(3000));
        assert_eq!(
            w.settle(-3001, false, now),
            Err(SettlementError::InsufficientFunds { balance: 3000, delta: -3001 })
        );
        assert_eq!(w.balance, 3000);
        assert_eq!(w.settle(-3000, false, now), Ok(0));
    }

    #[test]
    fn test_settle_with_overdraft() {
        let now = Utc::now();
        let mut w = acme(now);
        assert_eq!(w.settle(-1500, true, now), Ok(-1500));
    }

    #[test]
    fn test_settle_overflow() {
        let now = Utc::now();
        let mut w = acme(now);
        w.balance = Cents::MAX - 1;
        assert!(matches!(w.settle(10, false, now), Err(SettlementError::Overflow { .. })));
        assert_eq!(w.balance, Cents::MAX - 1);
    }

    #[test]
    fn test_correct_points() {
        let now = Utc::now();
        let mut w = acme(now);
        w.points = 40;
        w.correct_points(15, now).unwrap();
        assert_eq!(w.points, 15);
        assert_eq!(w.correct_points(-1, now), Err(ValidationError::NegativePoints(-1)));
        assert_eq!(w.points, 15);
    }

    #[test]
    fn test_add_branch_reports_duplicates() {
        let now = Utc::now();
        let mut w = acme(now);

        let dupes = w.add_branch(Branch::new("North", "1 Main St"), now).unwrap();
        assert!(dupes.is_empty());
        let dupes = w.add_branch(Branch::new("North 2", "1 MAIN ST"), now).unwrap();
        assert_eq!(dupes, vec!["1 main st"]);
        assert_eq!(w.branches.len(), 2);
        assert_eq!(w.branches[1].name, "North 2");
    }

    #[test]
    fn test_update_details_moves_contact_phone() {
        let now = Utc::now();
        let mut w = acme(now);
        w.update_details(
            WholesalerDetailsUpdate {
                phone: Some("555-0199".into()),
                sub_category: Some("dairy".into()),
                ..Default::default()
            },
            now,
        )
        .unwrap();

        assert_eq!(w.phone, "555-0199");
        assert_eq!(w.record.contact_info.phone, "555-0199");
        assert_eq!(w.sub_category.as_deref(), Some("dairy"));
    }

    #[test]
    fn test_profile_contact_keeps_phone() {
        let now = Utc::now();
        let mut w = acme(now);
        let update = ProfileUpdate {
            contact_info: Some(ContactInfo::new("", "orders@acme.test")),
            ..Default::default()
        };
        w.apply_profile(update, now).unwrap();
        assert_eq!(w.record.contact_info.phone, "555-0100");
        assert_eq!(w.record.contact_info.email, "orders@acme.test");
    }

    #[test]
    fn test_document_round_trip_keeps_ledger() {
        let now = Utc::now();
        let mut w = acme(now);
        w.record_referral(Uuid::new_v4(), 3, now).unwrap();
        w.settle(1234, false, now).unwrap();

        let json = serde_json::to_string(&w).unwrap();
        assert!(json.contains("\"businessName\":\"Acme\""));
        assert!(json.contains("\"points\":3"));
        let back: Wholesaler = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }
}
