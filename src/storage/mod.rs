mod repository;

pub use repository::*;

/// SQL migration for the entity collections
pub const MIGRATION_001_ENTITIES: &str = include_str!("migrations/001_entities.sql");

/// SQL migration for the referral index
pub const MIGRATION_002_REFERRALS: &str = include_str!("migrations/002_referrals.sql");
