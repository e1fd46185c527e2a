// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use barrim_registry::application::{Clock, IdGenerator, LedgerPolicy, RegistryService};
use barrim_registry::domain::{
    ContactInfo, EntityId, NewEntity, NewWholesaler, ServiceProvider, UserId, Wholesaler,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tempfile::TempDir;
use uuid::Uuid;

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) -> DateTime<Utc> {
        let mut now = self.now.lock().unwrap();
        *now += by;
        *now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Hands out queued referral codes, then numbered fallbacks.
pub struct ScriptedIds {
    codes: Mutex<VecDeque<String>>,
    issued: Mutex<u32>,
}

impl ScriptedIds {
    pub fn new() -> Self {
        Self {
            codes: Mutex::new(VecDeque::new()),
            issued: Mutex::new(0),
        }
    }

    pub fn queue_codes(&self, codes: &[&str]) {
        self.codes
            .lock()
            .unwrap()
            .extend(codes.iter().map(|c| c.to_string()));
    }

    pub fn codes_issued(&self) -> u32 {
        *self.issued.lock().unwrap()
    }
}

impl IdGenerator for ScriptedIds {
    fn new_id(&self) -> EntityId {
        Uuid::new_v4()
    }

    fn new_referral_code(&self, _business_name: &str) -> String {
        let mut issued = self.issued.lock().unwrap();
        *issued += 1;
        self.codes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("GEN{}", *issued))
    }
}

pub struct TestRegistry {
    pub service: Arc<RegistryService>,
    pub clock: Arc<ManualClock>,
    pub ids: Arc<ScriptedIds>,
    _temp: TempDir,
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Helper to create a test service with a temporary database
pub async fn test_registry() -> Result<TestRegistry> {
    test_registry_with_policy(LedgerPolicy::default()).await
}

pub async fn test_registry_with_policy(policy: LedgerPolicy) -> Result<TestRegistry> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let clock = Arc::new(ManualClock::at(parse_date("2024-03-01")));
    let ids = Arc::new(ScriptedIds::new());

    let service = RegistryService::init(db_path.to_str().unwrap())
        .await?
        .with_clock(clock.clone())
        .with_id_generator(ids.clone())
        .with_policy(policy);

    Ok(TestRegistry {
        service: Arc::new(service),
        clock,
        ids,
        _temp: temp_dir,
    })
}

/// Wholesaler draft with only the required fields.
pub fn wholesaler_draft(owner: UserId, name: &str, phone: &str) -> NewWholesaler {
    let entity = NewEntity::new(owner, name, "groceries", ContactInfo::default());
    NewWholesaler::new(entity, phone)
}

pub fn provider_draft(owner: UserId, name: &str) -> NewEntity {
    NewEntity::new(
        owner,
        name,
        "repairs",
        ContactInfo::new("555-0200", "hello@example.test"),
    )
}

/// Test fixture: common registry setups
pub struct Fixtures;

impl Fixtures {
    pub async fn submit_wholesaler(registry: &TestRegistry, name: &str) -> Result<Wholesaler> {
        Ok(registry
            .service
            .submit_wholesaler(wholesaler_draft(Uuid::new_v4(), name, "555-0100"))
            .await?)
    }

    pub async fn submit_provider(registry: &TestRegistry, name: &str) -> Result<ServiceProvider> {
        Ok(registry
            .service
            .submit_service_provider(provider_draft(Uuid::new_v4(), name))
            .await?)
    }

    /// Submit, approve and give a wholesaler the requested referral code.
    pub async fn approved_referrer(
        registry: &TestRegistry,
        name: &str,
        code: &str,
    ) -> Result<Wholesaler> {
        let w = Self::submit_wholesaler(registry, name).await?;
        registry
            .service
            .approve::<Wholesaler>(w.record.id, Uuid::new_v4())
            .await?;
        Ok(registry
            .service
            .issue_referral_code::<Wholesaler>(w.record.id, Some(code))
            .await?)
    }
}
