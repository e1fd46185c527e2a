use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{
    ApprovalStatus, Branch, Cents, Entity, EntityId, NewEntity, NewWholesaler, ProfileUpdate,
    ReferralOutcome, ServiceProvider, SettlementError, TransitionError, ValidationError,
    Wholesaler, WholesalerDetailsUpdate, duplicate_branch_addresses, normalize_referral_code,
};
use crate::storage::{ReferralWrite, Repository, WriteOutcome};

use super::{AppError, Clock, IdGenerator, RandomIdGenerator, SystemClock};

/// Business rules that are set by configuration rather than by the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerPolicy {
    /// Points credited to a referrer for each new referral.
    pub points_per_referral: u32,
    /// Whether settlements may take a wholesaler's balance below zero.
    pub allow_overdraft: bool,
    /// How many generated codes to try before giving up on a collision.
    pub referral_code_attempts: u32,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            points_per_referral: 1,
            allow_overdraft: false,
            referral_code_attempts: 5,
        }
    }
}

/// Result of registering an entity under a referral code
#[derive(Debug)]
pub struct ReferralResult {
    pub referrer: Wholesaler,
    pub outcome: ReferralOutcome,
}

/// Result of adding a branch
#[derive(Debug)]
pub struct BranchAdded {
    pub wholesaler: Wholesaler,
    /// Addresses now used by more than one branch, lower-cased.
    pub duplicate_addresses: Vec<String>,
}

/// Application service for the provider/wholesaler registry.
/// This is the primary interface for any client (CLI, API, workers).
pub struct RegistryService {
    repo: Repository,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    policy: LedgerPolicy,
}

impl RegistryService {
    /// Create a new registry service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            clock: Arc::new(SystemClock),
            ids: Arc::new(RandomIdGenerator::default()),
            policy: LedgerPolicy::default(),
        }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_policy(mut self, policy: LedgerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> LedgerPolicy {
        self.policy
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // ========================
    // Registration
    // ========================

    /// Register a service provider. New records are always pending.
    pub async fn submit_service_provider(&self, draft: NewEntity) -> Result<ServiceProvider, AppError> {
        let provider = ServiceProvider::submit(self.ids.new_id(), draft, self.clock.now())?;
        let provider = self.create(provider).await?;
        info!(id = %provider.record.id, name = %provider.record.business_name, "service provider submitted");
        Ok(provider)
    }

    /// Register a wholesaler. New records are always pending.
    pub async fn submit_wholesaler(&self, draft: NewWholesaler) -> Result<Wholesaler, AppError> {
        let wholesaler = Wholesaler::submit(self.ids.new_id(), draft, self.clock.now())?;
        let wholesaler = self.create(wholesaler).await?;
        info!(id = %wholesaler.record.id, name = %wholesaler.record.business_name, "wholesaler submitted");
        Ok(wholesaler)
    }

    async fn create<E: Entity>(&self, entity: E) -> Result<E, AppError> {
        match self.repo.create_if_absent(&entity).await? {
            WriteOutcome::Applied(stored) => Ok(stored),
            WriteOutcome::Duplicate | WriteOutcome::Stale => Err(AppError::Conflict(format!(
                "{} {} already exists",
                E::KIND,
                entity.id()
            ))),
        }
    }

    // ========================
    // Queries
    // ========================

    /// Get a record by ID.
    pub async fn get<E: Entity>(&self, id: EntityId) -> Result<E, AppError> {
        self.repo
            .get::<E>(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", E::KIND, id)))
    }

    /// List records, optionally only those in one approval state.
    pub async fn list<E: Entity>(&self, status: Option<ApprovalStatus>) -> Result<Vec<E>, AppError> {
        Ok(self.repo.list::<E>(status).await?)
    }

    /// The approval queue.
    pub async fn list_pending<E: Entity>(&self) -> Result<Vec<E>, AppError> {
        self.list::<E>(Some(ApprovalStatus::Pending)).await
    }

    /// The wholesaler that referred an entity, if any.
    pub async fn find_referrer(&self, referred_id: EntityId) -> Result<Option<Wholesaler>, AppError> {
        match self.repo.find_referrer(referred_id).await? {
            Some(referrer_id) => Ok(Some(self.get::<Wholesaler>(referrer_id).await?)),
            None => Ok(None),
        }
    }

    // ========================
    // Approval workflow
    // ========================

    /// Approve a pending record.
    pub async fn approve<E: Entity>(&self, id: EntityId, approver: EntityId) -> Result<E, AppError> {
        let now = self.clock.now();
        let entity = self
            .mutate::<E, _>(id, |e| {
                e.record_mut()
                    .approve(approver, now)
                    .map_err(|err| transition_error::<E>(id, err))
            })
            .await?;
        info!(kind = %E::KIND, %id, %approver, "record approved");
        Ok(entity)
    }

    /// Reject a pending record. A reason is required.
    pub async fn reject<E: Entity>(
        &self,
        id: EntityId,
        approver: EntityId,
        reason: &str,
    ) -> Result<E, AppError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::EmptyRejectionReason.into());
        }

        let now = self.clock.now();
        let entity = self
            .mutate::<E, _>(id, |e| {
                e.record_mut()
                    .reject(approver, reason, now)
                    .map_err(|err| transition_error::<E>(id, err))
            })
            .await?;
        info!(kind = %E::KIND, %id, %approver, reason, "record rejected");
        Ok(entity)
    }

    // ========================
    // Profile maintenance
    // ========================

    /// Apply an owner's edit to the shared profile fields.
    pub async fn update_profile<E: Entity>(&self, id: EntityId, update: ProfileUpdate) -> Result<E, AppError> {
        let now = self.clock.now();
        let entity = self
            .mutate::<E, _>(id, |e| Ok(e.apply_profile(update.clone(), now)?))
            .await?;
        info!(kind = %E::KIND, %id, "profile updated");
        Ok(entity)
    }

    pub async fn update_wholesaler_details(
        &self,
        id: EntityId,
        update: WholesalerDetailsUpdate,
    ) -> Result<Wholesaler, AppError> {
        let now = self.clock.now();
        let wholesaler = self
            .mutate::<Wholesaler, _>(id, |w| Ok(w.update_details(update.clone(), now)?))
            .await?;
        info!(%id, "wholesaler details updated");
        Ok(wholesaler)
    }

    /// Append a branch. Duplicate addresses are accepted and reported back.
    pub async fn add_branch(&self, id: EntityId, branch: Branch) -> Result<BranchAdded, AppError> {
        let now = self.clock.now();
        let wholesaler = self
            .mutate::<Wholesaler, _>(id, |w| {
                w.add_branch(branch.clone(), now)?;
                Ok(())
            })
            .await?;

        let duplicate_addresses = duplicate_branch_addresses(&wholesaler.branches);
        if !duplicate_addresses.is_empty() {
            warn!(%id, duplicates = ?duplicate_addresses, "wholesaler has branches sharing an address");
        }
        info!(%id, branches = wholesaler.branches.len(), "branch added");
        Ok(BranchAdded {
            wholesaler,
            duplicate_addresses,
        })
    }

    // ========================
    // Referral ledger
    // ========================

    /// Give a record a referral code unique among records of its kind.
    ///
    /// With `requested`, that exact code is claimed or the call fails with a
    /// conflict. Without it, generated codes are tried up to the policy's
    /// attempt limit. A record that already has a code keeps it.
    pub async fn issue_referral_code<E: Entity>(
        &self,
        id: EntityId,
        requested: Option<&str>,
    ) -> Result<E, AppError> {
        let entity = self.get::<E>(id).await?;
        if entity.record().referral_code.is_some() {
            return Ok(entity);
        }

        let attempts = match requested {
            Some(_) => 1,
            None => self.policy.referral_code_attempts.max(1),
        };

        for attempt in 1..=attempts {
            let code = match requested {
                Some(code) => normalize_referral_code(code)?,
                None => normalize_referral_code(
                    &self.ids.new_referral_code(&entity.record().business_name),
                )?,
            };

            let mut next = entity.clone();
            next.record_mut().referral_code = Some(code.clone());
            next.record_mut().touch(self.clock.now());

            match self.repo.compare_and_update(&next).await? {
                WriteOutcome::Applied(stored) => {
                    info!(kind = %E::KIND, %id, %code, "referral code issued");
                    return Ok(stored);
                }
                WriteOutcome::Duplicate => {
                    warn!(kind = %E::KIND, %id, %code, attempt, "referral code already taken");
                }
                WriteOutcome::Stale => {
                    return Err(AppError::Conflict(format!(
                        "{} {} was modified while issuing a referral code",
                        E::KIND,
                        id
                    )));
                }
            }
        }

        Err(AppError::Conflict(format!(
            "no free referral code for {} {} after {} attempt(s)",
            E::KIND,
            id,
            attempts
        )))
    }

    /// Attribute `referred_id` (a record of kind `E`) to the approved wholesaler
    /// owning `referral_code`, crediting the referrer's points once.
    ///
    /// Repeating the same pair changes nothing. Attributing an entity that
    /// already has a different referrer is a conflict.
    pub async fn register_with_referral<E: Entity>(
        &self,
        referred_id: EntityId,
        referral_code: &str,
    ) -> Result<ReferralResult, AppError> {
        let code = normalize_referral_code(referral_code)?;
        let referrer = self
            .repo
            .find_by_referral_code::<Wholesaler>(&code)
            .await?
            .filter(|w| w.record.is_approved())
            .ok_or_else(|| AppError::NotFound(format!("referral code {}", code)))?;

        self.get::<E>(referred_id).await?;
        if referred_id == referrer.record.id {
            return Err(ValidationError::SelfReferral.into());
        }

        match self.repo.find_referrer(referred_id).await? {
            Some(owner) if owner == referrer.record.id => {
                return Ok(ReferralResult {
                    referrer,
                    outcome: ReferralOutcome::AlreadyRecorded,
                });
            }
            Some(owner) => return Err(already_referred(referred_id, owner)),
            None => {}
        }

        let mut next = referrer.clone();
        let now = self.clock.now();
        if next.record_referral(referred_id, self.policy.points_per_referral, now)?
            == ReferralOutcome::AlreadyRecorded
        {
            return Ok(ReferralResult {
                referrer,
                outcome: ReferralOutcome::AlreadyRecorded,
            });
        }

        match self.repo.record_referral(&next, referred_id, &code, now).await? {
            ReferralWrite::Recorded(stored) => {
                info!(
                    referrer = %stored.record.id,
                    referred = %referred_id,
                    kind = %E::KIND,
                    points = stored.points,
                    "referral recorded"
                );
                Ok(ReferralResult {
                    referrer: stored,
                    outcome: ReferralOutcome::Recorded,
                })
            }
            ReferralWrite::AlreadyRecorded => Ok(ReferralResult {
                referrer: self.get::<Wholesaler>(referrer.record.id).await?,
                outcome: ReferralOutcome::AlreadyRecorded,
            }),
            ReferralWrite::ClaimedBy(owner) => Err(already_referred(referred_id, owner)),
            ReferralWrite::Stale => {
                warn!(referrer = %referrer.record.id, referred = %referred_id, "referral lost a concurrent update");
                Err(AppError::Conflict(format!(
                    "wholesaler {} changed while recording referral of {}",
                    referrer.record.id, referred_id
                )))
            }
        }
    }

    /// Apply a signed settlement to a wholesaler's balance.
    /// A zero delta writes nothing and returns the record as stored.
    pub async fn settle_balance(&self, id: EntityId, delta: Cents) -> Result<Wholesaler, AppError> {
        if delta == 0 {
            return self.get::<Wholesaler>(id).await;
        }

        let now = self.clock.now();
        let allow_overdraft = self.policy.allow_overdraft;
        let wholesaler = self
            .mutate::<Wholesaler, _>(id, |w| match w.settle(delta, allow_overdraft, now) {
                Ok(_) => Ok(()),
                Err(SettlementError::InsufficientFunds { balance, delta }) => {
                    Err(AppError::InsufficientFunds { id, balance, delta })
                }
                Err(SettlementError::Overflow { .. }) => Err(ValidationError::AmountOutOfRange.into()),
            })
            .await?;
        info!(%id, delta, balance = wholesaler.balance, "balance settled");
        Ok(wholesaler)
    }

    /// Administrative correction of a wholesaler's points.
    pub async fn correct_points(&self, id: EntityId, points: i64) -> Result<Wholesaler, AppError> {
        let now = self.clock.now();
        let wholesaler = self
            .mutate::<Wholesaler, _>(id, |w| Ok(w.correct_points(points, now)?))
            .await?;
        info!(%id, points, "points corrected");
        Ok(wholesaler)
    }

    /// Read, change, and write back a record under a version check.
    ///
    /// When the write loses a race, `apply` is replayed against the latest
    /// state: if the change is no longer legal that error is returned,
    /// otherwise the caller gets a retryable conflict.
    async fn mutate<E, F>(&self, id: EntityId, mut apply: F) -> Result<E, AppError>
    where
        E: Entity,
        F: FnMut(&mut E) -> Result<(), AppError>,
    {
        let mut next = self.get::<E>(id).await?;
        apply(&mut next)?;

        match self.repo.compare_and_update(&next).await? {
            WriteOutcome::Applied(stored) => Ok(stored),
            WriteOutcome::Duplicate => Err(AppError::Conflict(format!(
                "{} {} collides with an existing record",
                E::KIND,
                id
            ))),
            WriteOutcome::Stale => {
                warn!(kind = %E::KIND, %id, "record changed concurrently");
                let mut latest = self.get::<E>(id).await?;
                apply(&mut latest)?;
                Err(AppError::Conflict(format!(
                    "{} {} was modified concurrently",
                    E::KIND,
                    id
                )))
            }
        }
    }
}

fn transition_error<E: Entity>(id: EntityId, err: TransitionError) -> AppError {
    AppError::InvalidTransition {
        kind: E::KIND,
        id,
        from: err.from,
        to: err.to,
    }
}

fn already_referred(referred_id: EntityId, owner: EntityId) -> AppError {
    AppError::Conflict(format!(
        "{} was already referred by wholesaler {}",
        referred_id, owner
    ))
}
