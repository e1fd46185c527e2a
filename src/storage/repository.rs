use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ApprovalStatus, Entity, EntityId, Wholesaler};

use super::{MIGRATION_001_ENTITIES, MIGRATION_002_REFERRALS};

/// Result of a conditional write.
#[derive(Debug)]
pub enum WriteOutcome<E> {
    /// The write committed. Carries the record as stored, version included.
    Applied(E),
    /// The stored version no longer matches the one the caller read.
    Stale,
    /// A unique key (id or referral code) is already taken.
    Duplicate,
}

/// Result of attaching a referred entity to a referrer.
#[derive(Debug)]
pub enum ReferralWrite {
    Recorded(Wholesaler),
    /// The referral row already points at this referrer.
    AlreadyRecorded,
    /// The referred entity belongs to another referrer.
    ClaimedBy(EntityId),
    /// The referrer changed since it was read, or the store was busy.
    Stale,
}

struct ReferralClaim<'a> {
    referred_id: EntityId,
    referral_code: &'a str,
    recorded_at: DateTime<Utc>,
    expected: i64,
    document: &'a str,
}

/// Document store for entity records.
/// Every mutation goes through a version precondition; nothing is read-then-written blindly.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_ENTITIES)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::query(MIGRATION_002_REFERRALS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Record store
    // ========================

    /// Insert a new record. Reports `Duplicate` if the id or referral code exists.
    pub async fn create_if_absent<E: Entity>(&self, entity: &E) -> Result<WriteOutcome<E>> {
        let record = entity.record();
        let document = serde_json::to_string(entity).context("Failed to encode record")?;

        let sql = format!(
            r#"
            INSERT INTO {} (id, owner_user_id, referral_code, status, version, created_at, updated_at, document)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            E::KIND.table()
        );

        let result = sqlx::query(&sql)
            .bind(record.id.to_string())
            .bind(record.owner_user_id.to_string())
            .bind(&record.referral_code)
            .bind(record.status.as_str())
            .bind(record.version)
            .bind(record.created_at.to_rfc3339())
            .bind(record.updated_at.to_rfc3339())
            .bind(&document)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(WriteOutcome::Applied(entity.clone())),
            Err(err) if is_unique_violation(&err) => Ok(WriteOutcome::Duplicate),
            Err(err) => Err(err).context("Failed to save record"),
        }
    }

    /// Get a record by ID.
    pub async fn get<E: Entity>(&self, id: EntityId) -> Result<Option<E>> {
        let sql = format!("SELECT document FROM {} WHERE id = ?", E::KIND.table());
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch record")?;

        row.map(|row| Self::row_to_entity::<E>(&row)).transpose()
    }

    /// Get the record that owns a (normalised) referral code.
    pub async fn find_by_referral_code<E: Entity>(&self, code: &str) -> Result<Option<E>> {
        let sql = format!(
            "SELECT document FROM {} WHERE referral_code = ?",
            E::KIND.table()
        );
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch record by referral code")?;

        row.map(|row| Self::row_to_entity::<E>(&row)).transpose()
    }

    /// List records, oldest first, optionally restricted to one status.
    pub async fn list<E: Entity>(&self, status: Option<ApprovalStatus>) -> Result<Vec<E>> {
        let mut sql = format!("SELECT document FROM {}", E::KIND.table());
        if status.is_some() {
            sql.push_str(" WHERE status = ?");
        }
        sql.push_str(" ORDER BY created_at, id");

        let mut query = sqlx::query(&sql);
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list records")?;

        rows.iter().map(Self::row_to_entity::<E>).collect()
    }

    /// Replace a record if its stored version still equals `entity.version()`.
    /// The stored copy gets `version + 1`.
    pub async fn compare_and_update<E: Entity>(&self, entity: &E) -> Result<WriteOutcome<E>> {
        let expected = entity.version();
        let mut next = entity.clone();
        next.record_mut().version = expected + 1;

        let record = next.record();
        let document = serde_json::to_string(&next).context("Failed to encode record")?;
        let sql = format!(
            r#"
            UPDATE {}
            SET referral_code = ?, status = ?, version = ?, updated_at = ?, document = ?
            WHERE id = ? AND version = ?
            "#,
            E::KIND.table()
        );

        let result = sqlx::query(&sql)
            .bind(&record.referral_code)
            .bind(record.status.as_str())
            .bind(record.version)
            .bind(record.updated_at.to_rfc3339())
            .bind(&document)
            .bind(record.id.to_string())
            .bind(expected)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => Ok(WriteOutcome::Applied(next)),
            Ok(_) => {
                let kind = E::KIND;
                let id = next.record().id;
                debug!(%kind, %id, expected, "compare-and-update missed");
                Ok(WriteOutcome::Stale)
            }
            Err(err) if is_unique_violation(&err) => Ok(WriteOutcome::Duplicate),
            Err(err) if is_busy(&err) => {
                let kind = E::KIND;
                let id = next.record().id;
                debug!(%kind, %id, "store busy during compare-and-update");
                Ok(WriteOutcome::Stale)
            }
            Err(err) => Err(err).context("Failed to update record"),
        }
    }

    fn row_to_entity<E: Entity>(row: &sqlx::sqlite::SqliteRow) -> Result<E> {
        let document: String = row.get("document");
        serde_json::from_str(&document)
            .with_context(|| format!("Invalid {} document", E::KIND))
    }

    // ========================
    // Referral index
    // ========================

    /// Which wholesaler referred an entity, if any.
    pub async fn find_referrer(&self, referred_id: EntityId) -> Result<Option<EntityId>> {
        let row = sqlx::query("SELECT referrer_id FROM referrals WHERE referred_id = ?")
            .bind(referred_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch referrer")?;

        match row {
            Some(row) => {
                let id: String = row.get("referrer_id");
                Ok(Some(Uuid::parse_str(&id).context("Invalid referrer ID")?))
            }
            None => Ok(None),
        }
    }

    /// Claim `referred_id` for `referrer` and store the referrer's updated ledger,
    /// in one transaction. `referrer` must already contain the referral and carry
    /// the version it was read at.
    pub async fn record_referral(
        &self,
        referrer: &Wholesaler,
        referred_id: EntityId,
        referral_code: &str,
        recorded_at: DateTime<Utc>,
    ) -> Result<ReferralWrite> {
        let expected = referrer.record.version;
        let mut next = referrer.clone();
        next.record.version = expected + 1;
        let document = serde_json::to_string(&next).context("Failed to encode record")?;
        let referrer_id = next.record.id;

        let claim = ReferralClaim {
            referred_id,
            referral_code,
            recorded_at,
            expected,
            document: &document,
        };
        match self.write_referral(next, claim).await {
            Ok(write) => Ok(write),
            Err(err) if is_busy(&err) => {
                debug!(id = %referrer_id, %referred_id, "store busy while recording referral");
                Ok(ReferralWrite::Stale)
            }
            Err(err) => Err(err).context("Failed to record referral"),
        }
    }

    async fn write_referral(
        &self,
        next: Wholesaler,
        claim: ReferralClaim<'_>,
    ) -> std::result::Result<ReferralWrite, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Writing first makes the transaction take the write lock up front,
        // so concurrent claims queue on the busy timeout instead of deadlocking.
        let inserted = sqlx::query(
            r#"
            INSERT INTO referrals (referred_id, referrer_id, referral_code, recorded_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(claim.referred_id.to_string())
        .bind(next.record.id.to_string())
        .bind(claim.referral_code)
        .bind(claim.recorded_at.to_rfc3339())
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                let owner = sqlx::query("SELECT referrer_id FROM referrals WHERE referred_id = ?")
                    .bind(claim.referred_id.to_string())
                    .fetch_optional(&mut *tx)
                    .await?;
                tx.rollback().await?;

                let Some(row) = owner else {
                    return Ok(ReferralWrite::Stale);
                };
                let id: String = row.get("referrer_id");
                let owner = Uuid::parse_str(&id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
                return Ok(if owner == next.record.id {
                    ReferralWrite::AlreadyRecorded
                } else {
                    ReferralWrite::ClaimedBy(owner)
                });
            }
            Err(err) => return Err(err),
        }

        let updated = sqlx::query(
            r#"
            UPDATE wholesalers
            SET version = ?, updated_at = ?, document = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(next.record.version)
        .bind(next.record.updated_at.to_rfc3339())
        .bind(claim.document)
        .bind(next.record.id.to_string())
        .bind(claim.expected)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            debug!(id = %next.record.id, expected = claim.expected, "referrer changed during referral");
            tx.rollback().await?;
            return Ok(ReferralWrite::Stale);
        }

        tx.commit().await?;
        Ok(ReferralWrite::Recorded(next))
    }

    /// Referred ids attributed to a wholesaler, from the referral index.
    pub async fn list_referred(&self, referrer_id: EntityId) -> Result<Vec<EntityId>> {
        let rows = sqlx::query(
            "SELECT referred_id FROM referrals WHERE referrer_id = ? ORDER BY recorded_at, referred_id",
        )
        .bind(referrer_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list referrals")?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("referred_id");
                Uuid::parse_str(&id).context("Invalid referred ID")
            })
            .collect()
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

/// SQLITE_BUSY or SQLITE_LOCKED, extended codes included.
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    }
}
