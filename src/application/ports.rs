use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::domain::{EntityId, REFERRAL_CODE_ALPHABET, referral_code_prefix};

/// Source of "now". Injected so tests can pin and advance time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Produces record identifiers and candidate referral codes.
/// Code uniqueness is checked by the store, not here.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> EntityId;

    fn new_referral_code(&self, business_name: &str) -> String;
}

/// Random v4 ids; codes are a name prefix plus a random suffix, e.g. "ACME7KQ2P".
pub struct RandomIdGenerator {
    suffix_len: usize,
}

impl RandomIdGenerator {
    pub fn new(suffix_len: usize) -> Self {
        Self {
            suffix_len: suffix_len.max(1),
        }
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::new(5)
    }
}

impl IdGenerator for RandomIdGenerator {
    fn new_id(&self) -> EntityId {
        Uuid::new_v4()
    }

    fn new_referral_code(&self, business_name: &str) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..self.suffix_len)
            .map(|_| REFERRAL_CODE_ALPHABET[rng.gen_range(0..REFERRAL_CODE_ALPHABET.len())] as char)
            .collect();
        format!("{}{}", referral_code_prefix(business_name), suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::normalize_referral_code;

    #[test]
    fn test_generated_codes_are_valid() {
        let ids = RandomIdGenerator::default();
        for _ in 0..50 {
            let code = ids.new_referral_code("Acme Wholesale");
            assert!(code.starts_with("ACME"));
            assert_eq!(code.len(), 9);
            assert_eq!(normalize_referral_code(&code), Ok(code.clone()));
        }
    }

    #[test]
    fn test_ids_are_distinct() {
        let ids = RandomIdGenerator::default();
        assert_ne!(ids.new_id(), ids.new_id());
    }
}
