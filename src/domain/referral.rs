use super::ValidationError;

/// Characters used for generated code suffixes. No 0/O or 1/I.
pub const REFERRAL_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const MAX_REFERRAL_CODE_LEN: usize = 32;

/// What a referral registration did to the referrer's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralOutcome {
    /// The referred entity was added and points were credited.
    Recorded,
    /// The pair was already on the ledger; nothing changed.
    AlreadyRecorded,
}

/// Canonical form of a referral code: trimmed and upper-cased.
/// Codes are matched case-insensitively by storing them canonicalised.
pub fn normalize_referral_code(code: &str) -> Result<String, ValidationError> {
    let code = code.trim().to_uppercase();
    let valid = !code.is_empty()
        && code.len() <= MAX_REFERRAL_CODE_LEN
        && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');

    if valid {
        Ok(code)
    } else {
        Err(ValidationError::InvalidReferralCode(code))
    }
}

/// Up to four letters or digits taken from the business name, e.g. "Acme Ltd." -> "ACME".
/// Falls back to "REF" for names with nothing usable.
pub fn referral_code_prefix(business_name: &str) -> String {
    let prefix: String = business_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(4)
        .collect::<String>()
        .to_uppercase();

    if prefix.is_empty() {
        "REF".to_string()
    } else {
        prefix
    }
}
