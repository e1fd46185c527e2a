use thiserror::Error;

/// Malformed input. Never persisted and never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("business name must not be empty")]
    EmptyBusinessName,

    #[error("owner user id is required")]
    MissingOwner,

    #[error("phone must not be empty")]
    EmptyPhone,

    #[error("contact info needs at least a phone or an email")]
    NoContactChannel,

    #[error("branch address must not be empty")]
    EmptyBranchAddress,

    #[error("logo url is not an http(s) url: {0}")]
    InvalidLogoUrl(String),

    #[error("invalid referral code: {0}")]
    InvalidReferralCode(String),

    #[error("an entity cannot refer itself")]
    SelfReferral,

    #[error("rejection reason must not be empty")]
    EmptyRejectionReason,

    #[error("settlement amount is out of range")]
    AmountOutOfRange,

    #[error("points cannot be negative: {0}")]
    NegativePoints(i64),
}
