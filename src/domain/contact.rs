use serde::{Deserialize, Serialize};
use url::Url;

use super::ValidationError;

/// How to reach a business. At least one of phone or email must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
}

impl ContactInfo {
    pub fn new(phone: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            email: email.into(),
            address: String::new(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn has_phone(&self) -> bool {
        !self.phone.trim().is_empty()
    }

    pub fn has_email(&self) -> bool {
        !self.email.trim().is_empty()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.has_phone() || self.has_email() {
            Ok(())
        } else {
            Err(ValidationError::NoContactChannel)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialMedia {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl SocialMedia {
    pub fn is_empty(&self) -> bool {
        self.facebook.is_none()
            && self.instagram.is_none()
            && self.whatsapp.is_none()
            && self.website.is_none()
    }
}

/// A physical outlet of a wholesaler. Has no lifecycle of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    #[serde(default)]
    pub name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Branch {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            phone: None,
            email: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.address.trim().is_empty() {
            return Err(ValidationError::EmptyBranchAddress);
        }
        Ok(())
    }

    /// Address with case and whitespace folded, used to spot duplicates.
    pub fn address_key(&self) -> String {
        self.address
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// Addresses that appear on more than one branch, in first-seen order.
/// Duplicates are allowed; callers use this to offer a merge.
pub fn duplicate_branch_addresses(branches: &[Branch]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut duplicates: Vec<String> = Vec::new();

    for branch in branches {
        let key = branch.address_key();
        if seen.contains(&key) {
            if !duplicates.contains(&key) {
                duplicates.push(key);
            }
        } else {
            seen.push(key);
        }
    }

    duplicates
}

/// A logo reference must parse as an absolute http(s) URL with a host.
pub fn validate_logo_url(url: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidLogoUrl(url.to_string());
    let parsed = Url::parse(url.trim()).map_err(|_| invalid())?;

    match parsed.scheme() {
        "http" | "https" => {}
        _ => return Err(invalid()),
    }
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_needs_one_channel() {
        assert!(ContactInfo::new("555-0100", "").validate().is_ok());
        assert!(ContactInfo::new("", "sales@acme.test").validate().is_ok());
        assert_eq!(
            ContactInfo::new("  ", "").with_address("Main St").validate(),
            Err(ValidationError::NoContactChannel)
        );
    }

    #[test]
    fn test_branch_requires_address() {
        assert!(Branch::new("Downtown", "1 Main St").validate().is_ok());
        assert_eq!(
            Branch::new("Downtown", "   ").validate(),
            Err(ValidationError::EmptyBranchAddress)
        );
    }

    #[test]
    fn test_duplicate_branch_addresses() {
        let branches = vec![
            Branch::new("A", "1 Main St"),
            Branch::new("B", "2 Side Rd"),
            Branch::new("C", "1  main st"),
            Branch::new("D", "1 Main St"),
        ];

        assert_eq!(duplicate_branch_addresses(&branches), vec!["1 main st"]);
        assert!(duplicate_branch_addresses(&branches[..2]).is_empty());
    }

    #[test]
    fn test_logo_url() {
        assert!(validate_logo_url("https://cdn.example.com/logo.png").is_ok());
        assert!(validate_logo_url("http://example.com").is_ok());
        assert!(validate_logo_url("ftp://example.com/logo.png").is_err());
        assert!(validate_logo_url("https://").is_err());
        assert!(validate_logo_url("logo.png").is_err());
    }

    #[test]
    fn test_logo_url_rejects_malformed_hosts() {
        for url in [
            "https://[",
            "https://?x",
            "http://a%zz",
            "https://:99999999",
            "https://exa mple.com/logo.png",
        ] {
            assert_eq!(
                validate_logo_url(url),
                Err(ValidationError::InvalidLogoUrl(url.to_string())),
                "{url}"
            );
        }
    }

    #[test]
    fn test_social_media_skips_missing_fields() {
        let social = SocialMedia {
            instagram: Some("@acme".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&social).unwrap();
        assert_eq!(json, r#"{"instagram":"@acme"}"#);
        assert!(!social.is_empty());
        assert!(SocialMedia::default().is_empty());
    }
}
