use std::fmt;

/// google api keys are at least this long.
pub const MIN_KEY_LEN: usize = 20;
/// prefix every google api key shares.
pub const KEY_PREFIX: &str = "AIza";

/// user supplied api key. never printed.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    /// `None` for blank input.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        (!key.is_empty()).then_some(Self(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn check(&self) -> CredentialCheck {
        check_credential(&self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// outcome of the shallow key heuristics. none of these block a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialCheck {
    Missing,
    TooShort,
    UnexpectedPrefix,
    LooksValid,
}

impl CredentialCheck {
    pub fn notice(self) -> &'static str {
        match self {
            CredentialCheck::Missing => "Enter your API key to start chatting.",
            CredentialCheck::TooShort => "This API key looks too short. Please check it.",
            CredentialCheck::UnexpectedPrefix => {
                "This doesn't look like a Google API key. Double-check it."
            }
            CredentialCheck::LooksValid => "API key set for this session.",
        }
    }

    pub fn is_warning(self) -> bool {
        matches!(self, CredentialCheck::TooShort | CredentialCheck::UnexpectedPrefix)
    }
}

pub fn check_credential(key: &str) -> CredentialCheck {
    let key = key.trim();
    if key.is_empty() {
        CredentialCheck::Missing
    } else if key.chars().count() < MIN_KEY_LEN {
        CredentialCheck::TooShort
    } else if !key.starts_with(KEY_PREFIX) {
        CredentialCheck::UnexpectedPrefix
    } else {
        CredentialCheck::LooksValid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristics() {
        assert_eq!(check_credential(""), CredentialCheck::Missing);
        assert_eq!(check_credential("   "), CredentialCheck::Missing);
        assert_eq!(check_credential("AIza123"), CredentialCheck::TooShort);
        assert_eq!(check_credential("sk-0123456789abcdefghijk"), CredentialCheck::UnexpectedPrefix);
        assert_eq!(check_credential("AIzaSyA0123456789abcdefgh"), CredentialCheck::LooksValid);
    }

    #[test]
    fn debug_redacts() {
        let c = Credential::new("AIzaSyA0123456789abcdefgh").unwrap();
        assert_eq!(format!("{c:?}"), "Credential(<redacted>)");
        assert!(Credential::new("  ").is_none());
    }
}
