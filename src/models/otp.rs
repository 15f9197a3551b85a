use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pending one-time password for a single identifier (email or phone).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OtpEntry {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
}

/// Result of checking a submitted code against the pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Verified,
    NotFound,
    Expired,
    TooManyAttempts,
    /// Wrong code; `attempts` is the failure count after this guess.
    Mismatch { attempts: u32 },
}

impl OtpCheck {
    /// Whether the pending entry is spent after this outcome.
    pub fn consumes_entry(self, max_attempts: u32) -> bool {
        match self {
            OtpCheck::NotFound => false,
            OtpCheck::Mismatch { attempts } => attempts >= max_attempts,
            OtpCheck::Verified | OtpCheck::Expired | OtpCheck::TooManyAttempts => true,
        }
    }
}

impl OtpEntry {
    pub fn new(code: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            code: code.into(),
            expires_at,
            attempts: 0,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Checks `submitted` at `now`, counting a wrong guess against the entry.
    /// Stores call this while holding the entry exclusively and drop the
    /// entry when [`OtpCheck::consumes_entry`] says so.
    pub fn check(&mut self, submitted: &str, now: DateTime<Utc>, max_attempts: u32) -> OtpCheck {
        if self.is_expired_at(now) {
            return OtpCheck::Expired;
        }
        if self.attempts >= max_attempts {
            return OtpCheck::TooManyAttempts;
        }
        if !constant_time_eq(self.code.as_bytes(), submitted.as_bytes()) {
            self.attempts += 1;
            return OtpCheck::Mismatch {
                attempts: self.attempts,
            };
        }
        OtpCheck::Verified
    }
}

/// Identifiers are keyed trimmed and lowercased so `A@b.com` and `a@b.com`
/// share one live code.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_ascii_lowercase()
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    #[test]
    fn test_expiry_is_strictly_after_deadline() {
        let now = Utc::now();
        let entry = OtpEntry::new("4821", now);
        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + Duration::milliseconds(1)));
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("  A@B.com "), "a@b.com");
        assert_eq!(normalize_identifier("+919876543210"), "+919876543210");
    }

    #[test]
    fn test_check_counts_wrong_guesses() {
        let now = Utc::now();
        let mut entry = OtpEntry::new("4821", now + Duration::minutes(5));

        assert_eq!(entry.check("0001", now, 3), OtpCheck::Mismatch { attempts: 1 });
        assert_eq!(entry.check("0002", now, 3), OtpCheck::Mismatch { attempts: 2 });
        assert_eq!(entry.check("4821", now, 3), OtpCheck::Verified);
        assert_eq!(entry.attempts, 2);
    }

    #[test]
    fn test_check_expired_before_attempts() {
        let now = Utc::now();
        let mut entry = OtpEntry::new("4821", now - Duration::seconds(1));
        entry.attempts = 3;
        assert_eq!(entry.check("4821", now, 3), OtpCheck::Expired);
    }

    #[rstest]
    #[case(OtpCheck::Verified, true)]
    #[case(OtpCheck::Expired, true)]
    #[case(OtpCheck::TooManyAttempts, true)]
    #[case(OtpCheck::NotFound, false)]
    #[case(OtpCheck::Mismatch { attempts: 2 }, false)]
    #[case(OtpCheck::Mismatch { attempts: 3 }, true)]
    fn test_consumes_entry(#[case] outcome: OtpCheck, #[case] expected: bool) {
        assert_eq!(outcome.consumes_entry(3), expected);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"4821", b"4821"));
        assert!(!constant_time_eq(b"4821", b"4822"));
        assert!(!constant_time_eq(b"4821", b"482"));
    }
}
