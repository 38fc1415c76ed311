//! One-time token value type.

use crate::error::TokenIssuanceError;
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Characters of the token value that may appear in diagnostics.
const REDACTED_PREFIX_LEN: usize = 4;

/// A short-lived, single-use credential for one widget embedding.
///
/// Deliberately not `Clone`: the value moves from the issuer to the session
/// and from the session into exactly one outbound message.
pub struct OneTimeToken {
    value: String,
    expires_in_secs: u64,
    issued_at: DateTime<Utc>,
}

impl OneTimeToken {
    /// Validate an issuer response into a token stamped with the current time.
    pub fn new(value: impl Into<String>, expires_in: i64) -> Result<Self, TokenIssuanceError> {
        Self::with_issue_time(value, expires_in, Utc::now())
    }

    pub fn with_issue_time(
        value: impl Into<String>,
        expires_in: i64,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, TokenIssuanceError> {
        let value = value.into();
        if value.is_empty() {
            return Err(TokenIssuanceError::MalformedResponse(
                "empty token value".to_string(),
            ));
        }
        if expires_in <= 0 {
            return Err(TokenIssuanceError::MalformedResponse(format!(
                "non-positive expires_in: {}",
                expires_in
            )));
        }

        Ok(Self {
            value,
            expires_in_secs: expires_in as u64,
            issued_at,
        })
    }

    pub fn expires_in_secs(&self) -> u64 {
        self.expires_in_secs
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        let secs = i64::try_from(self.expires_in_secs).unwrap_or(i64::MAX);
        Duration::try_seconds(secs)
            .and_then(|ttl| self.issued_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Bounded prefix plus length, safe for logs.
    pub fn redacted(&self) -> String {
        let prefix: String = self.value.chars().take(REDACTED_PREFIX_LEN).collect();
        format!("{}…(len={})", prefix, self.value.chars().count())
    }

    /// Consume the token, yielding its value for delivery.
    pub fn into_value(self) -> String {
        self.value
    }
}

impl fmt::Debug for OneTimeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneTimeToken")
            .field("value", &self.redacted())
            .field("expires_in_secs", &self.expires_in_secs)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}
