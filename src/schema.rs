use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user as stored in the registry.
///
/// The aggregation core receives users by value and never
/// writes them back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Unique, stable identifier
    pub email: String,

    /// Credential used for every remote call made on behalf of this user
    #[serde(alias = "token")]
    pub credential: Credential,
}

// ------------------------------------------------------------
// Credential
// ------------------------------------------------------------
//
// Opaque access credential obtained during sign-up.
// Refreshing it is the job of the surrounding service.
//
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub access_token: String,

    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Absent means "does not expire" (or unknown)
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            access_token: token.into(),
            refresh_token: None,
            expiry: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Display name and photo of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub name: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Failed,
}

// ------------------------------------------------------------
// Per-user outcome
// ------------------------------------------------------------
//
// Exactly one of these is produced for every user that entered
// the fan-out. A failed fetch is still a result: `status` is
// `Failed`, `error` carries the detail, and the step fields hold
// whatever was obtained before the failure (or null).
//
// A step count of `Some(0)` means "no data"; it is never used
// to signal a failed call.
//
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricResult {
    pub email: String,
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub steps_day: Option<u64>,
    pub steps_week: Option<u64>,
    pub status: ResultStatus,
    pub error: Option<String>,
}

impl MetricResult {
    /// An empty, successful result for `email`.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            photo_url: None,
            steps_day: None,
            steps_week: None,
            status: ResultStatus::Ok,
            error: None,
        }
    }

    /// A failed result carrying no data.
    pub fn failed(email: impl Into<String>, error: impl Into<String>) -> Self {
        let mut result = Self::new(email);
        result.mark_failed(error);
        result
    }

    /// Flags the result failed. The first recorded error wins.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ResultStatus::Failed;
        if self.error.is_none() {
            self.error = Some(error.into());
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResultStatus::Ok
    }
}
