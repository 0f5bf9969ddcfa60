//! Fakes for the two external collaborators, shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;

use crate::error::{FetchError, SourceError};
use crate::fitness::MetricFetcher;
use crate::registry::UserSource;
use crate::registry::source::UserStream;
use crate::schema::{Credential, Profile, User};
use crate::util::TimeRange;

pub fn install_crypto() {
    let _ = rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider());
}

pub fn user(email: &str) -> User {
    User {
        email: email.to_string(),
        credential: Credential::bearer(format!("token-{}", email)),
    }
}

// ------------------------------------------------------------
// Registry fake
// ------------------------------------------------------------

enum Entry {
    User(User),
    Broken(String),
}

/// In-memory registry. Entries are yielded in insertion order.
pub struct StaticUserSource {
    entries: Vec<Entry>,
    unavailable: bool,
}

impl StaticUserSource {
    pub fn new(emails: &[&str]) -> Self {
        Self {
            entries: emails.iter().map(|e| Entry::User(user(e))).collect(),
            unavailable: false,
        }
    }

    /// A registry that cannot be opened at all.
    pub fn unavailable() -> Self {
        Self {
            entries: Vec::new(),
            unavailable: true,
        }
    }

    /// Appends an enumeration failure after the current entries.
    pub fn then_fail(mut self, reason: &str) -> Self {
        self.entries.push(Entry::Broken(reason.to_string()));
        self
    }

    pub fn then_users(mut self, emails: &[&str]) -> Self {
        self.entries.extend(emails.iter().map(|e| Entry::User(user(e))));
        self
    }
}

fn broken(reason: &str) -> SourceError {
    SourceError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionReset, reason.to_string()))
}

#[async_trait::async_trait]
impl UserSource for StaticUserSource {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn stream(&self) -> Result<UserStream<'_>, SourceError> {
        if self.unavailable {
            return Err(broken("registry offline"));
        }

        let items = self.entries.iter().map(|entry| match entry {
            Entry::User(u) => Ok(u.clone()),
            Entry::Broken(reason) => Err(broken(reason)),
        });
        Ok(stream::iter(items).boxed())
    }
}

// ------------------------------------------------------------
// Fetcher fake
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum Step {
    Count(u64),
    Fail,
    Malformed,
    Hang,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub weekly: Step,
    pub daily: Step,
    pub profile: Option<Profile>,
    pub delay: Duration,
    pub panics: bool,
}

impl Script {
    pub fn steps(weekly: u64, daily: u64) -> Self {
        Self {
            weekly: Step::Count(weekly),
            daily: Step::Count(daily),
            profile: Some(Profile::default()),
            delay: Duration::ZERO,
            panics: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            weekly: Step::Fail,
            daily: Step::Fail,
            ..Self::steps(0, 0)
        }
    }
}

/// Fetcher answering from per-user scripts.
///
/// Users without a script fail every call. Tracks the number of
/// calls in flight so tests can check the concurrency bound.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: HashMap<String, Script>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub ranges: Mutex<Vec<(&'static str, TimeRange)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, email: &str, script: Script) -> Self {
        self.scripts.insert(email.to_string(), script);
        self
    }

    async fn run<T>(&self, user: &User, pick: impl FnOnce(&Script) -> Result<T, Step>) -> Result<T, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let outcome = match self.scripts.get(&user.email) {
            None => Err(Step::Fail),
            Some(script) => {
                if script.panics {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    panic!("scripted panic for {}", user.email);
                }
                if !script.delay.is_zero() {
                    tokio::time::sleep(script.delay).await;
                }
                pick(script)
            }
        };

        let result = match outcome {
            Ok(value) => Ok(value),
            Err(Step::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Err(Step::Malformed) => Err(FetchError::Malformed("no bucket array".into())),
            Err(_) => Err(FetchError::Transport(format!("connection refused for {}", user.email))),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn record(&self, kind: &'static str, range: TimeRange) {
        self.ranges.lock().unwrap().push((kind, range));
    }
}

fn count(step: Step) -> Result<u64, Step> {
    match step {
        Step::Count(n) => Ok(n),
        other => Err(other),
    }
}

#[async_trait::async_trait]
impl MetricFetcher for ScriptedFetcher {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn weekly_steps(&self, user: &User, range: TimeRange) -> Result<u64, FetchError> {
        self.record("week", range);
        self.run(user, |s| count(s.weekly)).await
    }

    async fn daily_steps(&self, user: &User, range: TimeRange) -> Result<u64, FetchError> {
        self.record("day", range);
        self.run(user, |s| count(s.daily)).await
    }

    async fn profile(&self, user: &User) -> Result<Profile, FetchError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.run(user, |s| s.profile.clone().ok_or(Step::Fail)).await
    }
}
