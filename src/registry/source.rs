use futures_util::stream::BoxStream;
use log::warn;

use crate::error::SourceError;
use crate::schema::User;

/// Lazy, single-pass sequence of registered users.
///
/// An `Err` item means enumeration broke down; consumers must not
/// keep pulling after one.
pub type UserStream<'a> = BoxStream<'a, Result<User, SourceError>>;

/// UserSource is the boundary between the aggregation core and
/// the persistent user registry.
///
/// Each implementation must:
/// - Yield every registered user at most once per stream
/// - Yield users in any order
/// - Never write to the registry
///
/// THREAD SAFETY:
/// - Must be Send + Sync
/// - One instance is shared by every aggregation pass
///
#[async_trait::async_trait]
pub trait UserSource: Send + Sync {
    /// Backend identifier used in logs.
    fn name(&self) -> &'static str;

    /// Opens a fresh stream over the registry.
    ///
    /// A failure here, or an `Err` item later on, makes the whole
    /// aggregation pass fail with `SourceUnavailable`.
    async fn stream(&self) -> Result<UserStream<'_>, SourceError>;
}

/// Decodes one stored record.
///
/// Blank records are ignored silently; undecodable ones are logged
/// and skipped so that one corrupt entry does not hide every other
/// user.
pub(crate) fn decode_user(raw: &str, origin: &str) -> Option<User> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match serde_json::from_str::<User>(raw) {
        Ok(user) => Some(user),
        Err(e) => {
            warn!("[{}] skipping undecodable user record: {}", origin, e);
            None
        }
    }
}
