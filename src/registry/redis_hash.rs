use std::collections::VecDeque;

use futures_util::StreamExt;
use futures_util::stream;
use log::debug;
use redis::aio::MultiplexedConnection;

use crate::error::SourceError;

use super::source::{UserSource, UserStream, decode_user};

const SCAN_PAGE: usize = 200;

/// Redis registry: a hash whose fields are emails and whose values
/// are JSON-encoded users.
///
/// The hash is walked with `HSCAN`, one page at a time, as the
/// aggregator pulls from the stream. Connection and command
/// failures surface as `SourceError::Redis`; a failure after the
/// first page ends the stream.
pub struct RedisUserSource {
    client: redis::Client,
    key: String,
}

impl RedisUserSource {
    pub fn new(url: &str, key: impl Into<String>) -> Result<Self, SourceError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            key: key.into(),
        })
    }
}

struct Scan {
    con: MultiplexedConnection,
    // `None` once the server has returned cursor 0
    cursor: Option<u64>,
    pending: VecDeque<String>,
}

#[async_trait::async_trait]
impl UserSource for RedisUserSource {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn stream(&self) -> Result<UserStream<'_>, SourceError> {
        let con = self.client.get_multiplexed_async_connection().await?;
        let key = self.key.as_str();
        let origin = format!("redis:{}", key);

        let scan = Scan {
            con,
            cursor: Some(0),
            pending: VecDeque::new(),
        };

        let users = stream::unfold(Some(scan), move |state| {
            let origin = origin.clone();
            async move {
                let mut scan = state?;
                loop {
                    if let Some(raw) = scan.pending.pop_front() {
                        if let Some(user) = decode_user(&raw, &origin) {
                            return Some((Ok(user), Some(scan)));
                        }
                        continue;
                    }

                    let cursor = scan.cursor?;
                    let page: Result<(u64, Vec<String>), _> = redis::cmd("HSCAN")
                        .arg(key)
                        .arg(cursor)
                        .arg("COUNT")
                        .arg(SCAN_PAGE)
                        .query_async(&mut scan.con)
                        .await;

                    match page {
                        Ok((next, flat)) => {
                            let values = hscan_values(flat);
                            debug!("[redis] {} records from {} at cursor {}", values.len(), key, cursor);
                            scan.pending.extend(values);
                            scan.cursor = (next != 0).then_some(next);
                        }
                        Err(e) => return Some((Err(SourceError::Redis(e)), None)),
                    }
                }
            }
        });

        Ok(users.boxed())
    }
}

/// `HSCAN` replies with fields and values interleaved; keeps the values.
fn hscan_values(flat: Vec<String>) -> Vec<String> {
    flat.into_iter().skip(1).step_by(2).collect()
}
