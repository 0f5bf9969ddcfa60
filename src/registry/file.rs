use std::path::PathBuf;

use futures_util::StreamExt;
use futures_util::stream;
use log::warn;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::SourceError;

use super::source::{UserSource, UserStream, decode_user};

/// JSON Lines registry: one user object per line.
///
/// The file is read lazily, line by line, as the aggregator pulls
/// from the stream. A line that is not UTF-8 is skipped like any
/// other undecodable record; an I/O error ends the stream after
/// being reported once.
pub struct FileUserSource {
    path: PathBuf,
}

impl FileUserSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl UserSource for FileUserSource {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn stream(&self) -> Result<UserStream<'_>, SourceError> {
        let file = File::open(&self.path).await?;
        let lines = BufReader::new(file).split(b'\n');
        let origin = self.path.display().to_string();

        let users = stream::unfold(Some((lines, 0usize)), move |state| {
            let origin = origin.clone();
            async move {
                let (mut lines, mut line_no) = state?;
                loop {
                    match lines.next_segment().await {
                        Ok(Some(raw)) => {
                            line_no += 1;
                            let Ok(line) = std::str::from_utf8(&raw) else {
                                warn!("[{}] skipping line {}: not valid UTF-8", origin, line_no);
                                continue;
                            };
                            if let Some(user) = decode_user(line, &origin) {
                                return Some((Ok(user), Some((lines, line_no))));
                            }
                        }
                        Ok(None) => return None,
                        Err(e) => return Some((Err(SourceError::Io(e)), None)),
                    }
                }
            }
        });

        Ok(users.boxed())
    }
}
