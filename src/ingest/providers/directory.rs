//! Drop-folder connector: every `*.json` file in a directory is one article
//! (`{title, content, source?, url?, tickers?, published_at?}`) or an array of
//! them. Files are re-read only when their modification time changes; the
//! store's content hash makes re-reads harmless anyway.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::ingest::types::SourceProvider;
use crate::store::RawDocument;

#[derive(Deserialize)]
#[serde(untagged)]
enum ArticleFile {
    Many(Vec<RawDocument>),
    One(RawDocument),
}

pub struct DirectoryProvider {
    dir: PathBuf,
    seen: Mutex<HashMap<PathBuf, SystemTime>>,
}

impl DirectoryProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn parse_str(s: &str) -> Result<Vec<RawDocument>> {
        let parsed: ArticleFile = serde_json::from_str(s).context("parsing article json")?;
        Ok(match parsed {
            ArticleFile::Many(v) => v,
            ArticleFile::One(d) => vec![d],
        })
    }

    /// Files that are new or changed since the last call, sorted by path.
    async fn changed_files(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        let mut rd = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("reading article dir {}", self.dir.display()))?;
        let mut out = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let modified = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let known = self.seen.lock().get(&path).copied();
            if known != Some(modified) {
                out.push((path, modified));
            }
        }
        out.sort();
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for DirectoryProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawDocument>> {
        let mut docs = Vec::new();
        for (path, modified) in self.changed_files().await? {
            let parsed = match tokio::fs::read_to_string(&path).await {
                Ok(s) => Self::parse_str(&s),
                Err(e) => Err(e.into()),
            };
            match parsed {
                Ok(mut v) => {
                    for d in v.iter_mut() {
                        if d.source.is_none() {
                            d.source = Some("directory".to_string());
                        }
                    }
                    docs.append(&mut v);
                }
                Err(e) => {
                    counter!("ingest_provider_errors_total", "provider" => "directory").increment(1);
                    tracing::warn!(target: "ingest", file = %path.display(), error = %e, "skipping unreadable article file");
                }
            }
            self.seen.lock().insert(path, modified);
        }
        Ok(docs)
    }

    fn name(&self) -> &'static str {
        "directory"
    }
}
