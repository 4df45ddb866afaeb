//! JSON-lines replay feed: one candle or news item per line.

use anyhow::{Context, Result};
use common::Candle;
use research_agents::NewsArticle;
use serde::Deserialize;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FeedEvent {
    Candle(Candle),
    News(NewsArticle),
}

pub struct FeedReader {
    lines: Lines<BufReader<File>>,
    line_no: usize,
    malformed: usize,
}

impl FeedReader {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .await
            .with_context(|| format!("failed to open feed {}", path.display()))?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
            malformed: 0,
        })
    }

    /// Next well-formed event. Malformed lines are logged and skipped;
    /// `Ok(None)` means the feed is exhausted.
    pub async fn next_event(&mut self) -> Result<Option<FeedEvent>> {
        while let Some(line) = self.lines.next_line().await.context("failed to read feed")? {
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<FeedEvent>(&line) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => {
                    self.malformed += 1;
                    warn!(line = self.line_no, "skipping malformed feed line: {}", e);
                }
            }
        }
        Ok(None)
    }

    pub fn malformed(&self) -> usize {
        self.malformed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_reads_candles_and_news() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"kind":"candle","symbol":"SOLUSDT","timestamp":"2024-03-01T12:00:00Z","open":100.0,"high":101.0,"low":99.0,"close":100.5,"volume":1500.0}}"#
        )
        .unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"kind":"news","title":"SOL rally","symbols":["SOL"],"published_at":"2024-03-01T12:01:00Z"}}"#
        )
        .unwrap();

        let mut feed = FeedReader::open(file.path()).await.unwrap();
        match feed.next_event().await.unwrap() {
            Some(FeedEvent::Candle(c)) => {
                assert_eq!(c.symbol, "SOLUSDT");
                assert_eq!(c.close, 100.5);
            }
            other => panic!("expected candle, got {other:?}"),
        }
        assert!(matches!(feed.next_event().await.unwrap(), Some(FeedEvent::News(_))));
        assert!(feed.next_event().await.unwrap().is_none());
        assert_eq!(feed.malformed(), 1);
    }

    #[tokio::test]
    async fn test_missing_feed_is_an_error() {
        assert!(FeedReader::open(Path::new("/nonexistent/feed.jsonl")).await.is_err());
    }
}
