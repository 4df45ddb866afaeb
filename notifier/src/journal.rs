//! Durable local record of emitted signals.
//!
//! `signals.log` holds one JSON line per signal. `latest_signal.json` holds
//! only the most recent one and is replaced by rename, so readers never see
//! a partial file.

use crate::error::DeliveryError;
use common::Signal;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const LOG_FILE: &str = "signals.log";
pub const LATEST_FILE: &str = "latest_signal.json";

#[derive(Debug, Clone)]
pub struct SignalJournal {
    dir: PathBuf,
}

impl SignalJournal {
    /// Creates `dir` if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, DeliveryError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILE)
    }

    /// Append one record and replace the latest snapshot.
    ///
    /// The append is a single `write_all` on an append-mode handle, done on
    /// the blocking pool so an abandoned caller cannot cut it short. A failed
    /// append is `Journal`; once the line is on disk, a failed snapshot
    /// update is `LatestSnapshot`.
    pub async fn record(&self, signal: &Signal) -> Result<(), DeliveryError> {
        let mut line = serde_json::to_string(signal).map_err(io::Error::from)?;
        let latest = serde_json::to_string_pretty(signal).map_err(io::Error::from)?;
        line.push('\n');

        let log_path = self.log_path();
        let latest_path = self.latest_path();
        let tmp_path = self.dir.join(format!("{LATEST_FILE}.{}.tmp", signal.id()));

        tokio::task::spawn_blocking(move || -> Result<(), DeliveryError> {
            append(&log_path, line.as_bytes())?;
            replace(&tmp_path, &latest_path, latest.as_bytes()).map_err(DeliveryError::LatestSnapshot)
        })
        .await
        .map_err(io::Error::other)??;

        debug!(id = %signal.id(), symbol = signal.symbol(), "signal journaled");
        Ok(())
    }

    /// All records in append order
    pub async fn read_all(&self) -> Result<Vec<Signal>, DeliveryError> {
        let path = self.log_path();
        let signals = tokio::task::spawn_blocking(move || read_log(&path))
            .await
            .map_err(io::Error::other)??;
        Ok(signals)
    }

    pub async fn latest(&self) -> Result<Option<Signal>, DeliveryError> {
        match tokio::fs::read(self.latest_path()).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(io::Error::from)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn append(path: &Path, line: &[u8]) -> io::Result<()> {
    let mut log = OpenOptions::new().create(true).append(true).open(path)?;
    log.write_all(line)?;
    log.sync_data()
}

/// Write `tmp`, flush it to disk, then rename it over `target`
fn replace(tmp: &Path, target: &Path, contents: &[u8]) -> io::Result<()> {
    let written = fs::File::create(tmp).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    let result = written.and_then(|()| fs::rename(tmp, target));
    if result.is_err() {
        let _ = fs::remove_file(tmp);
    }
    result
}

fn read_log(path: &Path) -> io::Result<Vec<Signal>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut signals = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        signals.push(serde_json::from_str(&line)?);
    }
    Ok(signals)
}
