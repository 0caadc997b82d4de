//! Replay Engine
//!
//! Feeds a day of captured market data through the same queue and worker
//! path as the live socket. For each sub-provider of the configured feed,
//! the engine asks the vendor REST endpoint for a presigned capture-file
//! URL, downloads it, then K-way merges the per-file frame streams by
//! recorded wall-clock timestamp.
//!
//! Capture file format: repeated `[u64 LE wall-clock ns][frame]`, where the
//! frame is the live wire format (count byte + records). Record extents are
//! computed from the record headers, the same way the live decoder walks a
//! frame.
//!
//! With simulated delay the first timestamp anchors an offset and each
//! frame is held until wall-clock catches up; otherwise frames are emitted
//! as fast as the workers drain, with backpressure instead of drops.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::auth::CLIENT_INFORMATION;
use crate::codec::equities;
use crate::config::ReplayConfig;
use crate::connection::{ConnectionState, SharedState};
use crate::events::SubProvider;
use crate::provider::{Provider, ProviderProfile, WireVariant};
use crate::queue::{FrameQueue, QueueItem};
use crate::stats::Counters;

/// Errors raised by the replay engine.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// The replay REST endpoint or the presigned download failed.
    #[error("replay download failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The replay REST endpoint answered with an unexpected status.
    /// (404 is not an error; that sub-provider is skipped.)
    #[error("replay endpoint returned status {status} for {subsource}")]
    Endpoint {
        /// HTTP status.
        status: u16,
        /// Sub-provider source tag requested.
        subsource: String,
    },

    /// Local file I/O failed.
    #[error("replay file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// A capture file could not be walked as frames.
    #[error("corrupt capture file {path}: {detail}")]
    Corrupt {
        /// Offending file.
        path: PathBuf,
        /// What went wrong.
        detail: String,
    },
}

/// Response body of the replay REST endpoint.
#[derive(Debug, serde::Deserialize)]
struct ReplayFileResponse {
    name: String,
    url: String,
}

/// Sub-providers whose capture files make up a day of the given feed.
fn subproviders_for(provider: Provider) -> Vec<SubProvider> {
    match provider {
        Provider::Realtime | Provider::Iex => vec![SubProvider::Iex],
        Provider::DelayedSip => vec![
            SubProvider::Utp,
            SubProvider::CtaA,
            SubProvider::CtaB,
            SubProvider::Otc,
        ],
        Provider::NasdaqBasic => vec![SubProvider::NasdaqBasic],
        Provider::CboeOne => vec![SubProvider::CboeOne],
        // Options captures are a single file set.
        Provider::Opra | Provider::Manual => vec![SubProvider::NoSubProvider],
    }
}

/// Source tag the REST endpoint expects for a sub-provider.
fn subsource_tag(provider: Provider, subprovider: SubProvider) -> &'static str {
    if provider.is_options() {
        return "opra";
    }
    match subprovider {
        SubProvider::Utp => "utp_delayed",
        SubProvider::CtaA => "cta_a_delayed",
        SubProvider::CtaB => "cta_b_delayed",
        SubProvider::Otc => "otc_delayed",
        SubProvider::NasdaqBasic => "nasdaq_basic",
        SubProvider::CboeOne => "cboe_one",
        _ => "iex",
    }
}

/// Replays one day of capture files into the event queue.
pub(crate) struct ReplayEngine {
    profile: ProviderProfile,
    replay: ReplayConfig,
    api_key: String,
    http: reqwest::Client,
    queue: FrameQueue,
    counters: Arc<Counters>,
    state: SharedState,
    cancel: CancellationToken,
}

impl ReplayEngine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        profile: ProviderProfile,
        replay: ReplayConfig,
        api_key: String,
        queue: FrameQueue,
        counters: Arc<Counters>,
        state: SharedState,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            profile,
            replay,
            api_key,
            http: reqwest::Client::new(),
            queue,
            counters,
            state,
            cancel,
        }
    }

    /// Download, merge, and emit; then mark end-of-stream and stop.
    pub(crate) async fn run(self) -> Result<(), ReplayError> {
        let downloaded = self.replay.local_files.is_empty();
        let paths = if downloaded {
            self.state.set(ConnectionState::Authenticating);
            self.fetch_files().await?
        } else {
            self.replay.local_files.clone()
        };

        self.state.set(ConnectionState::Ready);
        let emitted = self.replay_files(&paths).await?;
        tracing::info!(files = paths.len(), frames = emitted, "replay finished");

        let _ = self.queue.push_blocking(QueueItem::EndOfStream).await;

        if self.replay.delete_file_when_done {
            for path in &paths {
                if let Err(error) = tokio::fs::remove_file(path).await {
                    tracing::warn!(path = %path.display(), error = %error, "could not delete capture file");
                } else {
                    tracing::info!(path = %path.display(), "deleted capture file");
                }
            }
        }

        self.state.set(ConnectionState::Stopped);
        Ok(())
    }

    /// Resolve and download one capture file per applicable sub-provider.
    /// A 404 means no capture exists for that sub-provider on that date and
    /// is skipped; any other failure is fatal.
    async fn fetch_files(&self) -> Result<Vec<PathBuf>, ReplayError> {
        let mut paths = Vec::new();

        for subprovider in subproviders_for(self.profile.provider()) {
            let subsource = subsource_tag(self.profile.provider(), subprovider);
            let url = self
                .replay
                .url_template
                .replace("{subsource}", subsource)
                .replace("{date}", &self.replay.date.format("%Y-%m-%d").to_string())
                .replace("{api_key}", &self.api_key);

            let response = self
                .http
                .get(&url)
                .header("Client-Information", CLIENT_INFORMATION)
                .send()
                .await?;

            let status = response.status();
            if status.as_u16() == 404 {
                tracing::info!(subsource, "no capture file for this date; skipping");
                continue;
            }
            if !status.is_success() {
                return Err(ReplayError::Endpoint {
                    status: status.as_u16(),
                    subsource: subsource.to_string(),
                });
            }

            let file: ReplayFileResponse = response.json().await?;
            let path = std::env::temp_dir().join(&file.name);
            tracing::info!(subsource, path = %path.display(), "downloading capture file");
            self.download(&file.url, &path).await?;
            paths.push(path);
        }

        Ok(paths)
    }

    async fn download(&self, url: &str, path: &Path) -> Result<(), ReplayError> {
        let mut response = self.http.get(url).send().await?.error_for_status()?;
        let mut file = File::create(path).await?;
        while let Some(chunk) = response.chunk().await? {
            tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await?;
        }
        tokio::io::AsyncWriteExt::flush(&mut file).await?;
        Ok(())
    }

    /// Merge the per-file streams by timestamp and emit every frame.
    async fn replay_files(&self, paths: &[PathBuf]) -> Result<u64, ReplayError> {
        let variant = self.profile.wire_variant();
        let mut readers = Vec::with_capacity(paths.len());
        for path in paths {
            match CaptureReader::open(path, variant).await {
                Ok(reader) => readers.push(reader),
                Err(ReplayError::Io(error)) if error.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!(path = %path.display(), "capture file missing; skipping");
                }
                Err(error) => return Err(error),
            }
        }

        // Prime one pending frame per file, then repeatedly emit the
        // earliest. File counts are small, so a linear scan beats a heap.
        let mut heads: Vec<Option<(u64, Bytes)>> = Vec::with_capacity(readers.len());
        for reader in &mut readers {
            heads.push(reader.next_frame().await?);
        }

        let mut pacer: Option<Pacer> = None;
        let mut emitted = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(emitted);
            }

            let Some(index) = earliest(&heads) else {
                return Ok(emitted);
            };
            let Some((timestamp, frame)) = heads[index].take() else {
                continue;
            };
            heads[index] = readers[index].next_frame().await?;

            if self.replay.with_simulated_delay {
                let pacer = pacer.get_or_insert_with(|| Pacer::anchor(timestamp));
                tokio::select! {
                    () = self.cancel.cancelled() => return Ok(emitted),
                    () = pacer.wait_until(timestamp) => {}
                }
            }

            self.counters.data_messages.fetch_add(1, Ordering::Relaxed);
            if !self.queue.push_blocking(QueueItem::Frame(frame)).await {
                // Queue closed under us; the client is stopping.
                return Ok(emitted);
            }
            emitted += 1;
        }
    }
}

/// Index of the head with the smallest timestamp.
fn earliest(heads: &[Option<(u64, Bytes)>]) -> Option<usize> {
    let mut best: Option<(usize, u64)> = None;
    for (index, head) in heads.iter().enumerate() {
        if let Some((timestamp, _)) = head {
            let better = best.is_none_or(|(_, t)| *timestamp < t);
            if better {
                best = Some((index, *timestamp));
            }
        }
    }
    best.map(|(index, _)| index)
}

/// Maps recorded wall-clock nanoseconds onto the local clock, anchored at
/// the first frame.
struct Pacer {
    start: tokio::time::Instant,
    first_timestamp: u64,
}

impl Pacer {
    fn anchor(first_timestamp: u64) -> Self {
        Self {
            start: tokio::time::Instant::now(),
            first_timestamp,
        }
    }

    async fn wait_until(&self, timestamp: u64) {
        let offset_ns = timestamp.saturating_sub(self.first_timestamp);
        let target = self.start + Duration::from_nanos(offset_ns);
        tokio::time::sleep_until(target).await;
    }
}

/// Incremental frame reader over one capture file.
struct CaptureReader {
    path: PathBuf,
    reader: BufReader<File>,
    variant: WireVariant,
}

impl CaptureReader {
    async fn open(path: &Path, variant: WireVariant) -> Result<Self, ReplayError> {
        let file = File::open(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            variant,
        })
    }

    /// Read `[u64 timestamp][frame]`; `None` at clean end of file.
    async fn next_frame(&mut self) -> Result<Option<(u64, Bytes)>, ReplayError> {
        let mut timestamp_bytes = [0u8; 8];
        if !self.read_exact_or_eof(&mut timestamp_bytes).await? {
            return Ok(None);
        }
        let timestamp = u64::from_le_bytes(timestamp_bytes);

        let mut count = [0u8; 1];
        self.read_fully(&mut count).await?;
        let count = count[0];

        let mut frame = Vec::with_capacity(64);
        frame.push(count);

        for _ in 0..count {
            let mut header = [0u8; 2];
            self.read_fully(&mut header).await?;

            let record_len = match self.variant {
                WireVariant::Options => {
                    let declared = header[1] as usize;
                    if declared < 2 {
                        return Err(self.corrupt(format!(
                            "options record declared length {declared}"
                        )));
                    }
                    declared
                }
                WireVariant::Equities => equities::record_len(header[0], header[1])
                    .ok_or_else(|| {
                        self.corrupt(format!("unknown equities record type {}", header[0]))
                    })?,
            };

            let mut body = vec![0u8; record_len - 2];
            self.read_fully(&mut body).await?;
            frame.extend_from_slice(&header);
            frame.extend_from_slice(&body);
        }

        Ok(Some((timestamp, Bytes::from(frame))))
    }

    /// Fill `buf`; `Ok(false)` only on EOF before the first byte.
    async fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<bool, ReplayError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(self.corrupt("file ends mid-record".to_string()));
            }
            filled += n;
        }
        Ok(true)
    }

    async fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), ReplayError> {
        if self.read_exact_or_eof(buf).await? {
            Ok(())
        } else {
            Err(self.corrupt("file ends mid-record".to_string()))
        }
    }

    fn corrupt(&self, detail: String) -> ReplayError {
        ReplayError::Corrupt {
            path: self.path.clone(),
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subprovider_sets_per_provider() {
        assert_eq!(subproviders_for(Provider::Realtime), vec![SubProvider::Iex]);
        assert_eq!(
            subproviders_for(Provider::DelayedSip),
            vec![
                SubProvider::Utp,
                SubProvider::CtaA,
                SubProvider::CtaB,
                SubProvider::Otc
            ]
        );
        assert_eq!(
            subproviders_for(Provider::NasdaqBasic),
            vec![SubProvider::NasdaqBasic]
        );
        assert_eq!(subproviders_for(Provider::Opra).len(), 1);
    }

    #[test]
    fn subsource_tags() {
        assert_eq!(subsource_tag(Provider::Realtime, SubProvider::Iex), "iex");
        assert_eq!(
            subsource_tag(Provider::DelayedSip, SubProvider::CtaA),
            "cta_a_delayed"
        );
        assert_eq!(
            subsource_tag(Provider::NasdaqBasic, SubProvider::NasdaqBasic),
            "nasdaq_basic"
        );
        assert_eq!(
            subsource_tag(Provider::Opra, SubProvider::NoSubProvider),
            "opra"
        );
    }

    #[test]
    fn earliest_picks_minimum_timestamp() {
        let heads = vec![
            Some((30u64, Bytes::new())),
            Some((10u64, Bytes::new())),
            None,
            Some((20u64, Bytes::new())),
        ];
        assert_eq!(earliest(&heads), Some(1));

        let empty: Vec<Option<(u64, Bytes)>> = vec![None, None];
        assert_eq!(earliest(&empty), None);
    }

    #[tokio::test]
    async fn capture_reader_walks_options_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.bin");

        // Two frames: one with a single 47-byte quote record, one empty.
        let mut record = vec![2u8, 47];
        record.extend_from_slice(b"AAPL__230616C00180000");
        record.extend_from_slice(&[0u8; 24]);
        let mut data = Vec::new();
        data.extend_from_slice(&100u64.to_le_bytes());
        data.push(1);
        data.extend_from_slice(&record);
        data.extend_from_slice(&200u64.to_le_bytes());
        data.push(0);
        std::fs::write(&path, &data).unwrap();

        let mut reader = CaptureReader::open(&path, WireVariant::Options)
            .await
            .unwrap();

        let (ts1, frame1) = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(ts1, 100);
        assert_eq!(frame1.len(), 1 + 47);
        assert_eq!(frame1[0], 1);

        let (ts2, frame2) = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(ts2, 200);
        assert_eq!(frame2.as_ref(), &[0]);

        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn capture_reader_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truncated.bin");

        let mut data = Vec::new();
        data.extend_from_slice(&100u64.to_le_bytes());
        data.push(1);
        data.extend_from_slice(&[2u8, 47]);
        data.extend_from_slice(&[0u8; 10]); // record cut short
        std::fs::write(&path, &data).unwrap();

        let mut reader = CaptureReader::open(&path, WireVariant::Options)
            .await
            .unwrap();
        assert!(matches!(
            reader.next_frame().await,
            Err(ReplayError::Corrupt { .. })
        ));
    }
}
