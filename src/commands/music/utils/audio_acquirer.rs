//! Turns a track URL into playable audio by walking an ordered list of
//! extraction strategies until one succeeds.
//!
//! YouTube videos try, in order: the `yt-dlp` subprocess, the direct stream
//! resolver, and the innertube resolver. Every other URL only gets the direct
//! stream resolver.

use reqwest::header::HeaderMap;
use serenity::async_trait;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::extractor_process::{ExtractionTicket, PipedAudio};
use super::music_manager::{MusicError, MusicResult};
use super::stream_resolvers::{AudioQuality, DirectStreamResolver, InnertubeResolver};
use super::ytdlp_binary::YtDlpBinary;
use crate::commands::music::audio_sources::youtube::video_id;

const FIRST_CHUNK_SIZE: usize = 16 * 1024;
const RESOLVER_TIMEOUT: Duration = Duration::from_secs(15);

/// Audio ready to hand to the voice transport.
pub enum AcquiredAudio {
    /// Bytes streamed from a local extractor process.
    Piped(PipedAudio),
    /// A media URL the transport fetches itself.
    Remote {
        url: String,
        headers: HeaderMap,
        source: &'static str,
    },
}

impl AcquiredAudio {
    pub fn remote(url: impl Into<String>, source: &'static str) -> Self {
        AcquiredAudio::Remote {
            url: url.into(),
            headers: HeaderMap::new(),
            source,
        }
    }
}

impl fmt::Debug for AcquiredAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquiredAudio::Piped(_) => f.write_str("Piped"),
            AcquiredAudio::Remote { url, source, .. } => f
                .debug_struct("Remote")
                .field("url", url)
                .field("source", source)
                .finish(),
        }
    }
}

/// One strategy that did not produce audio, kept for the final report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    pub strategy: &'static str,
    pub reason: String,
}

impl fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

/// How a URL is routed through the strategy list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlKind {
    YoutubeVideo(String),
    Other,
}

impl UrlKind {
    pub fn classify(url: &str) -> Self {
        match video_id(url) {
            Some(id) => UrlKind::YoutubeVideo(id),
            None => UrlKind::Other,
        }
    }
}

/// A single way of obtaining audio for a URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Strategies that spawn a process must park it with `ticket`.
    async fn extract(&self, url: &str, ticket: &ExtractionTicket) -> MusicResult<AcquiredAudio>;
}

/// Tries `strategies` in order and returns the first audio produced.
///
/// Stops early with `ExtractionCancelled` when the ticket is superseded.
pub async fn run_fallback(
    strategies: &[Arc<dyn ExtractionStrategy>],
    url: &str,
    ticket: &ExtractionTicket,
) -> MusicResult<AcquiredAudio> {
    let mut attempts = Vec::new();

    for strategy in strategies {
        if !ticket.is_current() {
            return Err(MusicError::ExtractionCancelled);
        }

        debug!("Trying {} for {}", strategy.name(), url);
        match strategy.extract(url, ticket).await {
            Ok(audio) => {
                info!(
                    "{} produced audio for {} after {} failed attempt(s)",
                    strategy.name(),
                    url,
                    attempts.len()
                );
                return Ok(audio);
            }
            Err(MusicError::ExtractionCancelled) => return Err(MusicError::ExtractionCancelled),
            Err(e) => {
                let reason = match e {
                    MusicError::ExtractionFailure { reason, .. } => reason,
                    other => other.to_string(),
                };
                warn!("{} failed for {}: {}", strategy.name(), url, reason);
                attempts.push(FailedAttempt {
                    strategy: strategy.name(),
                    reason,
                });
            }
        }
    }

    Err(MusicError::TotalExtractionFailure { attempts })
}

/// Knobs for the default strategy lists.
#[derive(Debug, Clone)]
pub struct AcquirerSettings {
    pub prefer_transcode: bool,
    pub quality: AudioQuality,
    pub invidious_instances: Vec<String>,
    pub innertube_endpoint: String,
    pub first_chunk_timeout: Duration,
}

/// Routes URLs to their strategy list and runs the fallback chain.
pub struct AudioAcquirer {
    youtube: Vec<Arc<dyn ExtractionStrategy>>,
    other: Vec<Arc<dyn ExtractionStrategy>>,
}

impl AudioAcquirer {
    pub fn new(settings: AcquirerSettings, binary: Arc<YtDlpBinary>) -> MusicResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(RESOLVER_TIMEOUT)
            .build()
            .map_err(|e| MusicError::ConfigError(e.to_string()))?;

        let process: Arc<dyn ExtractionStrategy> = Arc::new(ProcessExtractor::new(
            binary,
            settings.prefer_transcode,
            settings.first_chunk_timeout,
        ));
        let direct: Arc<dyn ExtractionStrategy> = Arc::new(DirectStreamResolver::new(
            http.clone(),
            settings.invidious_instances,
            settings.quality,
        ));
        let innertube: Arc<dyn ExtractionStrategy> =
            Arc::new(InnertubeResolver::new(http, settings.innertube_endpoint));

        Ok(Self::with_strategies(
            vec![process, direct.clone(), innertube],
            vec![direct],
        ))
    }

    pub fn with_strategies(
        youtube: Vec<Arc<dyn ExtractionStrategy>>,
        other: Vec<Arc<dyn ExtractionStrategy>>,
    ) -> Self {
        Self { youtube, other }
    }

    pub fn strategies_for(&self, kind: &UrlKind) -> &[Arc<dyn ExtractionStrategy>] {
        match kind {
            UrlKind::YoutubeVideo(_) => &self.youtube,
            UrlKind::Other => &self.other,
        }
    }

    pub async fn acquire(&self, url: &str, ticket: &ExtractionTicket) -> MusicResult<AcquiredAudio> {
        let kind = UrlKind::classify(url);
        debug!("Acquiring {} as {:?}", url, kind);
        run_fallback(self.strategies_for(&kind), url, ticket).await
    }
}

/// Builds the extractor command line.
pub fn extractor_args(url: &str, transcode: bool) -> Vec<String> {
    let mut args: Vec<String> = vec!["-o".into(), "-".into(), "-f".into()];
    if transcode {
        args.extend([
            "bestaudio/best".into(),
            "--downloader".into(),
            "ffmpeg".into(),
            "--downloader-args".into(),
            "ffmpeg_o:-vn -c:a libopus -b:a 128k -f ogg".into(),
        ]);
    } else {
        args.push("bestaudio[ext=webm]/bestaudio".into());
    }
    args.extend([
        "--no-playlist".into(),
        "--quiet".into(),
        "--no-warnings".into(),
        url.into(),
    ]);
    args
}

/// Runs `yt-dlp` and streams its stdout.
pub struct ProcessExtractor {
    binary: Arc<YtDlpBinary>,
    prefer_transcode: bool,
    first_chunk_timeout: Duration,
}

impl ProcessExtractor {
    pub const NAME: &'static str = "yt-dlp";

    pub fn new(binary: Arc<YtDlpBinary>, prefer_transcode: bool, first_chunk_timeout: Duration) -> Self {
        Self {
            binary,
            prefer_transcode,
            first_chunk_timeout,
        }
    }

    fn fail(reason: impl Into<String>) -> MusicError {
        MusicError::ExtractionFailure {
            strategy: Self::NAME,
            reason: reason.into(),
        }
    }

    async fn spawn_and_wait(
        &self,
        program: &Path,
        url: &str,
        ticket: &ExtractionTicket,
    ) -> MusicResult<AcquiredAudio> {
        let transcode = self.prefer_transcode && self.binary.find_tool("ffmpeg").is_some();
        let mut child = Command::new(program)
            .args(extractor_args(url, transcode))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::fail(format!("could not start {}: {}", program.display(), e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Self::fail("stdout was not captured"))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("yt-dlp: {}", line);
                }
            });
        }

        ticket.install(Box::new(child))?;

        let mut first_chunk = vec![0u8; FIRST_CHUNK_SIZE];
        let read = match timeout(self.first_chunk_timeout, stdout.read(&mut first_chunk)).await {
            Err(_) => {
                ticket.release();
                return Err(Self::fail(format!(
                    "no output within {:?}",
                    self.first_chunk_timeout
                )));
            }
            Ok(Err(e)) => {
                ticket.release();
                return Err(Self::fail(format!("reading output failed: {}", e)));
            }
            Ok(Ok(0)) => {
                ticket.release();
                return Err(Self::fail("exited before producing audio"));
            }
            Ok(Ok(n)) => n,
        };
        first_chunk.truncate(read);

        let extension = if transcode { "ogg" } else { "webm" };
        Ok(AcquiredAudio::Piped(PipedAudio::spawn(first_chunk, stdout, extension)))
    }
}

#[async_trait]
impl ExtractionStrategy for ProcessExtractor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn extract(&self, url: &str, ticket: &ExtractionTicket) -> MusicResult<AcquiredAudio> {
        let program = self
            .binary
            .locate()
            .await
            .map_err(|e| Self::fail(e.to_string()))?;
        self.spawn_and_wait(&program, url, ticket).await
    }
}
