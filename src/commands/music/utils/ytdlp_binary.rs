//! Locates a usable `yt-dlp` executable: the search path first, then a cached
//! copy younger than a week, then a fresh download of the latest release.

use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::music_manager::{MusicError, MusicResult};

pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp";

/// Cached copies older than this are downloaded again.
pub const CACHE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const MAX_REDIRECTS: usize = 6;
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

#[cfg(windows)]
pub const BINARY_NAME: &str = "yt-dlp.exe";
#[cfg(not(windows))]
pub const BINARY_NAME: &str = "yt-dlp";

/// Default per-user cache location, e.g. `~/.cache/discord-music-bot`.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("discord-music-bot")
}

pub struct YtDlpBinary {
    cache_dir: PathBuf,
    download_url: String,
    max_age: Duration,
    search_path: Option<OsString>,
    http: reqwest::Client,
    install_lock: Mutex<()>,
}

impl YtDlpBinary {
    pub fn new(cache_dir: impl Into<PathBuf>, download_url: impl Into<String>) -> MusicResult<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| MusicError::ExtractorUnavailable(e.to_string()))?;

        Ok(Self {
            cache_dir: cache_dir.into(),
            download_url: download_url.into(),
            max_age: CACHE_MAX_AGE,
            search_path: None,
            http,
            install_lock: Mutex::new(()),
        })
    }

    /// Searches `path` instead of the process `PATH`.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn cached_path(&self) -> PathBuf {
        self.cache_dir.join(BINARY_NAME)
    }

    /// Finds another executable (e.g. a transcoder) on the same search path.
    pub fn find_tool(&self, name: &str) -> Option<PathBuf> {
        find_on_path(name, self.search_path.as_deref())
    }

    /// Returns a path to an executable extractor, downloading one if needed.
    pub async fn locate(&self) -> MusicResult<PathBuf> {
        if let Some(path) = self.find_tool(BINARY_NAME) {
            debug!("Using {} from the search path", path.display());
            return Ok(path);
        }

        // One download at a time; later callers see the fresh cache.
        let _guard = self.install_lock.lock().await;

        let cached = self.cached_path();
        if is_fresh(&cached, self.max_age).await {
            debug!("Using cached extractor at {}", cached.display());
            return Ok(cached);
        }

        self.download(&cached).await?;
        Ok(cached)
    }

    async fn download(&self, destination: &Path) -> MusicResult<()> {
        info!("Downloading yt-dlp from {}", self.download_url);

        let response = self
            .http
            .get(&self.download_url)
            .send()
            .await
            .map_err(|e| MusicError::ExtractorUnavailable(format!("download failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(MusicError::ExtractorUnavailable(format!(
                "download failed with status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MusicError::ExtractorUnavailable(format!("download interrupted: {}", e)))?;

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(io_error)?;

        let partial = destination.with_extension("part");
        tokio::fs::write(&partial, &bytes).await.map_err(io_error)?;
        make_executable(&partial).await?;
        tokio::fs::rename(&partial, destination)
            .await
            .map_err(io_error)?;

        info!(
            "Installed yt-dlp ({} bytes) at {}",
            bytes.len(),
            destination.display()
        );
        Ok(())
    }
}

fn io_error(e: std::io::Error) -> MusicError {
    MusicError::ExtractorUnavailable(e.to_string())
}

async fn is_fresh(path: &Path, max_age: Duration) -> bool {
    let modified = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => return false,
    };

    match SystemTime::now().duration_since(modified) {
        Ok(age) => age < max_age,
        // Modified in the future: treat as fresh rather than thrash.
        Err(_) => true,
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> MusicResult<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(io_error)
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> MusicResult<()> {
    Ok(())
}

/// Looks for `name` in each directory of `search_path` (or `PATH`).
pub fn find_on_path(name: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    let paths = match search_path {
        Some(paths) => paths.to_os_string(),
        None => env::var_os("PATH")?,
    };

    env::split_paths(&paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Logs whether an extractor is reachable without downloading anything.
pub fn report_availability(binary: &YtDlpBinary) {
    match binary.find_tool(BINARY_NAME) {
        Some(path) => info!("Found yt-dlp at {}", path.display()),
        None => warn!(
            "yt-dlp not found on PATH; it will be downloaded to {} on first use",
            binary.cached_path().display()
        ),
    }
}
