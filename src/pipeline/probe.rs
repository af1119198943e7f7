//! Per-task image probe and content fetch.
//!
//! `ImageSource` is the transport seam; the reqwest-backed implementation
//! lives in `infrastructure::http_client` and tests plug in fakes. Every
//! network call made here runs under [`settle_within`] so it is bounded by
//! its own deadline and by the run's abort token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::constants::media::DEFAULT_EXTENSION;
use crate::domain::constants::pipeline::{FETCH_TIMEOUT_MS, PROBE_HEAD_TIMEOUT_MS, PROBE_LOAD_TIMEOUT_MS};
use crate::domain::{FailureReason, FetchedImage};
use crate::pipeline::timer::{Settled, settle_within};

/// Raw response of a full GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteImage {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl RemoteImage {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        is_success_status(self.status)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// Network access used by the probe
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Issues a head-only request and returns the response status
    async fn head(&self, url: &str) -> Result<u16, TransportError>;

    /// Issues a full request and returns status, content type and body
    async fn get(&self, url: &str) -> Result<RemoteImage, TransportError>;
}

/// Why an archive-mode fetch produced no payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Fetch timed out after {0:?}")]
    TimedOut(Duration),

    #[error("HTTP {0}")]
    Http(u16),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Fetch aborted")]
    Aborted,
}

impl From<ProbeError> for FailureReason {
    fn from(error: ProbeError) -> Self {
        match error {
            ProbeError::TimedOut(_) => Self::TimedOut,
            ProbeError::Http(status) => Self::Http(status),
            ProbeError::Transport(message) => Self::Network(message),
            ProbeError::Aborted => Self::Aborted,
        }
    }
}

/// Deadlines applied by the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimeouts {
    /// Head-only existence check
    pub head: Duration,
    /// Full-load fallback after an indeterminate head check
    pub load: Duration,
    /// Archive-mode content fetch
    pub fetch: Duration,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            head: Duration::from_millis(PROBE_HEAD_TIMEOUT_MS),
            load: Duration::from_millis(PROBE_LOAD_TIMEOUT_MS),
            fetch: Duration::from_millis(FETCH_TIMEOUT_MS),
        }
    }
}

/// Images already retrieved during this session, keyed by URL
#[derive(Debug, Default)]
pub struct ImageCache {
    entries: RwLock<HashMap<String, FetchedImage>>,
}

impl ImageCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, url: &str) -> Option<FetchedImage> {
        self.entries.read().await.get(url).cloned()
    }

    pub async fn insert(&self, url: impl Into<String>, image: FetchedImage) {
        self.entries.write().await.insert(url.into(), image);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Result of the head-only check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadVerdict {
    Exists,
    Missing(u16),
    Indeterminate,
}

/// Existence probe and content fetch over an [`ImageSource`]
pub struct ImageProbe<S: ImageSource + ?Sized> {
    source: Arc<S>,
    timeouts: ProbeTimeouts,
    cache: Option<Arc<ImageCache>>,
    default_extension: String,
}

impl<S: ImageSource + ?Sized> Clone for ImageProbe<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            timeouts: self.timeouts,
            cache: self.cache.clone(),
            default_extension: self.default_extension.clone(),
        }
    }
}

impl<S: ImageSource + ?Sized> ImageProbe<S> {
    pub fn new(source: Arc<S>, timeouts: ProbeTimeouts) -> Self {
        Self {
            source,
            timeouts,
            cache: None,
            default_extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    /// Serves archive fetches from `cache` when possible and records new fetches in it
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ImageCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_default_extension(mut self, extension: impl Into<String>) -> Self {
        self.default_extension = extension.into();
        self
    }

    pub const fn timeouts(&self) -> ProbeTimeouts {
        self.timeouts
    }

    /// Boolean existence check. Never fails; every error path means `false`.
    pub async fn exists(&self, url: &str, abort: &CancellationToken) -> bool {
        self.probe(url, abort).await.is_ok()
    }

    /// Existence check with the reason a missing image was judged missing.
    ///
    /// A head-only request decides first. Only when it cannot give a
    /// definitive answer (transport error, timeout, HEAD unsupported) is the
    /// full image loaded and decoded under the second deadline.
    pub async fn probe(&self, url: &str, abort: &CancellationToken) -> Result<(), FailureReason> {
        match self.head_verdict(url, abort).await? {
            HeadVerdict::Exists => Ok(()),
            HeadVerdict::Missing(status) => {
                debug!("Image missing (HEAD {}): {}", status, url);
                Err(FailureReason::Http(status))
            }
            HeadVerdict::Indeterminate => {
                debug!("HEAD check indeterminate, loading full image: {}", url);
                self.load_and_decode(url, abort).await
            }
        }
    }

    async fn head_verdict(&self, url: &str, abort: &CancellationToken) -> Result<HeadVerdict, FailureReason> {
        match settle_within(self.timeouts.head, abort, self.source.head(url)).await {
            Settled::Aborted => Err(FailureReason::Aborted),
            Settled::TimedOut => Ok(HeadVerdict::Indeterminate),
            Settled::Completed(Err(error)) => {
                debug!("HEAD request failed for {}: {}", url, error);
                Ok(HeadVerdict::Indeterminate)
            }
            Settled::Completed(Ok(status)) if is_success_status(status) => Ok(HeadVerdict::Exists),
            Settled::Completed(Ok(405 | 501)) => Ok(HeadVerdict::Indeterminate),
            Settled::Completed(Ok(status)) => Ok(HeadVerdict::Missing(status)),
        }
    }

    /// GET and decode check under one deadline
    async fn load_and_decode(&self, url: &str, abort: &CancellationToken) -> Result<(), FailureReason> {
        let load = async {
            let response = self.source.get(url).await.map_err(|e| FailureReason::Network(e.to_string()))?;
            if !response.is_success() {
                return Err(FailureReason::Http(response.status));
            }
            if decodes(response).await { Ok(()) } else { Err(FailureReason::Undecodable) }
        };

        match settle_within(self.timeouts.load, abort, load).await {
            Settled::Aborted => Err(FailureReason::Aborted),
            Settled::TimedOut => Err(FailureReason::TimedOut),
            Settled::Completed(result) => result,
        }
    }

    /// Retrieves the image content for archive mode
    pub async fn fetch(&self, url: &str, abort: &CancellationToken) -> Result<FetchedImage, ProbeError> {
        if abort.is_cancelled() {
            return Err(ProbeError::Aborted);
        }

        if let Some(cache) = &self.cache {
            if let Some(image) = cache.get(url).await {
                debug!("Serving cached image: {}", url);
                return Ok(image);
            }
        }

        let response = match settle_within(self.timeouts.fetch, abort, self.source.get(url)).await {
            Settled::Aborted => return Err(ProbeError::Aborted),
            Settled::TimedOut => return Err(ProbeError::TimedOut(self.timeouts.fetch)),
            Settled::Completed(Err(error)) => return Err(ProbeError::Transport(error.to_string())),
            Settled::Completed(Ok(response)) => response,
        };

        if !response.is_success() {
            warn!("Image fetch returned HTTP {}: {}", response.status, url);
            return Err(ProbeError::Http(response.status));
        }

        let image = FetchedImage::with_default_extension(
            response.bytes,
            response.content_type,
            &self.default_extension,
        );

        if let Some(cache) = &self.cache {
            cache.insert(url, image.clone()).await;
        }

        Ok(image)
    }
}

const fn is_success_status(status: u16) -> bool {
    status >= 200 && status < 300
}

/// Runs the decode check off the async workers
async fn decodes(response: RemoteImage) -> bool {
    match tokio::task::spawn_blocking(move || is_decodable(&response)).await {
        Ok(decodable) => decodable,
        Err(error) => {
            warn!("Image decode task failed: {}", error);
            false
        }
    }
}

/// Decode check standing in for the browser's image load/error signal
///
/// A declared type this build cannot read (SVG, AVIF) counts as decodable
/// when the body is non-empty.
fn is_decodable(response: &RemoteImage) -> bool {
    if response.bytes.is_empty() {
        return false;
    }

    let mime = response
        .content_type
        .as_deref()
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase());
    if let Some(mime) = mime.as_deref() {
        let unreadable = image::ImageFormat::from_mime_type(mime).is_some_and(|format| !format.reading_enabled());
        if mime == "image/svg+xml" || unreadable {
            return true;
        }
    }

    image::load_from_memory(&response.bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn png_bytes() -> Bytes {
        let pixels = image::RgbImage::from_pixel(2, 2, image::Rgb([200, 10, 10]));
        let mut buffer = Cursor::new(Vec::new());
        pixels.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        Bytes::from(buffer.into_inner())
    }

    /// Scripted source: fixed HEAD and GET behaviour per test
    struct ScriptedSource {
        head: Result<u16, TransportError>,
        head_delay: Duration,
        get: Result<RemoteImage, TransportError>,
        get_delay: Duration,
        gets: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(head: Result<u16, TransportError>, get: Result<RemoteImage, TransportError>) -> Self {
            Self {
                head,
                head_delay: Duration::ZERO,
                get,
                get_delay: Duration::ZERO,
                gets: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ImageSource for ScriptedSource {
        async fn head(&self, _url: &str) -> Result<u16, TransportError> {
            if !self.head_delay.is_zero() {
                tokio::time::sleep(self.head_delay).await;
            }
            self.head.clone()
        }

        async fn get(&self, _url: &str) -> Result<RemoteImage, TransportError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if !self.get_delay.is_zero() {
                tokio::time::sleep(self.get_delay).await;
            }
            self.get.clone()
        }
    }

    fn ok_png() -> Result<RemoteImage, TransportError> {
        Ok(RemoteImage { status: 200, content_type: Some("image/png".into()), bytes: png_bytes() })
    }

    fn probe(source: ScriptedSource) -> (ImageProbe<ScriptedSource>, Arc<ScriptedSource>) {
        let source = Arc::new(source);
        (ImageProbe::new(Arc::clone(&source), ProbeTimeouts::default()), source)
    }

    #[tokio::test]
    async fn test_head_success_exists_without_full_load() {
        let (probe, source) = probe(ScriptedSource::new(Ok(200), ok_png()));
        assert!(probe.exists("https://cdn/a.png", &CancellationToken::new()).await);
        assert_eq!(source.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_head_not_found_is_missing() {
        let (probe, source) = probe(ScriptedSource::new(Ok(404), ok_png()));
        let result = probe.probe("https://cdn/a.png", &CancellationToken::new()).await;
        assert_eq!(result, Err(FailureReason::Http(404)));
        assert_eq!(source.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transport_error_falls_back_to_decode() {
        let (probe, source) = probe(ScriptedSource::new(Err(TransportError::Request("reset".into())), ok_png()));
        assert!(probe.exists("https://cdn/a.png", &CancellationToken::new()).await);
        assert_eq!(source.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_head_unsupported_falls_back_to_decode() {
        let (probe, source) = probe(ScriptedSource::new(Ok(405), ok_png()));
        assert!(probe.exists("https://cdn/a.png", &CancellationToken::new()).await);
        assert_eq!(source.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_rejects_undecodable_body() {
        let body = Ok(RemoteImage {
            status: 200,
            content_type: Some("image/jpeg".into()),
            bytes: Bytes::from_static(b"<html>not an image</html>"),
        });
        let (probe, _) = probe(ScriptedSource::new(Ok(501), body));
        let result = probe.probe("https://cdn/a.jpg", &CancellationToken::new()).await;
        assert_eq!(result, Err(FailureReason::Undecodable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_timeout_is_missing() {
        let mut source = ScriptedSource::new(Err(TransportError::Request("cors".into())), ok_png());
        source.get_delay = Duration::from_secs(600);
        let (probe, _) = probe(source);
        let result = probe.probe("https://cdn/a.png", &CancellationToken::new()).await;
        assert_eq!(result, Err(FailureReason::TimedOut));
    }

    #[tokio::test]
    async fn test_fallback_accepts_types_this_build_cannot_decode() {
        let avif = |bytes: Bytes| {
            Ok(RemoteImage { status: 200, content_type: Some("image/avif; q=0.9".into()), bytes })
        };
        let (declared, _) = probe(ScriptedSource::new(Ok(405), avif(Bytes::from_static(b"\0\0\0\x1cftypavif"))));
        assert_eq!(declared.probe("https://cdn/a.avif", &CancellationToken::new()).await, Ok(()));

        let (empty, _) = probe(ScriptedSource::new(Ok(405), avif(Bytes::new())));
        let result = empty.probe("https://cdn/a.avif", &CancellationToken::new()).await;
        assert_eq!(result, Err(FailureReason::Undecodable));
    }

    #[tokio::test]
    async fn test_slow_decode_counts_against_load_deadline() {
        let pixels = image::GrayImage::new(6000, 6000);
        let mut buffer = Cursor::new(Vec::new());
        pixels.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        let body = Ok(RemoteImage {
            status: 200,
            content_type: Some("image/png".into()),
            bytes: Bytes::from(buffer.into_inner()),
        });
        let source = Arc::new(ScriptedSource::new(Ok(405), body));

        let timeouts = ProbeTimeouts { load: Duration::from_millis(2), ..ProbeTimeouts::default() };
        let tight = ImageProbe::new(Arc::clone(&source), timeouts);
        let result = tight.probe("https://cdn/big.png", &CancellationToken::new()).await;
        assert_eq!(result, Err(FailureReason::TimedOut));

        let relaxed = ImageProbe::new(source, ProbeTimeouts::default());
        assert!(relaxed.exists("https://cdn/big.png", &CancellationToken::new()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_head_timeout_is_indeterminate() {
        let mut source = ScriptedSource::new(Ok(200), ok_png());
        source.head_delay = Duration::from_secs(600);
        let (probe, source) = probe(source);
        assert!(probe.exists("https://cdn/a.png", &CancellationToken::new()).await);
        assert_eq!(source.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_aborted_probe_reports_aborted() {
        let (probe, _) = probe(ScriptedSource::new(Ok(200), ok_png()));
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(probe.probe("https://cdn/a.png", &token).await, Err(FailureReason::Aborted));
    }

    #[tokio::test]
    async fn test_fetch_derives_extension_and_populates_cache() {
        let cache = Arc::new(ImageCache::new());
        let source = Arc::new(ScriptedSource::new(Ok(200), ok_png()));
        let probe = ImageProbe::new(Arc::clone(&source), ProbeTimeouts::default()).with_cache(Arc::clone(&cache));
        let token = CancellationToken::new();

        let first = probe.fetch("https://cdn/a", &token).await.unwrap();
        assert_eq!(first.extension, ".png");
        let second = probe.fetch("https://cdn/a", &token).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.gets.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let body = Ok(RemoteImage { status: 500, content_type: None, bytes: Bytes::new() });
        let (probe, _) = probe(ScriptedSource::new(Ok(200), body));
        let error = probe.fetch("https://cdn/a", &CancellationToken::new()).await.unwrap_err();
        assert_eq!(error, ProbeError::Http(500));
        assert_eq!(FailureReason::from(error), FailureReason::Http(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout() {
        let mut source = ScriptedSource::new(Ok(200), ok_png());
        source.get_delay = Duration::from_secs(600);
        let (probe, _) = probe(source);
        let error = probe.fetch("https://cdn/a", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(error, ProbeError::TimedOut(_)));
    }

    #[tokio::test]
    async fn test_fetch_unknown_type_uses_default_extension() {
        let body = Ok(RemoteImage { status: 200, content_type: None, bytes: png_bytes() });
        let source = Arc::new(ScriptedSource::new(Ok(200), body));
        let probe = ImageProbe::new(source, ProbeTimeouts::default()).with_default_extension(".jpeg");
        let image = probe.fetch("https://cdn/a", &CancellationToken::new()).await.unwrap();
        assert_eq!(image.extension, ".jpeg");
    }
}
