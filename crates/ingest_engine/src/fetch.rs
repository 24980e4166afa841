use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, warn};
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, REFERER};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Statuses worth retrying: rate limiting and transient server errors.
const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Browser-like agent; the target sites reject obvious bot agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Total GET attempts, first try included.
    pub retry_attempts: u32,
    /// Backoff before attempt n+1 is `backoff_base * 2^(n-1)`.
    pub backoff_base: Duration,
    pub max_bytes: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
            retry_attempts: 5,
            backoff_base: Duration::from_millis(300),
            max_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("timeout")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("response larger than {max_bytes} bytes")]
    TooLarge { max_bytes: u64 },
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl FetchError {
    /// Transient errors are the ones the retry loop is allowed to swallow.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Network(_) | FetchError::RetriesExhausted { .. } => {
                true
            }
            FetchError::HttpStatus(code) => RETRY_STATUSES.contains(code),
            _ => false,
        }
    }
}

/// Raw bytes plus the response metadata the extractor needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub final_url: String,
    pub content_type: Option<String>,
}

/// Enforces a minimum, jittered spacing between successive outbound
/// requests. Shared by every component that touches the network, so the
/// aggregate request rate stays polite even with concurrent chapter work.
#[derive(Debug)]
pub struct RequestPacer {
    min_delay: Duration,
    max_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
            last_request: Mutex::new(None),
        }
    }

    /// No spacing at all. Meant for tests against local mock servers.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Observed polite range for the live sources: 1.0–2.5s.
    pub fn polite() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_millis(2500))
    }

    /// Wait until the sampled delay has elapsed since the previous request.
    pub async fn pause(&self) {
        let delay = self.sample_delay();
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let due = previous + delay;
            let now = Instant::now();
            if due > now {
                tokio::time::sleep(due - now).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn sample_delay(&self) -> Duration {
        let span = self.max_delay.saturating_sub(self.min_delay).as_millis() as u64;
        if span == 0 {
            return self.min_delay;
        }
        let jitter = rand::thread_rng().gen_range(0..=span);
        self.min_delay + Duration::from_millis(jitter)
    }
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Paced, retried GET. `referer` is required by the image CDNs, which
    /// refuse requests without one.
    async fn get(&self, url: &str, referer: Option<&str>) -> Result<FetchOutput, FetchError>;
}

pub struct ReqwestFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
    pacer: Arc<RequestPacer>,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings, pacer: Arc<RequestPacer>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| FetchError::Network(err.to_string()))?;
        Ok(Self {
            client,
            settings,
            pacer,
        })
    }

    async fn attempt(
        &self,
        url: &reqwest::Url,
        referer: Option<&str>,
    ) -> Result<FetchOutput, FetchError> {
        self.pacer.pause().await;

        let mut request = self.client.get(url.clone());
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            if bytes.len() as u64 + chunk.len() as u64 > self.settings.max_bytes {
                return Err(FetchError::TooLarge {
                    max_bytes: self.settings.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchOutput {
            bytes,
            final_url,
            content_type,
        })
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn get(&self, url: &str, referer: Option<&str>) -> Result<FetchOutput, FetchError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|err| FetchError::InvalidUrl(err.to_string()))?;

        let attempts = self.settings.retry_attempts.max(1);
        let mut last_error = FetchError::Network("no attempt made".into());
        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff = self.settings.backoff_base * 2u32.pow(attempt - 1);
                debug!("retrying {url} in {backoff:?} (attempt {})", attempt + 1);
                tokio::time::sleep(backoff).await;
            }
            match self.attempt(&parsed, referer).await {
                Ok(output) => return Ok(output),
                Err(err) if err.is_transient() => {
                    warn!("GET {url} failed: {err}");
                    last_error = err;
                }
                Err(err) => return Err(err),
            }
        }
        Err(FetchError::RetriesExhausted {
            attempts,
            last: last_error.to_string(),
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout;
    }
    FetchError::Network(err.to_string())
}
