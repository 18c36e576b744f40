//! One bounded-timeout GET per candidate id, folded into a three-way outcome.

use async_trait::async_trait;
use comics_core::{CandidateId, RemoteComic};
use reqwest::{header, Client, Response, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Fixed path segment after the id: `{base}/{id}/info.0.json`.
pub const INFO_SUFFIX: &str = "info.0.json";

/// Bodies above this are treated as malformed.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected response status {0}")]
    Status(u16),
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("payload too large: {0} bytes")]
    TooLarge(usize),
    #[error("catalog answered with comic number {0}")]
    NumberMismatch(CandidateId),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for FetchFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() { FetchFailure::Timeout } else { FetchFailure::Transport(e) }
    }
}

/// A failed fetch that is neither a hit nor a definite miss.
#[derive(Debug, Error)]
#[error("id {id}: {cause}")]
pub struct TransientError {
    pub id: CandidateId,
    #[source]
    pub cause: FetchFailure,
}

#[derive(Debug)]
pub enum FetchOutcome {
    Found(RemoteComic),
    NotFound,
    Transient(TransientError),
}

impl FetchOutcome {
    pub fn transient(id: CandidateId, cause: FetchFailure) -> Self {
        FetchOutcome::Transient(TransientError { id, cause })
    }
}

/// Anything that can answer "what is comic `id`?".
#[async_trait]
pub trait ComicSource: Send + Sync {
    async fn fetch(&self, id: CandidateId) -> FetchOutcome;
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid source url {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("build http client: {0}")]
    Build(#[from] reqwest::Error),
}

/// HTTP source backed by the remote catalog.
#[derive(Debug, Clone)]
pub struct XkcdClient {
    base: Url,
    client: Client,
}

impl XkcdClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidBaseUrl { url: base_url.to_string(), reason: e.to_string() })?;
        if base.cannot_be_a_base() || !base.scheme().starts_with("http") {
            return Err(ClientError::InvalidBaseUrl { url: base_url.to_string(), reason: "not an http(s) base".into() });
        }
        let client = Client::builder()
            .user_agent(concat!("comics-fetcher/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()?;
        Ok(Self { base, client })
    }

    pub fn item_url(&self, id: CandidateId) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&id.to_string()).push(INFO_SUFFIX);
        }
        url
    }
}

#[async_trait]
impl ComicSource for XkcdClient {
    async fn fetch(&self, id: CandidateId) -> FetchOutcome {
        let resp = match self.client.get(self.item_url(id)).header(header::ACCEPT, "application/json").send().await {
            Ok(resp) => resp,
            Err(e) => return FetchOutcome::transient(id, e.into()),
        };
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return FetchOutcome::NotFound;
        }
        if !status.is_success() {
            return FetchOutcome::transient(id, FetchFailure::Status(status.as_u16()));
        }
        let body = match read_capped(resp).await {
            Ok(b) => b,
            Err(e) => return FetchOutcome::transient(id, e),
        };
        match serde_json::from_slice::<RemoteComic>(&body) {
            // Records are keyed by `num`, so it has to name the probed id.
            Ok(comic) if comic.num != id => FetchOutcome::transient(id, FetchFailure::NumberMismatch(comic.num)),
            Ok(comic) => FetchOutcome::Found(comic),
            Err(e) => FetchOutcome::transient(id, e.into()),
        }
    }
}

/// Read the body chunk by chunk, giving up as soon as it exceeds `MAX_BODY_BYTES`.
async fn read_capped(mut resp: Response) -> Result<Vec<u8>, FetchFailure> {
    if let Some(len) = resp.content_length() {
        if len > MAX_BODY_BYTES as u64 {
            return Err(FetchFailure::TooLarge(len as usize));
        }
    }
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        body.extend_from_slice(&chunk);
        if body.len() > MAX_BODY_BYTES {
            return Err(FetchFailure::TooLarge(body.len()));
        }
    }
    Ok(body)
}
