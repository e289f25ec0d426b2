use reqwest::StatusCode;
use thiserror::Error;

/// Why a coordinator request produced no page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error! status: {0}")]
    Http(StatusCode),

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("unexpected status {0:?}")]
    Status(Option<String>),

    #[error("payload has no `{0}`")]
    MissingField(&'static str),

    #[error("no cursor token for page {page} of {scope}")]
    NoCursor { scope: String, page: u32 },
}

/// Failure talking to the third-party news API from the proxy.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
}
