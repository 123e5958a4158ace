use thiserror::Error;

/// Fatal errors surfaced to the orchestrator.
///
/// Most upstream failures do not reach this type: a bad HTTP response, an
/// empty payload, or a schema mismatch degrades to an empty batch or a
/// tagged row rather than propagating. `ScreenError` is reserved for
/// conditions the run cannot proceed past at all.
#[derive(Debug, Error)]
pub enum ScreenError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected response status: {status} at {url}")]
    Status { status: u16, url: String },

    #[error("data format unexpected or missing field: {0}")]
    Data(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("fatal: {0}")]
    Fatal(String),
}
