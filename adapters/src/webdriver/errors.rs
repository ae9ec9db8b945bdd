use engine::PageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebDriverError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// An error object returned by the remote end.
    #[error("webdriver {error}: {message}")]
    Protocol { error: String, message: String },

    #[error("invalid response from webdriver: {0}")]
    InvalidResponse(String),
}

impl WebDriverError {
    /// The element handle no longer points into the live document.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            WebDriverError::Protocol { error, .. }
                if error == "stale element reference" || error == "no such element"
        )
    }
}

impl From<WebDriverError> for PageError {
    fn from(e: WebDriverError) -> Self {
        if e.is_stale() {
            PageError::StaleElement
        } else {
            PageError::Driver(e.to_string())
        }
    }
}
