use std::time::Duration;

use reqwest::ClientBuilder;
use reqwest::header::{ACCEPT_ENCODING, HeaderMap, HeaderValue};

pub const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Supplies transports to remote repositories. The core never builds a
/// client on its own.
pub trait HttpClientFactory: Send + Sync {
    fn get(&self) -> ClientBuilder;
}

#[derive(Debug, Clone)]
pub struct DefaultHttpClientFactory {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for DefaultHttpClientFactory {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl HttpClientFactory for DefaultHttpClientFactory {
    fn get(&self) -> ClientBuilder {
        // Artifacts are stored as served; Content-Length must describe the raw body.
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .default_headers(default_headers)
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
    }
}
