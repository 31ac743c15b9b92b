//! Shared HTTP client construction.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::Result;

pub const USER_AGENT: &str = concat!("rust-livepost/", env!("CARGO_PKG_VERSION"));

/// Default timeout for outbound requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build a client with the crate user agent and a request timeout.
pub fn build_client(timeout: Duration) -> Result<Client> {
    install_rustls_provider();

    let mut builder = Client::builder().user_agent(USER_AGENT).gzip(true);
    if timeout > Duration::ZERO {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// GET `url` and return the body, mapping non-success statuses to
/// [`Error::HttpStatus`](crate::Error::HttpStatus). Transient failures are retried.
pub async fn fetch_text(client: &Client, url: &str, context: &'static str) -> Result<String> {
    crate::utils::retry_transient(context, || async {
        let response = client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(crate::Error::http_status(context, status.as_u16(), body));
        }
        Ok(body)
    })
    .await
}
