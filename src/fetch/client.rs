// src/fetch/client.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT},
    Client, StatusCode,
};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};
use url::Url;

use super::{FetchError, Fetcher, RawResponse, SourceRequest, UserAgents};
use crate::config::HttpConfig;

/// reqwest-backed [`Fetcher`] with a timeout, retries and rotating user agents.
pub struct HttpClient {
    client: Client,
    user_agents: UserAgents,
    max_retries: u32,
    initial_backoff_ms: u64,
}

impl HttpClient {
    pub fn new(config: &HttpConfig, user_agents: UserAgents) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,text/csv,text/plain;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("pt-BR,pt;q=0.9,en;q=0.8"));
        let client = Client::builder()
            .timeout(config.timeout())
            .cookie_store(true)
            .gzip(true)
            .default_headers(headers)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            user_agents,
            max_retries: config.max_retries,
            initial_backoff_ms: config.backoff_ms,
        })
    }

    async fn fetch_once(&self, url: &Url) -> Result<RawResponse, FetchError> {
        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        };

        debug!(%url, "GET");
        let resp = self
            .client
            .get(url.clone())
            .header(USER_AGENT, self.user_agents.pick())
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound { url: url.to_string() });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = resp.bytes().await.map_err(transport)?;
        Ok(RawResponse {
            status: status.as_u16(),
            bytes: bytes.to_vec(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch(&self, request: &SourceRequest) -> Result<RawResponse, FetchError> {
        let url = request.to_url()?;
        let mut attempts = 0;
        loop {
            match self.fetch_once(&url).await {
                Ok(r) => return Ok(r),
                Err(e) if e.is_retryable() && attempts < self.max_retries => {
                    attempts += 1;
                    let backoff = self.initial_backoff_ms * 2u64.pow(attempts - 1);
                    warn!(%url, attempt = attempts, delay_ms = backoff, error = %e, "Retrying");
                    sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        error!(%url, error = %e, "Exhausted retries");
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client() -> HttpClient {
        let cfg = HttpConfig {
            timeout_secs: 5,
            max_retries: 2,
            backoff_ms: 1,
            concurrency: 1,
        };
        HttpClient::new(&cfg, UserAgents::new(vec!["test-agent/1.0".to_string()])).unwrap()
    }

    #[tokio::test]
    async fn sends_params_and_user_agent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/informacoes/idka/IDkA-down.asp")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("DataIni".into(), "04/03/2024".into()),
                Matcher::UrlEncoded("saida".into(), "csv".into()),
            ]))
            .match_header("user-agent", "test-agent/1.0")
            .with_status(200)
            .with_body(b"Data de Refer\xeancia: 04/03/2024".as_slice())
            .expect(1)
            .create_async()
            .await;

        let req = SourceRequest::get(format!("{}/informacoes/idka/IDkA-down.asp", server.url()))
            .param("DataIni", "04/03/2024")
            .param("saida", "csv");
        let resp = client().fetch(&req).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.bytes[13], 0xea);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retries_server_errors_then_gives_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/arqs/ms240304.txt")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let req = SourceRequest::get(format!("{}/arqs/ms240304.txt", server.url()));
        let err = client().fetch(&req).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }), "{err}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/arqs/db240309.txt")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let req = SourceRequest::get(format!("{}/arqs/db240309.txt", server.url()));
        let err = client().fetch(&req).await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn forbidden_fails_fast() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/x")
            .with_status(403)
            .expect(1)
            .create_async()
            .await;

        let req = SourceRequest::get(format!("{}/x", server.url()));
        let err = client().fetch(&req).await.unwrap_err();
        assert_eq!(err, FetchError::Status { url: format!("{}/x", server.url()), status: 403 });
        mock.assert_async().await;
    }
}
