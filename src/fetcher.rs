//! Retrieves candidate pages and decodes them to text.

use crate::charset::{CharsetDetector, CharsetInput, charset_from_content_type, decode_with_chain, default_chain};
use crate::config::Config;
use crate::error::{AppError, FetchError, Result};
use crate::models::RawPage;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::{Duration, Instant};
use url::Url;

/// Source of raw pages for the pipeline.
#[async_trait]
pub(crate) trait PageFetcher: Send + Sync {
    /// Retrieves `url` with a single attempt. Failures are returned, never panicked.
    async fn fetch(&self, url: &Url) -> std::result::Result<RawPage, FetchError>;
}

/// Fetches pages over HTTP with a bounded timeout and body size.
pub(crate) struct HttpFetcher {
    client: Client,
    timeout: Duration,
    max_page_bytes: usize,
    detectors: Vec<Box<dyn CharsetDetector>>,
}

impl HttpFetcher {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| AppError::Generic(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout: config.request_timeout,
            max_page_bytes: config.max_page_bytes,
            detectors: default_chain(),
        })
    }

    /// Reads the body up to the size cap. Returns the bytes and whether they were cut.
    async fn read_capped(
        &self,
        response: reqwest::Response,
    ) -> std::result::Result<(Vec<u8>, bool), FetchError> {
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let room = self.max_page_bytes - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                return Ok((body, chunk.len() > room || stream.next().await.is_some()));
            }
            body.extend_from_slice(&chunk);
        }
        Ok((body, false))
    }
}

fn is_html_content_type(content_type: &str) -> bool {
    content_type.is_empty() || content_type.contains("html") || content_type.contains("xml")
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> std::result::Result<RawPage, FetchError> {
        let start_time = Instant::now();
        tracing::debug!(target: "fetch_task", "Attempting to GET: {}", url);

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                let err = FetchError::from(e);
                tracing::warn!(target: "fetch_task", "Failed to fetch {}: {}", url, err);
                err
            })?;

        let status = response.status();
        tracing::debug!(target: "fetch_task", "GET {} status: {}", url, status);
        if !status.is_success() {
            if status == reqwest::StatusCode::NOT_FOUND {
                tracing::debug!(target: "fetch_task", "Page not found (404): {}", url);
            } else {
                tracing::warn!(target: "fetch_task", "HTTP error fetching {}: {}", url, status);
            }
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !is_html_content_type(&content_type.to_lowercase()) {
            tracing::debug!(target: "fetch_task",
                "Skipping non-HTML content at {} ({})", url, content_type
            );
            return Err(FetchError::NotHtml(content_type));
        }

        let final_url = response.url().clone();
        let (bytes, truncated) = self.read_capped(response).await.inspect_err(|e| {
            tracing::warn!(target: "fetch_task", "Failed to read body of {}: {}", url, e);
        })?;
        if truncated {
            tracing::debug!(target: "fetch_task",
                "Body of {} truncated at {} bytes", url, self.max_page_bytes
            );
        }

        let tld = final_url
            .host_str()
            .and_then(|h| h.rsplit('.').next())
            .map(|t| t.to_ascii_lowercase());
        let content_type_opt = (!content_type.is_empty()).then_some(content_type.as_str());
        let decoded = decode_with_chain(
            &self.detectors,
            &CharsetInput {
                bytes: &bytes,
                content_type: content_type_opt,
                tld: tld.as_deref(),
                truncated,
            },
        );
        if decoded.lossy {
            tracing::warn!(target: "fetch_task",
                "Body of {} decoded with replacement characters ({})", url, decoded.encoding.name()
            );
        }

        tracing::info!(target: "fetch_task",
            "Fetched {} ({} bytes, {} via {}) in {:.2?}",
            final_url,
            bytes.len(),
            decoded.encoding.name(),
            decoded.source,
            start_time.elapsed()
        );

        Ok(RawPage {
            url: final_url,
            declared_charset: content_type_opt.and_then(charset_from_content_type),
            encoding: decoded.encoding.name(),
            decoded_text: decoded.text,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    fn fetcher(timeout: Duration, max_page_bytes: usize) -> HttpFetcher {
        let config = Config {
            request_timeout: timeout,
            max_page_bytes,
            ..Config::default()
        };
        HttpFetcher::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body("<html><title>Acme</title><body>Hello</body></html>")
            .create_async()
            .await;

        let url = Url::parse(&server.url()).unwrap();
        let page = fetcher(Duration::from_secs(5), 1024 * 1024)
            .fetch(&url)
            .await
            .unwrap();
        assert!(page.decoded_text.contains("<title>Acme</title>"));
        assert_eq!(page.declared_charset.as_deref(), Some("utf-8"));
        assert_eq!(page.encoding, "UTF-8");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/missing", server.url())).unwrap();
        let err = fetcher(Duration::from_secs(5), 1024)
            .fetch(&url)
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Status(404));
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_html() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/doc.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body("%PDF-1.4")
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/doc.pdf", server.url())).unwrap();
        let err = fetcher(Duration::from_secs(5), 1024)
            .fetch(&url)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotHtml(ct) if ct == "application/pdf"));
    }

    #[tokio::test]
    async fn test_fetch_decodes_declared_legacy_charset() {
        let (body, _, _) = WINDOWS_1252.encode("<html><body>Café de la Gare</body></html>");
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html; charset=iso-8859-1")
            .with_body(body.into_owned())
            .create_async()
            .await;

        let url = Url::parse(&server.url()).unwrap();
        let page = fetcher(Duration::from_secs(5), 1024 * 1024)
            .fetch(&url)
            .await
            .unwrap();
        assert!(page.decoded_text.contains("Café de la Gare"));
        assert!(!page.decoded_text.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_fetch_truncates_large_body() {
        let body = format!("<html><body>{}</body></html>", "a".repeat(10_000));
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(body)
            .create_async()
            .await;

        let url = Url::parse(&server.url()).unwrap();
        let page = fetcher(Duration::from_secs(5), 100).fetch(&url).await.unwrap();
        assert_eq!(page.bytes.len(), 100);
        assert_eq!(page.decoded_text.len(), 100);
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let url = Url::parse(&format!("http://{}/", addr)).unwrap();
        let err = fetcher(Duration::from_millis(300), 1024)
            .fetch(&url)
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout);
    }
}
