use crate::config::HttpConfig;
use crate::core::charset::HeaderCharsetResolver;
use crate::domain::ports::CharsetResolver;
use crate::utils::error::{RefreshError, Result};
use flate2::read::MultiGzDecoder;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT_CHARSET, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

/// Downloads remote resources over HTTP(S).
///
/// Every request made through one fetcher (and its clones) shares the same
/// cookie jar, so session cookies set on a redirect survive into later
/// requests. Build fetchers with separate jars to isolate sessions.
#[derive(Clone)]
pub struct ResourceFetcher {
    client: Client,
    cookie_jar: Arc<Jar>,
    charset_resolver: Arc<dyn CharsetResolver>,
}

struct Body {
    bytes: Vec<u8>,
    content_type: Option<String>,
}

impl ResourceFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Self::with_cookie_jar(config, Arc::new(Jar::default()))
    }

    pub fn with_cookie_jar(config: &HttpConfig, cookie_jar: Arc<Jar>) -> Result<Self> {
        let mut builder = Client::builder()
            .cookie_provider(Arc::clone(&cookie_jar))
            .tls_info(true);

        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = config.connect_timeout_seconds {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.as_str());
        }

        let resolver = HeaderCharsetResolver::from_label(&config.default_charset)?;

        Ok(Self {
            client: builder.build()?,
            cookie_jar,
            charset_resolver: Arc::new(resolver),
        })
    }

    pub fn with_charset_resolver<R: CharsetResolver + 'static>(mut self, resolver: R) -> Self {
        self.charset_resolver = Arc::new(resolver);
        self
    }

    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.cookie_jar)
    }

    /// Appends the decoded lines of `url` to `lines`, in order.
    ///
    /// A missing URL or missing output is a no-op, not an error.
    pub async fn download(&self, url: Option<&str>, lines: Option<&mut Vec<String>>) -> Result<()> {
        let (Some(url), Some(lines)) = (url, lines) else {
            return Ok(());
        };

        let body = self.get(url).await?;
        let charset = self.charset_resolver.resolve(body.content_type.as_deref());
        let (text, had_errors) = charset.decode_without_bom_handling(&body.bytes);
        if had_errors {
            tracing::warn!(
                "Malformed {} sequences in response from {}",
                charset.name(),
                url
            );
        }

        lines.extend(split_lines(&text));
        Ok(())
    }

    pub async fn fetch_lines(&self, url: &str) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        self.download(Some(url), Some(&mut lines)).await?;
        Ok(lines)
    }

    /// Body of `url` as raw bytes, decompressed but not decoded.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        Ok(self.get(url).await?.bytes)
    }

    async fn get(&self, url: &str) -> Result<Body> {
        tracing::debug!("Requesting {}", url);
        let response = self
            .client
            .get(url)
            .header(ACCEPT_CHARSET, "UTF-8")
            .header(ACCEPT_ENCODING, "gzip")
            .send()
            .await?;

        log_tls_info(&response);

        let status = response.status();
        tracing::debug!("Response status {} for {}", status, url);
        if status != StatusCode::OK {
            return Err(RefreshError::Transfer {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = header_value(&response, CONTENT_TYPE);
        let gzipped = header_value(&response, CONTENT_ENCODING)
            .is_some_and(|encoding| encoding.trim().eq_ignore_ascii_case("gzip"));

        let raw = response.bytes().await?;
        let bytes = if gzipped {
            let mut decoded = Vec::with_capacity(raw.len() * 4);
            MultiGzDecoder::new(raw.as_ref()).read_to_end(&mut decoded)?;
            decoded
        } else {
            raw.to_vec()
        };

        Ok(Body {
            bytes,
            content_type,
        })
    }
}

fn header_value(response: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn log_tls_info(response: &Response) {
    if response.url().scheme() != "https" || !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    let host = response.url().host_str().unwrap_or_default();
    match response
        .extensions()
        .get::<reqwest::tls::TlsInfo>()
        .and_then(|info| info.peer_certificate())
    {
        Some(cert) => tracing::debug!(
            "Connection to {} using TLS, peer certificate {} bytes",
            host,
            cert.len()
        ),
        None => tracing::debug!("Connection to {} using TLS", host),
    }
}

/// Splits on `\n`, `\r\n` or a lone `\r`. A trailing terminator does not
/// produce an empty last line.
pub fn split_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        match rest.find(|c: char| c == '\n' || c == '\r') {
            Some(idx) => {
                lines.push(rest[..idx].to_string());
                let skip = if rest[idx..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[idx + skip..];
            }
            None => {
                lines.push(rest.to_string());
                break;
            }
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lines_terminators() {
        assert_eq!(split_lines("a\nb\r\nc\rd"), vec!["a", "b", "c", "d"]);
        assert_eq!(split_lines("a\n\nb\n"), vec!["a", "", "b"]);
        assert_eq!(split_lines("\r\n"), vec![""]);
        assert!(split_lines("").is_empty());
    }

    #[tokio::test]
    async fn test_download_without_url_or_output_is_noop() {
        let fetcher = ResourceFetcher::new(&HttpConfig::default()).unwrap();

        let mut lines = vec!["kept".to_string()];
        fetcher.download(None, Some(&mut lines)).await.unwrap();
        assert_eq!(lines, vec!["kept"]);

        fetcher
            .download(Some("http://127.0.0.1:1/never-contacted"), None)
            .await
            .unwrap();
    }

    #[test]
    fn test_rejects_unknown_default_charset() {
        let config = HttpConfig {
            default_charset: "nonsense".to_string(),
            ..HttpConfig::default()
        };
        assert!(ResourceFetcher::new(&config).is_err());
    }
}
