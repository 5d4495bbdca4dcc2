use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::{RetryPolicy, Settings};
use crate::parse::{parse_suggestions, Suggestion};
use crate::{warn_time, Error, Result};

/// The two autocomplete endpoints the crawler talks to.
#[async_trait]
pub trait SuggestionSource: Send + Sync + 'static {
    /// Street names starting with `prefix`. The empty prefix is allowed.
    async fn streets(&self, prefix: &str) -> Result<Vec<Suggestion>>;

    /// House numbers of `street` starting with `number_prefix`.
    async fn house_numbers(&self, street: &str, number_prefix: &str) -> Result<Vec<Suggestion>>;
}

/// HTTP implementation of [`SuggestionSource`] with retries.
pub struct HttpSource {
    // Client uses Arc so we can clone cheaply
    client: Client,
    street_url: String,
    number_url: String,
    retry: RetryPolicy,
}

impl HttpSource {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("strassen-scrap/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: Client, settings: &Settings) -> Self {
        Self {
            client,
            street_url: settings.street_url.clone(),
            number_url: settings.number_url.clone(),
            retry: settings.retry.clone(),
        }
    }

    /// Sends one GET and decodes the body. A body that doesn't decode counts as no suggestions.
    async fn get_once(&self, url: &str, params: &[(&str, &str)]) -> Result<Vec<Suggestion>> {
        let res = self.client.get(url).query(params).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status));
        }
        let body = res.text().await?;
        match parse_suggestions(&body) {
            Some(suggestions) => Ok(suggestions),
            None => {
                warn_time!("malformed response from {url} for {params:?}, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn get_suggestions(
        &self,
        url: &str,
        params: &[(&str, &str)],
        target: String,
    ) -> Result<Vec<Suggestion>> {
        let mut attempt = 1;
        loop {
            match self.get_once(url, params).await {
                Ok(suggestions) => return Ok(suggestions),
                Err(err) if err.is_transient() && attempt < self.retry.attempts => {
                    let delay = backoff_delay(&self.retry, attempt);
                    warn_time!(
                        "{target}: attempt {attempt}/{} failed ({err}), retrying in {:?}",
                        self.retry.attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(Error::QueryFailed {
                        target,
                        attempts: attempt,
                        reason: err.to_string(),
                    })
                }
            }
        }
    }
}

#[async_trait]
impl SuggestionSource for HttpSource {
    async fn streets(&self, prefix: &str) -> Result<Vec<Suggestion>> {
        self.get_suggestions(
            &self.street_url,
            &[("street", prefix)],
            format!("street prefix '{prefix}'"),
        )
        .await
    }

    async fn house_numbers(&self, street: &str, number_prefix: &str) -> Result<Vec<Suggestion>> {
        let target = format!("'{street}' number prefix '{number_prefix}'");
        if number_prefix.is_empty() {
            self.get_suggestions(&self.number_url, &[("street", street)], target)
                .await
        } else {
            self.get_suggestions(
                &self.number_url,
                &[("street", street), ("streetnr", number_prefix)],
                target,
            )
            .await
        }
    }
}

/// Wait before retry number `retry` (1-based): `initial * multiplier^(retry - 1)` with
/// ±25% jitter, never above `policy.max`.
fn backoff_delay(policy: &RetryPolicy, retry: u32) -> Duration {
    let exp = policy.multiplier.powi(retry.saturating_sub(1).min(64) as i32);
    let base = (policy.initial.as_secs_f64() * exp).min(policy.max.as_secs_f64());
    let jitter = rand::random::<f64>() * 0.5 - 0.25;
    Duration::from_secs_f64(base * (1.0 + jitter)).min(policy.max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn policy(attempts: u32, initial_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy {
            attempts,
            initial: Duration::from_millis(initial_ms),
            max: Duration::from_millis(max_ms),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_doubles_until_the_cap() {
        let policy = policy(5, 100, 300);

        let first = backoff_delay(&policy, 1).as_millis();
        assert!((74..=125).contains(&first), "{first}");
        let second = backoff_delay(&policy, 2).as_millis();
        assert!((149..=250).contains(&second), "{second}");
        // 400ms before jitter, so clamped to the cap from here on
        for retry in 3..policy.attempts {
            let delay = backoff_delay(&policy, retry).as_millis();
            assert!((224..=300).contains(&delay), "retry {retry}: {delay}");
        }
    }

    #[test]
    fn test_backoff_total_wait_is_bounded_by_attempts() {
        let policy = policy(4, 1000, 1500);
        let total: Duration = (1..policy.attempts)
            .map(|retry| backoff_delay(&policy, retry))
            .sum();
        assert!(total <= policy.max * (policy.attempts - 1));
        assert!(backoff_delay(&policy, u32::MAX) <= policy.max);
    }

    /// Answers the n-th request with the n-th response, repeating the last one.
    async fn serve_sequence(
        responses: Vec<(&'static str, &'static str)>,
    ) -> (String, Arc<AtomicUsize>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        tokio::spawn({
            let hits = hits.clone();
            async move {
                while let Ok((mut sock, _)) = listener.accept().await {
                    let mut buf = vec![0u8; 4096];
                    let _ = sock.read(&mut buf).await;
                    let n = hits.fetch_add(1, Ordering::SeqCst);
                    let (status_line, body) = responses[n.min(responses.len() - 1)];
                    let resp = format!(
                        "{status_line}\r\ncontent-type: application/json\r\n\
                         content-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = sock.write_all(resp.as_bytes()).await;
                }
            }
        });
        (format!("http://{addr}/"), hits)
    }

    async fn serve_fixed(status_line: &'static str, body: &'static str) -> String {
        serve_sequence(vec![(status_line, body)]).await.0
    }

    fn local_source(url: &str, attempts: u32) -> HttpSource {
        let client = Client::builder().no_proxy().build().unwrap();
        HttpSource::with_client(client, &settings_for(url, attempts))
    }

    fn settings_for(url: &str, attempts: u32) -> Settings {
        Settings {
            street_url: url.into(),
            number_url: url.into(),
            retry: RetryPolicy {
                attempts,
                initial: Duration::from_millis(1),
                max: Duration::from_millis(2),
                multiplier: 2.0,
            },
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_http_source_decodes_suggestions() {
        let url = serve_fixed(
            "HTTP/1.1 200 OK",
            r#"{"suggestions":[{"value":"Alexanderstraße","data":"Alexanderstraße"}]}"#,
        )
        .await;
        let source = local_source(&url, 2);
        let got = source.streets("Ale").await.unwrap();
        assert_eq!(got, vec![Suggestion::new("Alexanderstraße")]);
    }

    #[tokio::test]
    async fn test_http_source_malformed_is_empty() {
        let url = serve_fixed("HTTP/1.1 200 OK", "not json").await;
        let source = local_source(&url, 2);
        assert!(source.house_numbers("Hauptstraße", "1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_http_source_gives_up_after_attempts() {
        let url = serve_fixed("HTTP/1.1 503 Service Unavailable", "{}").await;
        let source = local_source(&url, 3);
        let err = source.streets("B").await.unwrap_err();
        assert!(matches!(err, Error::QueryFailed { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_http_source_does_not_retry_client_errors() {
        let url = serve_fixed("HTTP/1.1 404 Not Found", "{}").await;
        let source = local_source(&url, 3);
        let err = source.streets("B").await.unwrap_err();
        assert!(matches!(err, Error::QueryFailed { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_http_source_retries_then_succeeds() {
        let (url, hits) = serve_sequence(vec![
            ("HTTP/1.1 503 Service Unavailable", "{}"),
            (
                "HTTP/1.1 200 OK",
                r#"{"suggestions":[{"value":"Birkenwaldstraße","data":"Birkenwaldstraße"}]}"#,
            ),
        ])
        .await;
        let source = local_source(&url, 3);

        let got = source.streets("Bir").await.unwrap();

        assert_eq!(got, vec![Suggestion::new("Birkenwaldstraße")]);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
