//! Rate limited HTTP GETs with retries, shared by all drivers.
//!
//! Every attempt waits on the driver's [`RateLimiter`] first, so retries count against the same
//! budget as first tries. Transport failures and 5xx responses (except 501) are retried with
//! exponential backoff; anything else is returned straight away.
//!
//! JSON requests are bounded by the server's timeout from send to the last body byte, and a
//! body that breaks off midway is retried like a failed send. Media streams are only bounded
//! while idle, so a slow but steady download is never cut off.
use std::future::Future;
use std::io;
use std::time::Duration;

use futures::TryStreamExt;
use gallery_common::{
    log::{debug, warn},
    post::FileStream,
    reqwest::{Client, Response, StatusCode, Url},
};
use serde::de::DeserializeOwned;
use tokio_util::{io::StreamReader, sync::CancellationToken};

use crate::driver_config::{RetryConfig, ServerConfig};
use crate::error::DriverError;
use crate::limiter::RateLimiter;

#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    limiter: RateLimiter,
    retry: RetryConfig,
    timeout: Duration,
}

impl Fetcher {
    /// Builds a client with the server's user agent.
    ///
    /// The server timeout bounds connecting and every wait for more data. It doesn't bound a
    /// whole download.
    pub fn new(config: &ServerConfig) -> Result<Self, DriverError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout())
            .read_timeout(config.timeout())
            .build()
            .map_err(DriverError::ClientBuild)?;

        Ok(Self::with_client(client, config))
    }

    /// Uses an already configured client. Limits, retries and the JSON timeout still come from
    /// `config`.
    #[must_use]
    pub fn with_client(client: Client, config: &ServerConfig) -> Self {
        debug!(
            "Fetcher for {}: {} req/s, burst {}, {} attempts",
            config.name,
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
            config.retry.max_attempts()
        );

        Self {
            client,
            limiter: RateLimiter::new(
                config.rate_limit.requests_per_second,
                config.rate_limit.burst,
            ),
            retry: config.retry,
            timeout: config.timeout(),
        }
    }

    /// GETs `url` and decodes the JSON body into `T`.
    ///
    /// The body is read inside each attempt, so a connection dropped mid-body is retried. A body
    /// that fails to decode is a [`DriverError::Decode`] and is never retried.
    pub async fn get_json<T>(&self, url: &Url, cancel: &CancellationToken) -> Result<T, DriverError>
    where
        T: DeserializeOwned,
    {
        let body = self
            .with_retries(url, cancel, move || async move {
                let response = self.send(url, cancel, Some(self.timeout)).await?;

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(DriverError::Cancelled),
                    body = response.bytes() => body.map_err(|source| DriverError::Connection {
                        url: url.to_string(),
                        source,
                    }),
                }
            })
            .await?;

        serde_json::from_slice(&body).map_err(|source| DriverError::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// GETs `url` and hands back the body as an unbuffered stream.
    ///
    /// Only getting the response is retried. Errors while reading the stream go to the caller.
    pub async fn get_stream(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<FileStream, DriverError> {
        let response = self
            .with_retries(url, cancel, move || self.send(url, cancel, None))
            .await?;
        let content_length = response.content_length();

        let reader = StreamReader::new(response.bytes_stream().map_err(io::Error::other));
        Ok(FileStream::new(url.as_str(), content_length, reader))
    }

    /// Runs `attempt` until it succeeds, fails permanently or runs out of attempts.
    async fn with_retries<T, F, Fut>(
        &self,
        url: &Url,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> Result<T, DriverError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        let attempts = self.retry.max_attempts();
        let mut current = 1;

        loop {
            self.limiter.wait(cancel).await?;
            debug!("GET {url} (attempt {current}/{attempts})");

            let error = match attempt().await {
                Ok(value) => return Ok(value),
                Err(error) if should_retry(&error) => error,
                Err(error) => return Err(error),
            };

            if current >= attempts {
                warn!("Giving up on {url} after {attempts} attempts: {error}");
                return Err(error);
            }

            let delay = self.retry.backoff(current);
            warn!("Attempt {current}/{attempts} failed: {error}. Retrying in {delay:?}");
            sleep_or_cancel(delay, cancel).await?;
            current += 1;
        }
    }

    /// Sends one request and turns non-2xx statuses into errors.
    async fn send(
        &self,
        url: &Url,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<Response, DriverError> {
        let mut request = self.client.get(url.clone());
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DriverError::Cancelled),
            result = request.send() => result,
        };

        match result {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => Err(DriverError::Http {
                url: url.to_string(),
                status: response.status(),
            }),
            Err(source) => Err(DriverError::Connection {
                url: url.to_string(),
                source,
            }),
        }
    }
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), DriverError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(DriverError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

fn should_retry(err: &DriverError) -> bool {
    match err {
        DriverError::Http { status, .. } => should_retry_status(*status),
        DriverError::Connection { source, .. } => should_retry_error(source),
        _ => false,
    }
}

fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

#[cfg(test)]
mod test {
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use gallery_common::reqwest::{StatusCode, Url};
    use serde::Deserialize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::Fetcher;
    use crate::driver_config::{RetryConfig, ServerConfig};
    use crate::error::DriverError;

    #[derive(Debug, Deserialize)]
    struct Payload {
        value: u32,
    }

    fn fast_fetcher(base: &str, max_retries: u32) -> Fetcher {
        let config = ServerConfig::default()
            .with_base_url(base)
            .with_rate_limit(1000.0, 1000)
            .with_retry(RetryConfig {
                max_retries,
                min_backoff_ms: 5,
                max_backoff_ms: 20,
            });
        Fetcher::new(&config).unwrap()
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{p}", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn decodes_json_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"value": 7}"#))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fast_fetcher(&server.uri(), 3);
        let payload: Payload = fetcher
            .get_json(&url(&server, "/data.json"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(payload.value, 7);
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let server = MockServer::start().await;
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        Mock::given(method("GET"))
            .respond_with(move |_req: &wiremock::Request| -> ResponseTemplate {
                let current = attempts_clone.fetch_add(1, Ordering::SeqCst);
                if current < 2 {
                    ResponseTemplate::new(503)
                } else {
                    ResponseTemplate::new(200).set_body_string(r#"{"value": 1}"#)
                }
            })
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = fast_fetcher(&server.uri(), 3);
        let payload: Payload = fetcher
            .get_json(&url(&server, "/"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(payload.value, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fast_fetcher(&server.uri(), 3);
        let err = fetcher
            .get_json::<Payload>(&url(&server, "/"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = fast_fetcher(&server.uri(), 2);
        let err = fetcher
            .get_json::<Payload>(&url(&server, "/"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn not_implemented_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(501))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fast_fetcher(&server.uri(), 3);
        let err = fetcher
            .get_json::<Payload>(&url(&server, "/"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::NOT_IMPLEMENTED));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fast_fetcher(&server.uri(), 3);
        let err = fetcher
            .get_json::<Payload>(&url(&server, "/"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DriverError::Decode { .. }), "{err:?}");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn schema_mismatch_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"value": "seven"}"#))
            .mount(&server)
            .await;

        let fetcher = fast_fetcher(&server.uri(), 3);
        let err = fetcher
            .get_json::<Payload>(&url(&server, "/"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DriverError::Decode { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn retries_on_network_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // release the port so that requests fail with ECONNREFUSED
        let base = format!("http://{addr}");

        let fetcher = fast_fetcher(&base, 1);
        let err = fetcher
            .get_json::<Payload>(
                &Url::parse(&format!("{base}/posts.json")).unwrap(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DriverError::Connection { .. }), "{err:?}");
        assert!(err.is_transient());
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn streams_body() {
        let server = MockServer::start().await;
        let body = vec![7u8; 64 * 1024];
        Mock::given(method("GET"))
            .and(path("/data/file.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fast_fetcher(&server.uri(), 0);
        let mut stream = fetcher
            .get_stream(&url(&server, "/data/file.png"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stream.content_length(), Some(body.len() as u64));
        assert_eq!(stream.extension().as_deref(), Some("png"));

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, body);
    }

    #[tokio::test]
    async fn cancelled_before_sending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let fetcher = fast_fetcher(&server.uri(), 0);
        let err = fetcher
            .get_json::<Payload>(&url(&server, "/"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, DriverError::Cancelled));
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;

        let config = ServerConfig::default()
            .with_base_url(&server.uri())
            .with_rate_limit(1000.0, 1000)
            .with_retry(RetryConfig {
                max_retries: 3,
                min_backoff_ms: 60_000,
                max_backoff_ms: 60_000,
            });
        let fetcher = Fetcher::new(&config).unwrap();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let start = std::time::Instant::now();
        let err = fetcher
            .get_json::<Payload>(&url(&server, "/"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, DriverError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    /// Reads one request off the socket, up to the end of its headers.
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    #[tokio::test]
    async fn slow_stream_outlives_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n")
                .await
                .unwrap();
            for byte in b"hello" {
                tokio::time::sleep(Duration::from_millis(400)).await;
                socket.write_all(&[*byte]).await.unwrap();
            }
        });

        let mut config = ServerConfig::default()
            .with_base_url(&base)
            .with_rate_limit(1000.0, 1000);
        config.timeout_secs = 1;
        let fetcher = Fetcher::new(&config).unwrap();

        let start = std::time::Instant::now();
        let mut stream = fetcher
            .get_stream(
                &Url::parse(&format!("{base}/data/slow.webm")).unwrap(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();

        assert_eq!(out, b"hello");
        assert!(start.elapsed() > config.timeout());
    }

    #[tokio::test]
    async fn retries_truncated_json_body() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;

                if hits_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                    // Promises 100 bytes, sends a few and hangs up
                    socket
                        .write_all(
                            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n{\"value\":",
                        )
                        .await
                        .unwrap();
                } else {
                    let body = r#"{"value": 3}"#;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    socket.write_all(response.as_bytes()).await.unwrap();
                }

                let _ = socket.shutdown().await;
            }
        });

        let fetcher = fast_fetcher(&base, 3);
        let payload: Payload = fetcher
            .get_json(
                &Url::parse(&format!("{base}/posts.json")).unwrap(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(payload.value, 3);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn json_requests_are_bounded_by_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"value": 1}"#)
                    .set_delay(Duration::from_secs(5)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut config = ServerConfig::default()
            .with_base_url(&server.uri())
            .with_rate_limit(1000.0, 1000)
            .with_retry(RetryConfig {
                max_retries: 0,
                min_backoff_ms: 5,
                max_backoff_ms: 20,
            });
        config.timeout_secs = 1;
        let fetcher = Fetcher::new(&config).unwrap();

        let start = std::time::Instant::now();
        let err = fetcher
            .get_json::<Payload>(&url(&server, "/"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(
            matches!(&err, DriverError::Connection { source, .. } if source.is_timeout()),
            "{err:?}"
        );
        assert!(err.is_transient());
        assert!(start.elapsed() < Duration::from_secs(4));
    }
}
