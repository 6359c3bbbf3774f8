use std::time::Instant;

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, STREAM_OPENS,
    STREAM_UNAVAILABLE,
};
use crate::retry::{RequestOptions, retry_with_backoff};
use crate::stream::FragmentStream;
use crate::types::{
    Endpoint, ExecuteCodeParams, ExecuteCodeResponse, GenerateCodeParams, GenerateCodeResponse,
    HealthResponse,
};

/// Client for the code-generation and code-execution services.
///
/// One-shot calls go through [`Client::post_json`], which retries with linear backoff
/// and bounds every attempt by a deadline.  Streaming calls go through
/// [`Client::open_stream`], which makes exactly one attempt and has no deadline of its
/// own.
#[derive(Debug, Clone)]
pub struct Client {
    client: ReqwestClient,
    options: RequestOptions,
}

impl Client {
    /// Create a new client with default retry and timeout settings.
    pub fn new() -> Result<Self> {
        Self::with_options(RequestOptions::default())
    }

    /// Create a new client with custom retry and timeout settings.
    pub fn with_options(options: RequestOptions) -> Result<Self> {
        options.validate()?;
        // No client-wide timeout: it would also cut off long-running streams.
        let client = ReqwestClient::builder().build().map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {e}"),
                Some(Box::new(e)),
            )
        })?;
        Ok(Self { client, options })
    }

    /// Sets the number of retries for one-shot calls.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.options.retries = retries;
        self
    }

    /// Sets the per-attempt deadline for one-shot calls.
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Result<Self> {
        let options = self.options.with_timeout(timeout);
        options.validate()?;
        self.options = options;
        Ok(self)
    }

    /// The retry and timeout settings used by the endpoint helpers.
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Create and return default headers for API requests.
    fn default_headers(accept: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
        headers
    }

    /// POST `body` as JSON to `url` and parse the JSON response.
    ///
    /// Makes up to `options.retries + 1` attempts.  Each attempt is aborted once it
    /// runs past `options.timeout`.  A non-2xx status fails the attempt with the
    /// response body as the detail.  After failed attempt *k* the client waits
    /// `500ms * k` before trying again.  Only use this for requests that are safe to
    /// repeat.
    pub async fn post_json<B, T>(&self, url: &str, body: &B, options: &RequestOptions) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = Bytes::from(serde_json::to_vec(body)?);
        retry_with_backoff(options, |attempt| {
            self.attempt_json(Method::POST, url, Some(body.clone()), attempt)
        })
        .await
    }

    /// GET `url` and parse the JSON response, with the same retry policy as
    /// [`Client::post_json`].
    pub async fn get_json<T>(&self, url: &str, options: &RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
    {
        retry_with_backoff(options, |attempt| {
            self.attempt_json(Method::GET, url, None, attempt)
        })
        .await
    }

    async fn attempt_json<T>(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
        attempt: u32,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        tracing::debug!(%method, url, attempt, "sending request");
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let mut request = self
            .client
            .request(method, url)
            .headers(Self::default_headers("application/json"));
        if let Some(body) = body {
            request = request.body(body);
        }
        let result = async {
            let response = request.send().await.map_err(map_send_error)?;
            let response = Self::check_status(response).await?;
            response.json::<T>().await.map_err(|e| {
                Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
            })
        }
        .await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        if result.is_err() {
            CLIENT_REQUEST_ERRORS.click();
        }
        result
    }

    /// Turns a non-2xx response into an error carrying the body text.
    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Err(Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                ));
            }
        };
        Err(Error::api(status.as_u16(), body))
    }

    /// POST `body` as JSON to `url` and expose the response body as text fragments.
    ///
    /// Fails with [`Error::StreamUnavailable`] when the request cannot be sent, the
    /// status is not 2xx, or the response cannot carry a body.  There is no retry.
    pub async fn open_stream<B>(&self, url: &str, body: &B) -> Result<FragmentStream>
    where
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(body)?;
        tracing::debug!(url, "opening stream");
        STREAM_OPENS.click();
        let response = self
            .client
            .post(url)
            .headers(Self::default_headers("text/plain"))
            .body(body)
            .send()
            .await
            .map_err(|e| {
                STREAM_UNAVAILABLE.click();
                Error::stream_unavailable(format!("stream failed: {e}"), None)
            })?;

        let status = response.status();
        if !status.is_success() {
            STREAM_UNAVAILABLE.click();
            let detail = response.text().await.unwrap_or_default();
            let message = if detail.trim().is_empty() {
                "stream failed".to_string()
            } else {
                format!("stream failed: {}", detail.trim())
            };
            return Err(Error::stream_unavailable(message, Some(status.as_u16())));
        }
        if matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT) {
            STREAM_UNAVAILABLE.click();
            return Err(Error::stream_unavailable(
                "response has no body",
                Some(status.as_u16()),
            ));
        }

        Ok(FragmentStream::new(response.bytes_stream()))
    }

    /// Generate code in one shot.
    pub async fn generate_code(
        &self,
        model_base: &str,
        params: &GenerateCodeParams,
    ) -> Result<GenerateCodeResponse> {
        let url = Endpoint::GenerateCode.url(model_base)?;
        self.post_json(&url, params, &self.options).await
    }

    /// Generate code as a stream of fragments.
    pub async fn generate_code_stream(
        &self,
        model_base: &str,
        params: &GenerateCodeParams,
    ) -> Result<FragmentStream> {
        let url = Endpoint::GenerateCodeStream
            .url(model_base)
            .map_err(|e| Error::stream_unavailable(e.to_string(), None))?;
        self.open_stream(&url, params).await
    }

    /// Execute code in one shot.
    pub async fn execute_code(
        &self,
        exec_base: &str,
        params: &ExecuteCodeParams,
    ) -> Result<ExecuteCodeResponse> {
        let url = Endpoint::ExecuteCode.url(exec_base)?;
        self.post_json(&url, params, &self.options).await
    }

    /// Execute code and stream its output.
    pub async fn execute_code_stream(
        &self,
        exec_base: &str,
        params: &ExecuteCodeParams,
    ) -> Result<FragmentStream> {
        let url = Endpoint::ExecuteCodeStream
            .url(exec_base)
            .map_err(|e| Error::stream_unavailable(e.to_string(), None))?;
        self.open_stream(&url, params).await
    }

    /// Ask a service for its greeting.
    pub async fn health(&self, base: &str) -> Result<HealthResponse> {
        let url = Endpoint::Health.url(base)?;
        self.get_json(&url, &self.options).await
    }
}

fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(format!("Request timed out: {e}"), None)
    } else if e.is_connect() {
        Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
    } else {
        Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn client_creation() {
        let client = Client::new().unwrap();
        assert_eq!(client.options(), &RequestOptions::default());

        let client = Client::with_options(RequestOptions::new(3, Duration::from_secs(5)))
            .unwrap()
            .with_retries(0)
            .with_timeout(Duration::from_millis(250))
            .unwrap();
        assert_eq!(client.options().retries, 0);
        assert_eq!(client.options().timeout, Duration::from_millis(250));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(Client::with_options(RequestOptions::new(0, Duration::ZERO)).is_err());
        assert!(Client::new().unwrap().with_timeout(Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn unreachable_stream_is_unavailable() {
        let client = Client::new().unwrap();
        let err = client
            .generate_code_stream("not a base url", &GenerateCodeParams::new("p"))
            .await
            .unwrap_err();
        assert!(err.is_stream_unavailable());
    }
}
