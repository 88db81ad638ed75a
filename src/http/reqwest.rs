use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder};

use crate::error::LLMError;

use super::{DynHttpTransport, HttpMethod, HttpRequest, HttpResponse, HttpTransport};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`HttpTransport`] over a shared `reqwest::Client`.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Wraps a caller-configured client, for example one with a proxy.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client identifying itself as this crate, with a bounded connect phase.
    pub fn default_client() -> Result<Self, LLMError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("kotoba-adapter/", env!("CARGO_PKG_VERSION"))),
        );
        Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map(Self::new)
            .map_err(|err| LLMError::transport(format!("failed to create HTTP client: {err}")))
    }

    fn build_request(&self, request: HttpRequest) -> Result<RequestBuilder, LLMError> {
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };
        let mut builder = self
            .client
            .request(method, &request.url)
            .headers(header_map(request.headers)?);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        Ok(builder)
    }
}

fn header_map(headers: HashMap<String, String>) -> Result<HeaderMap, LLMError> {
    headers
        .into_iter()
        .map(|(name, value)| -> Result<(HeaderName, HeaderValue), LLMError> {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| LLMError::transport(format!("invalid header name {name:?}: {err}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|err| LLMError::transport(format!("invalid value for header {name}: {err}")))?;
            Ok((name, value))
        })
        .collect()
}

fn response_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

fn transport_error(err: reqwest::Error) -> LLMError {
    let kind = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_body() || err.is_decode() {
        "could not read response body"
    } else {
        "request failed"
    };
    LLMError::transport(format!("{kind}: {err}"))
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
        let url = request.url.clone();
        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let headers = response_headers(response.headers());
        let body = response.bytes().await.map_err(transport_error)?;
        tracing::trace!(%url, status, bytes = body.len(), "HTTP response received");

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

/// Builds the shared transport used when the adapter is not given one.
pub fn default_dyn_transport() -> Result<DynHttpTransport, LLMError> {
    Ok(Arc::new(ReqwestTransport::default_client()?))
}
