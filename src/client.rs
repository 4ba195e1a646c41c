use std::time::Duration;

use hyper::body::{self, Bytes};
use hyper::client::HttpConnector;
use hyper::{header, Body, Client, Request, Response, StatusCode};
use tokio::time;
use tracing::trace;

use crate::config::ServerAddr;
use crate::error::PollError;
use crate::types::{ModelEntry, RunningModels, UnloadRequest};

const RUNNING_MODELS_PATH: &str = "/api/ps";
const GENERATE_PATH: &str = "/api/generate";

/// HTTP access to the inference server API. One instance is shared by every iteration.
#[derive(Debug)]
pub struct InferenceClient {
    http: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl InferenceClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: Client::builder().build_http(),
            timeout,
        }
    }

    /// Models currently loaded on `server`, newest first as reported.
    pub async fn fetch_running_models(
        &self,
        server: &ServerAddr,
    ) -> Result<Vec<ModelEntry>, PollError> {
        let url = server.url(RUNNING_MODELS_PATH);
        let req = Request::get(&url)
            .body(Body::empty())
            .map_err(|source| PollError::Request {
                url: url.clone(),
                source,
            })?;

        let bytes = self.send(&url, req, true).await?;
        let parsed: RunningModels =
            serde_json::from_slice(&bytes).map_err(|source| PollError::Json {
                url: url.clone(),
                source,
            })?;
        Ok(parsed.into_entries())
    }

    /// Ask `server` to evict `model` immediately. The response body is not inspected.
    pub async fn unload_model(&self, server: &ServerAddr, model: &str) -> Result<(), PollError> {
        let url = server.url(GENERATE_PATH);
        let payload = serde_json::to_vec(&UnloadRequest::immediate(model)).map_err(|source| {
            PollError::Json {
                url: url.clone(),
                source,
            }
        })?;
        let req = Request::post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload))
            .map_err(|source| PollError::Request {
                url: url.clone(),
                source,
            })?;

        self.send(&url, req, false).await?;
        Ok(())
    }

    /// Send `req` under the configured timeout. The body is collected only when
    /// `read_body` is set.
    async fn send(
        &self,
        url: &str,
        req: Request<Body>,
        read_body: bool,
    ) -> Result<Bytes, PollError> {
        match time::timeout(self.timeout, self.exchange(req, read_body)).await {
            Ok(Ok((status, bytes))) => {
                trace!("{} -> HTTP {}", url, status);
                if status.is_success() {
                    Ok(bytes)
                } else {
                    Err(PollError::Status {
                        url: url.to_string(),
                        status,
                    })
                }
            }
            Ok(Err(source)) => Err(PollError::Transport {
                url: url.to_string(),
                source,
            }),
            Err(_) => Err(PollError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    async fn exchange(
        &self,
        req: Request<Body>,
        read_body: bool,
    ) -> Result<(StatusCode, Bytes), hyper::Error> {
        let resp: Response<Body> = self.http.request(req).await?;
        let status = resp.status();
        if !status.is_success() || !read_body {
            return Ok((status, Bytes::new()));
        }
        let bytes = body::to_bytes(resp.into_body()).await?;
        Ok((status, bytes))
    }
}
