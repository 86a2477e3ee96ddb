// HTTP collaborators: catalog reads, segment warm-up and checkpoint writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use tracing::{debug, warn};

use super::history::WatchHistory;
use super::traits::{EpisodeKey, ProgressGateway, SegmentSource, SegmentSummary, VideoDescriptor};
use crate::config::EngineConfig;
use crate::engine::checkpoint::WatchCheckpoint;

/// Base URL plus a replaceable header set shared by the HTTP collaborators.
struct ApiClient {
    client: Client,
    base_url: Url,
    headers: Arc<RwLock<HashMap<String, String>>>,
}

impl ApiClient {
    fn new(base_url: &str, headers: HashMap<String, String>, timeout: Duration) -> Result<Self> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| anyhow!("invalid base url: {}", e))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            headers: Arc::new(RwLock::new(headers)),
        })
    }

    fn update_auth(&self, new_headers: HashMap<String, String>) {
        if !new_headers.is_empty() {
            *self.headers.write() = new_headers;
        }
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| anyhow!("invalid request path {}: {}", path, e))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let headers = self.headers.read().clone();
        let mut req = self.client.request(method, url);
        for (k, v) in &headers {
            req = req.header(k.as_str(), v.as_str());
        }
        req
    }
}

fn check_status(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        warn!("{} auth rejected status={}", what, status.as_u16());
        return Err(anyhow!("auth_rejected: HTTP {}", status.as_u16()));
    }
    if !status.is_success() {
        warn!("{} failed status={}", what, status.as_u16());
        return Err(anyhow!("{} failed: HTTP {}", what, status.as_u16()));
    }
    Ok(resp)
}

/// Catalog reads and segment warm-up over the REST API.
pub struct HttpCatalog {
    api: ApiClient,
}

impl HttpCatalog {
    pub fn new(
        base_url: &str,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(base_url, headers, timeout)?,
        })
    }

    pub fn from_config(
        base_url: &str,
        headers: HashMap<String, String>,
        config: &EngineConfig,
    ) -> Result<Self> {
        Self::new(base_url, headers, Duration::from_secs(config.request_timeout_secs))
    }

    /// Replace the request headers (e.g. after token refresh).
    pub fn update_auth(&self, new_headers: HashMap<String, String>) {
        self.api.update_auth(new_headers);
    }

    /// Resolve `segment_name` next to the manifest; relative manifests resolve against the base.
    pub fn segment_url(&self, manifest_url: &str, segment_name: &str) -> Result<Url> {
        let manifest = self
            .api
            .base_url
            .join(manifest_url)
            .map_err(|e| anyhow!("invalid manifest url {}: {}", manifest_url, e))?;
        manifest
            .join(segment_name)
            .map_err(|e| anyhow!("invalid segment name {}: {}", segment_name, e))
    }
}

#[async_trait]
impl SegmentSource for HttpCatalog {
    async fn get_video_for_episode(&self, key: EpisodeKey) -> Result<Option<VideoDescriptor>> {
        let url = self.api.url(&format!(
            "api/episodes/{}/{}/video",
            key.series_id, key.episode_number
        ))?;
        let resp = self.api.request(Method::GET, url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!("no video for series={} episode={}", key.series_id, key.episode_number);
            return Ok(None);
        }
        let resp = check_status(resp, "video lookup")?;
        Ok(Some(resp.json::<VideoDescriptor>().await?))
    }

    async fn get_segment_summary(&self, video_id: i64, limit: u32) -> Result<SegmentSummary> {
        let mut url = self.api.url(&format!("api/videos/{}/segments", video_id))?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        let resp = self.api.request(Method::GET, url).send().await?;
        let resp = check_status(resp, "segment summary")?;
        let mut summary = resp.json::<SegmentSummary>().await?;
        summary.initial_segment_names.truncate(limit as usize);
        Ok(summary)
    }

    async fn warm_segment(&self, manifest_url: &str, segment_name: &str) -> Result<()> {
        let url = self.segment_url(manifest_url, segment_name)?;
        let resp = self.api.request(Method::HEAD, url).send().await?;
        check_status(resp, "segment warm-up")?;
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveProgressBody {
    user_id: i64,
    video_id: i64,
    position: f64,
    duration: f64,
}

/// Writes checkpoints to the server; reads come from the local history cache.
pub struct HttpProgressGateway {
    api: ApiClient,
    history: Arc<WatchHistory>,
}

impl HttpProgressGateway {
    pub fn new(
        base_url: &str,
        headers: HashMap<String, String>,
        timeout: Duration,
        history: Arc<WatchHistory>,
    ) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(base_url, headers, timeout)?,
            history,
        })
    }

    pub fn from_config(
        base_url: &str,
        headers: HashMap<String, String>,
        config: &EngineConfig,
        history: Arc<WatchHistory>,
    ) -> Result<Self> {
        Self::new(
            base_url,
            headers,
            Duration::from_secs(config.request_timeout_secs),
            history,
        )
    }

    pub fn update_auth(&self, new_headers: HashMap<String, String>) {
        self.api.update_auth(new_headers);
    }
}

#[async_trait]
impl ProgressGateway for HttpProgressGateway {
    async fn save_checkpoint(&self, checkpoint: &WatchCheckpoint) -> Result<()> {
        let user_id = checkpoint
            .user_id
            .ok_or_else(|| anyhow!("checkpoint has no user"))?;
        let body = SaveProgressBody {
            user_id,
            video_id: checkpoint.video_id,
            position: checkpoint.position_seconds,
            duration: checkpoint.total_duration_seconds,
        };
        let url = self.api.url("api/progress")?;
        let resp = self
            .api
            .request(Method::POST, url)
            .json(&body)
            .send()
            .await?;
        check_status(resp, "checkpoint save")?;
        Ok(())
    }

    async fn last_checkpoint(&self, key: EpisodeKey) -> Result<Option<WatchCheckpoint>> {
        Ok(self.history.get(key))
    }
}
