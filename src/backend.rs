//! Ports to the native side: the catalog source and the download backend.
//!
//! The backend owns transfers, hashing and extraction. It reports back by
//! pushing [`DownloadEvent`]s into the queue's inbound channel.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::package::{Catalog, RemoteMetadata};

pub const PKG_ENDPOINT: &str = "https://client.update.tamods.org/";
pub const PKG_CFG_FILE: &str = "packageconfig.yaml";

pub const PROGRESS_EVENT: &str = "download-progress";
pub const COMPLETED_EVENT: &str = "download-completed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Absolute bytes transferred so far for one package.
    Progress { package_id: String, transferred: u64 },
    /// Pushed once per successful download with the hash that was fetched.
    Completed { package_id: String, hash: String },
    /// The download request was rejected.
    Failed { package_id: String, message: String },
}

impl DownloadEvent {
    pub fn package_id(&self) -> &str {
        match self {
            DownloadEvent::Progress { package_id, .. }
            | DownloadEvent::Completed { package_id, .. }
            | DownloadEvent::Failed { package_id, .. } => package_id,
        }
    }

    /// Decode a host event. Payloads are `[packageId, bytes]` for progress and
    /// `[packageId, hash]` for completion.
    pub fn from_host(name: &str, payload: &Value) -> Option<Self> {
        match name {
            PROGRESS_EVENT => {
                let (package_id, transferred): (String, u64) =
                    serde_json::from_value(payload.clone()).ok()?;
                Some(DownloadEvent::Progress {
                    package_id,
                    transferred,
                })
            }
            COMPLETED_EVENT => {
                let (package_id, hash): (String, String) =
                    serde_json::from_value(payload.clone()).ok()?;
                Some(DownloadEvent::Completed { package_id, hash })
            }
            _ => None,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<DownloadEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<DownloadEvent>;

pub trait DownloadBackend: Send + Sync {
    /// Start a transfer. Resolves once the backend has accepted and finished
    /// the request; progress and completion arrive as events.
    fn request_download(
        &self,
        package_id: &str,
        object_key: &str,
        expected_hash: &str,
    ) -> BoxFuture<'static, Result<()>>;
}

pub trait CatalogSource: Send + Sync {
    fn fetch_catalog(&self) -> BoxFuture<'static, Result<Catalog>>;
}

/// Fetch the catalog, or log and return an empty one.
pub async fn load_catalog(source: &dyn CatalogSource) -> Catalog {
    match source.fetch_catalog().await {
        Ok(catalog) => {
            log::info!("catalog loaded: {} packages", catalog.len());
            catalog
        }
        Err(e) => {
            log::error!("failed to fetch package catalog: {e}");
            Catalog::default()
        }
    }
}

/// Reads `packageconfig.yaml` from the update endpoint, then HEADs every archive
/// for its current size, date and ETag.
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    client: reqwest::Client,
    endpoint: String,
}

impl Default for HttpCatalogSource {
    fn default() -> Self {
        Self::new(reqwest::Client::new(), PKG_ENDPOINT)
    }
}

impl HttpCatalogSource {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        let mut endpoint = endpoint.into();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl CatalogSource for HttpCatalogSource {
    fn fetch_catalog(&self) -> BoxFuture<'static, Result<Catalog>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        async move {
            let url = format!("{endpoint}{PKG_CFG_FILE}");
            log::info!("Fetching package list from {url}");
            let text = client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            let mut catalog = Catalog::from_yaml(&text)?;

            let keys: Vec<(String, String)> = catalog
                .iter()
                .filter(|p| !p.object_key.is_empty())
                .map(|p| (p.id.clone(), p.object_key.clone()))
                .collect();
            for (id, key) in keys {
                match fetch_metadata(&client, &format!("{endpoint}{key}")).await {
                    Ok(meta) => {
                        catalog.apply_metadata(&id, meta);
                    }
                    Err(e) => log::warn!("metadata for {id} unavailable: {e}"),
                }
            }
            Ok(catalog)
        }
        .boxed()
    }
}

async fn fetch_metadata(client: &reqwest::Client, url: &str) -> Result<RemoteMetadata> {
    let response = client.head(url).send().await?.error_for_status()?;
    let headers = response.headers();
    let header = |name: reqwest::header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    Ok(RemoteMetadata {
        size: header(reqwest::header::CONTENT_LENGTH).and_then(|s| s.parse::<u64>().ok()),
        last_modified: header(reqwest::header::LAST_MODIFIED),
        hash: header(reqwest::header::ETAG).map(|s| s.trim_matches('"').to_string()),
    })
}

/// Turn a rejected request into an event for the owner to handle.
pub(crate) fn failure_event(package_id: &str, err: &Error) -> DownloadEvent {
    let message = match err {
        Error::Backend { message, .. } => message.clone(),
        other => other.to_string(),
    };
    DownloadEvent::Failed {
        package_id: package_id.to_string(),
        message,
    }
}
