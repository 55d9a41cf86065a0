//! Asks the photo server to re-read metadata of files we modified.
//!
//! Every step (account, credential, asset lookup, refresh) can fail on its
//! own; failures are logged and counted, and never stop other files.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::CancellationToken;

/// Environment variable holding the server base URL.
pub const SERVER_URL_VAR: &str = "IMMICH_URL";
/// Prefix of the per-account API key variables: `IMMICH_API_KEY_<ACCOUNT>`.
pub const API_KEY_PREFIX: &str = "IMMICH_API_KEY_";

pub const DEFAULT_MIN_BATCH: usize = 10;
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no account directory below the media root for {0}")]
    NoAccount(PathBuf),
    #[error("no API key for account {account}")]
    MissingCredential { account: String },
    #[error("no asset named {filename} on the server")]
    NotFound { filename: String },
    #[error("search for {filename} failed with HTTP {status}")]
    SearchFailed { filename: String, status: u16 },
    #[error("refresh of asset {asset_id} rejected with HTTP {status}")]
    Rejected { asset_id: String, status: u16 },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Remote asset index.
pub trait AssetService: Send + Sync {
    /// Asset id of the file called `filename`, if the server knows it.
    fn find_asset(&self, api_key: &str, filename: &str) -> Result<Option<String>, NotifyError>;
    /// Queue a metadata refresh job for the asset.
    fn refresh(&self, api_key: &str, asset_id: &str) -> Result<(), NotifyError>;
}

/// Source of per-account API keys.
pub trait CredentialSource: Send + Sync {
    fn api_key(&self, account: &str) -> Option<String>;
}

/// Reads `IMMICH_API_KEY_<ACCOUNT>` from the environment.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn api_key(&self, account: &str) -> Option<String> {
        std::env::var(format!("{}{}", API_KEY_PREFIX, account))
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

impl CredentialSource for HashMap<String, String> {
    fn api_key(&self, account: &str) -> Option<String> {
        self.get(account).cloned()
    }
}

/// How a modified file maps to a server account.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountMapping {
    /// The directory directly below the media root names the account
    /// (`<root>/alice/...` -> `ALICE`).
    #[default]
    PathSegment,
    /// Every file belongs to one account.
    Fixed(String),
}

impl AccountMapping {
    pub fn account_for(&self, root: &Path, path: &Path) -> Option<String> {
        match self {
            AccountMapping::Fixed(name) => Some(normalize_account(name)),
            AccountMapping::PathSegment => {
                let rel = path.strip_prefix(root).ok()?;
                let mut components = rel.components();
                let first = components.next()?;
                // The file itself is not an account directory.
                components.next()?;
                match first {
                    Component::Normal(seg) => Some(normalize_account(&seg.to_string_lossy())),
                    _ => None,
                }
            }
        }
    }
}

/// Uppercase and replace anything outside `[A-Z0-9]` so the name is usable
/// inside an environment variable.
pub fn normalize_account(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Notifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    pub server_url: Option<String>,
    #[serde(default)]
    pub mapping: AccountMapping,
    /// The phase runs only with more modified files than this
    #[serde(default = "default_min_batch")]
    pub min_batch: usize,
    /// Pause before the first request
    #[serde(default = "default_settle")]
    pub settle: Duration,
}

fn default_min_batch() -> usize {
    DEFAULT_MIN_BATCH
}

fn default_settle() -> Duration {
    DEFAULT_SETTLE
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            mapping: AccountMapping::default(),
            min_batch: DEFAULT_MIN_BATCH,
            settle: DEFAULT_SETTLE,
        }
    }
}

impl NotifierConfig {
    pub fn from_env() -> Self {
        Self {
            server_url: std::env::var(SERVER_URL_VAR)
                .ok()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            ..Self::default()
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    original_file_name: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    assets: AssetPage,
}

#[derive(Debug, Deserialize)]
struct AssetPage {
    #[serde(default)]
    items: Vec<AssetItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetItem {
    id: String,
    #[serde(default)]
    original_file_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobRequest<'a> {
    asset_ids: [&'a str; 1],
    name: &'static str,
}

/// Prefer the exact filename among search hits, else the first hit.
pub fn pick_asset(response: SearchResponse, filename: &str) -> Option<String> {
    let items = response.assets.items;
    let exact = items
        .iter()
        .position(|i| i.original_file_name.as_deref() == Some(filename));
    let idx = exact.or(if items.is_empty() { None } else { Some(0) })?;
    items.into_iter().nth(idx).map(|i| i.id)
}

/// [`AssetService`] for the Immich HTTP API.
#[derive(Debug, Clone)]
pub struct ImmichClient {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl ImmichClient {
    pub fn new(base_url: &str) -> Result<Self, NotifyError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

impl AssetService for ImmichClient {
    fn find_asset(&self, api_key: &str, filename: &str) -> Result<Option<String>, NotifyError> {
        let resp = self
            .http
            .post(format!("{}/api/search/metadata", self.base_url))
            .header("x-api-key", api_key)
            .json(&SearchRequest {
                original_file_name: filename,
            })
            .send()?;
        if !resp.status().is_success() {
            return Err(NotifyError::SearchFailed {
                filename: filename.to_string(),
                status: resp.status().as_u16(),
            });
        }
        let body: SearchResponse = resp.json()?;
        Ok(pick_asset(body, filename))
    }

    fn refresh(&self, api_key: &str, asset_id: &str) -> Result<(), NotifyError> {
        let resp = self
            .http
            .post(format!("{}/api/assets/jobs", self.base_url))
            .header("x-api-key", api_key)
            .json(&JobRequest {
                asset_ids: [asset_id],
                name: "refresh-metadata",
            })
            .send()?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                asset_id: asset_id.to_string(),
                status: resp.status().as_u16(),
            })
        }
    }
}

/// Per-run notification counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyReport {
    pub refreshed: u64,
    pub missing_credential: u64,
    pub not_found: u64,
    pub failed: u64,
}

pub struct RefreshNotifier {
    service: Box<dyn AssetService>,
    credentials: Box<dyn CredentialSource>,
    mapping: AccountMapping,
    min_batch: usize,
    settle: Duration,
}

impl RefreshNotifier {
    pub fn new(service: Box<dyn AssetService>, credentials: Box<dyn CredentialSource>) -> Self {
        Self {
            service,
            credentials,
            mapping: AccountMapping::default(),
            min_batch: DEFAULT_MIN_BATCH,
            settle: DEFAULT_SETTLE,
        }
    }

    /// Immich client plus environment credentials, or None without a URL.
    pub fn from_config(config: &NotifierConfig) -> Result<Option<Self>, NotifyError> {
        let Some(url) = &config.server_url else {
            return Ok(None);
        };
        let client = ImmichClient::new(url)?;
        Ok(Some(
            Self::new(Box::new(client), Box::new(EnvCredentials))
                .with_mapping(config.mapping.clone())
                .with_min_batch(config.min_batch)
                .with_settle(config.settle),
        ))
    }

    pub fn with_mapping(mut self, mapping: AccountMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn with_min_batch(mut self, min_batch: usize) -> Self {
        self.min_batch = min_batch;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Whether a run with `modified` changed files is worth notifying.
    pub fn should_run(&self, modified: usize) -> bool {
        modified > self.min_batch
    }

    /// Wait for the server to settle, then notify every target.
    pub fn run(&self, root: &Path, targets: &[PathBuf], token: &CancellationToken) -> NotifyReport {
        if !self.settle.is_zero() {
            log::info!("Waiting {}s before notifying the server", self.settle.as_secs());
            std::thread::sleep(self.settle);
        }
        self.notify(root, targets, token)
    }

    pub fn notify(&self, root: &Path, targets: &[PathBuf], token: &CancellationToken) -> NotifyReport {
        let mut report = NotifyReport::default();
        for path in targets {
            if token.is_cancelled() {
                log::warn!("Cancelled, {} refreshes not sent", targets.len() as u64 - report.total());
                break;
            }
            match self.notify_one(root, path) {
                Ok(asset_id) => {
                    log::debug!("Refresh queued for {} ({})", path.display(), asset_id);
                    report.refreshed += 1;
                }
                Err(e) => {
                    log::warn!("{}: {}", path.display(), e);
                    match e {
                        NotifyError::NoAccount(_) | NotifyError::MissingCredential { .. } => {
                            report.missing_credential += 1
                        }
                        NotifyError::NotFound { .. } => report.not_found += 1,
                        _ => report.failed += 1,
                    }
                }
            }
        }
        log::info!(
            "Refresh: {} queued, {} without credential, {} not found, {} failed",
            report.refreshed,
            report.missing_credential,
            report.not_found,
            report.failed
        );
        report
    }

    fn notify_one(&self, root: &Path, path: &Path) -> Result<String, NotifyError> {
        let account = self
            .mapping
            .account_for(root, path)
            .ok_or_else(|| NotifyError::NoAccount(path.to_path_buf()))?;
        let api_key = self
            .credentials
            .api_key(&account)
            .ok_or(NotifyError::MissingCredential { account })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let asset_id = self
            .service
            .find_asset(&api_key, &filename)?
            .ok_or(NotifyError::NotFound { filename })?;
        self.service.refresh(&api_key, &asset_id)?;
        Ok(asset_id)
    }
}

impl NotifyReport {
    pub fn total(&self) -> u64 {
        self.refreshed + self.missing_credential + self.not_found + self.failed
    }
}
