// src/remote/manifest.rs

//! Remote build manifest
//!
//! The update server answers with a JSON document of this shape:
//!
//! ```json
//! {
//!   "return_code": 0,
//!   "latest_build": {
//!     "pr": "12345",
//!     "windows": { "datetime": "2024-01-01 12:00", "download": "https://..." },
//!     "linux":   { "datetime": "2024-01-01 12:00", "download": "https://..." }
//!   }
//! }
//! ```
//!
//! Only the sub-object for the caller's platform is materialized.

use super::FetchError;
use super::client::UpdateClient;
use crate::config::UpdaterConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Return code: the server has no update information yet (not an error)
pub const NO_UPDATE_INFO: i64 = -1;

/// Return code: the server is in maintenance mode
pub const MAINTENANCE_MODE: i64 = -2;

/// Platform key inside `latest_build`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
    Mac,
}

impl Platform {
    /// Platform this binary was built for, if the server publishes builds for it
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "windows") {
            Some(Self::Windows)
        } else if cfg!(target_os = "linux") {
            Some(Self::Linux)
        } else if cfg!(target_os = "macos") {
            Some(Self::Mac)
        } else {
            None
        }
    }

    /// Manifest key for this platform
    pub fn key(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Mac => "mac",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Human-readable cause behind a manifest error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorCause {
    MaintenanceMode,
    Unknown,
}

impl fmt::Display for ServerErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaintenanceMode => write!(f, "Server Error - Maintenance Mode"),
            Self::Unknown => write!(f, "Server Error - Unknown Error"),
        }
    }
}

/// Latest build for the current platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    /// Pull request the build came from (may be empty)
    pub pull_request_label: String,
    /// Build timestamp as published by the server
    pub platform_datetime: String,
    /// Where to download the build
    pub download_url: String,
}

/// Anything that can produce the latest [`BuildInfo`]
pub trait ManifestSource: Send + Sync {
    fn fetch_build_info(&self) -> Result<BuildInfo, FetchError>;
}

/// Queries the update server's manifest endpoint
#[derive(Debug, Clone)]
pub struct ManifestClient {
    url: String,
    platform: Option<Platform>,
    connect_timeout: Duration,
    timeout: Duration,
}

impl ManifestClient {
    pub fn new(url: impl Into<String>, platform: Option<Platform>) -> Self {
        Self {
            url: url.into(),
            platform,
            connect_timeout: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &UpdaterConfig) -> Self {
        Self {
            url: config.manifest_url.clone(),
            platform: config.platform.or_else(Platform::current),
            connect_timeout: config.connect_timeout(),
            timeout: config.manifest_timeout(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ManifestSource for ManifestClient {
    fn fetch_build_info(&self) -> Result<BuildInfo, FetchError> {
        // Transport must be usable before anything goes on the wire
        let client = UpdateClient::new(self.connect_timeout, Some(self.timeout))?;

        let platform = self
            .platform
            .ok_or_else(|| FetchError::PlatformNotSupported(std::env::consts::OS.to_string()))?;

        info!("Fetching build info from {}", self.url);
        let body = client.fetch_bytes(&self.url)?;
        debug!("Manifest response: {} bytes", body.len());

        let build = parse_manifest(&body, platform)?;
        info!(
            "Latest build: PR {} ({})",
            build.pull_request_label, build.platform_datetime
        );
        Ok(build)
    }
}

#[derive(Deserialize)]
struct ManifestResponse {
    return_code: Option<i64>,
    #[serde(default)]
    latest_build: Option<Value>,
}

#[derive(Deserialize)]
struct PlatformBuild {
    #[serde(default)]
    datetime: String,
    #[serde(default)]
    download: String,
}

/// Map a manifest return code to success or a server error
fn check_return_code(code: i64) -> Result<(), FetchError> {
    let cause = match code {
        0 | NO_UPDATE_INFO => return Ok(()),
        MAINTENANCE_MODE => ServerErrorCause::MaintenanceMode,
        _ => ServerErrorCause::Unknown,
    };
    warn!("Update server returned code {}: {}", code, cause);
    Err(FetchError::Server { code, cause })
}

/// Parse a manifest body for one platform
pub fn parse_manifest(body: &[u8], platform: Platform) -> Result<BuildInfo, FetchError> {
    let response: ManifestResponse =
        serde_json::from_slice(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    check_return_code(response.return_code.ok_or(FetchError::MissingStatus)?)?;

    let latest = match response.latest_build {
        Some(Value::Object(map)) => map,
        _ => return Err(FetchError::NoBuildAvailable),
    };

    let pull_request_label = match latest.get("pr") {
        Some(Value::String(pr)) => pr.clone(),
        Some(Value::Number(pr)) => pr.to_string(),
        _ => String::new(),
    };

    let platform_value = match latest.get(platform.key()) {
        None | Some(Value::Null) => {
            return Err(FetchError::PlatformNotSupported(platform.to_string()));
        }
        Some(value) => value.clone(),
    };

    let build: PlatformBuild = serde_json::from_value(platform_value)
        .map_err(|e| FetchError::Malformed(format!("{platform} build: {e}")))?;

    if build.download.is_empty() {
        return Err(FetchError::Malformed(format!(
            "{platform} build has no download URL"
        )));
    }

    Ok(BuildInfo {
        pull_request_label,
        platform_datetime: build.datetime,
        download_url: build.download,
    })
}
