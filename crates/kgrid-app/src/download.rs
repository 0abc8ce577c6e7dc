//! Release tarball download and binary extraction.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

/// `os_arch` suffix used by the replicatedhq release assets.
pub fn release_platform() -> String {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };
    format!("{}_{arch}", std::env::consts::OS)
}

/// GET `url` and return the body, failing on any non-200 status.
pub async fn fetch(
    http: &reqwest::Client,
    url: &str,
    basic_auth: Option<(&str, &str)>,
) -> AppResult<Vec<u8>> {
    let mut request = http.get(url);
    if let Some((user, password)) = basic_auth {
        request = request.basic_auth(user, Some(password));
    }
    let response = request.send().await.map_err(|source| AppError::Http {
        url: url.to_string(),
        source,
    })?;
    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(AppError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let body = response.bytes().await.map_err(|source| AppError::Http {
        url: url.to_string(),
        source,
    })?;
    Ok(body.to_vec())
}

/// Pull the entry called `name` out of a gzipped tarball into `dest_dir`
/// and mark it executable.
pub fn extract_binary(archive: &[u8], name: &str, dest_dir: &Path) -> AppResult<PathBuf> {
    let mut tarball = tar::Archive::new(GzDecoder::new(archive));
    for entry in tarball.entries().map_err(AppError::Archive)? {
        let mut entry = entry.map_err(AppError::Archive)?;
        let path = entry.path().map_err(AppError::Archive)?.into_owned();
        if path.file_name().and_then(|f| f.to_str()) != Some(name) {
            continue;
        }
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut contents).map_err(AppError::Archive)?;
        let dest = dest_dir.join(name);
        std::fs::write(&dest, contents).map_err(|source| AppError::TempFile {
            what: "binary",
            source,
        })?;
        make_executable(&dest)?;
        return Ok(dest);
    }
    Err(AppError::BinaryNotFound(name.to_string()))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> AppResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|source| {
        AppError::TempFile {
            what: "binary permissions",
            source,
        }
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> AppResult<()> {
    Ok(())
}

/// Downloaded binaries keyed by release URL, kept under one scratch directory.
///
/// Concurrent callers for the same URL wait on the lock rather than
/// downloading the same release twice.
pub struct BinaryCache {
    http: reqwest::Client,
    dir: tempfile::TempDir,
    binaries: Mutex<HashMap<String, PathBuf>>,
}

impl BinaryCache {
    pub fn new(http: reqwest::Client) -> AppResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("kgrid-bin-")
            .tempdir()
            .map_err(|source| AppError::TempFile {
                what: "binary directory",
                source,
            })?;
        Ok(Self {
            http,
            dir,
            binaries: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Path to `name` from the release at `url`, downloading it on first use.
    pub async fn get(&self, url: &str, name: &str) -> AppResult<PathBuf> {
        let mut binaries = self.binaries.lock().await;
        if let Some(path) = binaries.get(url) {
            debug!(%url, path = %path.display(), "using cached binary");
            return Ok(path.clone());
        }

        info!(%url, "downloading {name}");
        let archive = fetch(&self.http, url, None).await?;
        // One directory per release so two versions of the same binary never collide.
        let release_dir = self.dir.path().join(binaries.len().to_string());
        std::fs::create_dir_all(&release_dir).map_err(|source| AppError::TempFile {
            what: "binary directory",
            source,
        })?;
        let path = extract_binary(&archive, name, &release_dir)?;
        binaries.insert(url.to_string(), path.clone());
        Ok(path)
    }
}
