// download.rs — Model file download with SHA256 cache verification.
//
// A local model name is either a directory that already holds the model files, or a
// Hugging Face repository id. Repository files are downloaded on first use and cached at
// ~/.cache/paper-rank/models/<owner>--<name>/. Each cached file gets a `.sha256` sidecar
// written at download time; a file that no longer matches its sidecar is fetched again.
// Optional files the repository lacks (HTTP 404) leave an empty `.absent` marker instead.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use sha2::{Digest, Sha256};

use crate::config;

/// Resolve `model_name` to a directory containing the model files, downloading if needed.
pub fn ensure_model_files(model_name: &str) -> anyhow::Result<PathBuf> {
    let local = Path::new(model_name);
    if local.is_dir() {
        log::info!("Using local model directory {}", local.display());
        return Ok(local.to_path_buf());
    }

    let dir = cache_dir_for(model_name)?;
    fs::create_dir_all(&dir).with_context(|| format!("failed to create model dir {}", dir.display()))?;

    for file in config::embedding::REQUIRED_MODEL_FILES {
        ensure_file(model_name, file, &dir.join(file))?;
    }

    // Only sentence-transformers repos ship a pooling config; plain BERT repos don't.
    let pooling = dir.join(config::embedding::POOLING_CONFIG_FILE);
    match ensure_optional_file(model_name, config::embedding::POOLING_CONFIG_FILE, &pooling) {
        Ok(true) => {}
        Ok(false) => log::info!("No pooling config for {}, using mean pooling", model_name),
        Err(e) => log::warn!("Could not fetch pooling config for {} ({:#}), using mean pooling", model_name, e),
    }

    Ok(dir)
}

/// Cache directory for a repository id.
pub fn cache_dir_for(repo_id: &str) -> anyhow::Result<PathBuf> {
    let home = crate::logging::home_dir()
        .context("cannot determine home directory (neither HOME nor USERPROFILE is set)")?;
    Ok(home.join(config::embedding::MODEL_CACHE_DIR_REL).join(cache_key(repo_id)))
}

/// `owner/name` → `owner--name`, so every repository is a single directory level.
fn cache_key(repo_id: &str) -> String {
    repo_id.trim_matches('/').replace('/', "--")
}

fn hub_url(repo_id: &str, file: &str) -> String {
    format!(
        "{}/{}/resolve/{}/{}",
        config::embedding::HUB_BASE_URL,
        repo_id.trim_matches('/'),
        config::embedding::HUB_REVISION,
        file
    )
}

fn ensure_file(repo_id: &str, file: &str, dest: &Path) -> anyhow::Result<()> {
    if cached_file_valid(dest)? {
        log::debug!("Cache hit for {}", dest.display());
        return Ok(());
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    download_and_record(&hub_url(repo_id, file), dest)
}

/// Like `ensure_file` for a file the repository may not have. Returns whether it is present.
fn ensure_optional_file(repo_id: &str, file: &str, dest: &Path) -> anyhow::Result<bool> {
    let marker = absent_marker_path(dest);
    if marker.exists() && !dest.exists() {
        log::debug!("{} known absent for {}", file, repo_id);
        return Ok(false);
    }

    match ensure_file(repo_id, file, dest) {
        Ok(()) => Ok(true),
        Err(e) if is_not_found(&e) => {
            write_atomic(&marker, b"")?;
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn is_not_found(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<ureq::Error>(), Some(ureq::Error::Status(404, _)))
}

fn absent_marker_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".absent");
    path.with_file_name(name)
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".sha256");
    path.with_file_name(name)
}

/// True when `path` exists and its content hash matches the recorded sidecar.
pub fn cached_file_valid(path: &Path) -> anyhow::Result<bool> {
    let sidecar = sidecar_path(path);
    if !path.exists() || !sidecar.exists() {
        return Ok(false);
    }

    let expected = fs::read_to_string(&sidecar).with_context(|| format!("read {}", sidecar.display()))?;
    let body = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let actual = sha256_hex(&body);

    if actual != expected.trim() {
        log::warn!(
            "Cached {} is corrupt (expected {}, got {}), re-downloading",
            path.display(),
            expected.trim(),
            actual
        );
        return Ok(false);
    }
    Ok(true)
}

/// Download a file, write it atomically, and record its SHA256 sidecar.
fn download_and_record(url: &str, dest: &Path) -> anyhow::Result<()> {
    let filename = dest.file_name().unwrap_or_default().to_string_lossy();
    log::info!("Downloading {} from {}", filename, url);

    let resp = ureq::get(url)
        .timeout(std::time::Duration::from_secs(config::embedding::DOWNLOAD_TIMEOUT_SECS))
        .call()
        .with_context(|| format!("failed to download {url}"))?;

    let status = resp.status();
    if status != 200 {
        bail!("HTTP {status} downloading {url}");
    }

    let mut body = Vec::new();
    resp.into_reader()
        .read_to_end(&mut body)
        .with_context(|| format!("failed to read response body for {url}"))?;

    let hash = sha256_hex(&body);
    write_atomic(dest, &body)?;
    write_atomic(&sidecar_path(dest), hash.as_bytes())?;

    log::info!("Cached {} ({} bytes, sha256 {})", filename, body.len(), &hash[..12]);
    Ok(())
}

// Write to .tmp, then rename.
fn write_atomic(dest: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let tmp_path = dest.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path).with_context(|| format!("failed to create {}", tmp_path.display()))?;
    file.write_all(bytes)?;
    file.flush()?;
    drop(file);

    fs::rename(&tmp_path, dest)
        .with_context(|| format!("failed to rename {} -> {}", tmp_path.display(), dest.display()))?;
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
