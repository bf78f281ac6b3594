//! Protocol-agnostic upload and listing
//!
//! # Examples
//!
//! ```rust,ignore
//! use edi_router::transfer::{Protocol, TransferClient, TransferTarget};
//!
//! let mut target = TransferTarget::new(Protocol::Sftp, "sftp.partner.example", "acme");
//! target.password = Some("secret".into());
//! target.remote_directory = Some("/inbound".into());
//! target.host_key_fingerprint = Some("SHA256:nThbg6kXUpJWGl7E1IGOCspRomTxdCARLviKw6E5SY8".into());
//!
//! let result = TransferClient::new().upload(Path::new("archive/850.edi"), &target).await;
//! println!("{}", result);
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use super::glob::GlobPattern;
use super::paths::{compose_remote_path, join_remote, normalize_dir};
use super::session::{NetworkSessions, Probe, RemoteEntryKind, RemoteSession, SessionFactory};
use super::types::{non_blank, ListOptions, RemoteFileInfo, TransferTarget, UploadResult};
use crate::error::{TransferError, TransferResult};

/// Uploads files and lists remote directories over FTP or SFTP.
///
/// Every call opens its own session and closes it before returning, on
/// success and failure alike.
#[derive(Clone)]
pub struct TransferClient {
    factory: Arc<dyn SessionFactory>,
}

impl Default for TransferClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferClient {
    /// Client that talks to real servers
    pub fn new() -> Self {
        Self::with_factory(Arc::new(NetworkSessions))
    }

    pub fn with_factory(factory: Arc<dyn SessionFactory>) -> Self {
        Self { factory }
    }

    /// Upload `local_file` to `target`.
    ///
    /// Never fails: connection, authentication and protocol errors come
    /// back as an unsuccessful [`UploadResult`] carrying the cause.
    pub async fn upload(&self, local_file: &Path, target: &TransferTarget) -> UploadResult {
        let started = Instant::now();
        let client = self.clone();
        let local: PathBuf = local_file.to_path_buf();
        let owned_target = target.clone();

        match tokio::task::spawn_blocking(move || client.upload_blocking(&local, &owned_target)).await {
            Ok(result) => result,
            Err(e) => {
                let remote_path = compose_remote_path(
                    target.remote_directory.as_deref(),
                    &target.remote_name_for(local_file),
                );
                UploadResult::failed(
                    target,
                    remote_path,
                    TransferError::TaskFailed(e.to_string()).to_string(),
                    started.elapsed(),
                )
            },
        }
    }

    /// Blocking form of [`upload`](Self::upload)
    pub fn upload_blocking(&self, local_file: &Path, target: &TransferTarget) -> UploadResult {
        let started = Instant::now();
        let remote_name = target.remote_name_for(local_file);
        let remote_path = compose_remote_path(target.remote_directory.as_deref(), &remote_name);

        match self.try_upload(local_file, target, &remote_name, &remote_path) {
            Ok(bytes) => {
                info!(
                    "Uploaded {} to {}://{}{} ({} bytes)",
                    local_file.display(),
                    target.protocol,
                    target.host,
                    remote_path,
                    bytes
                );
                UploadResult::succeeded(target, remote_path, bytes, started.elapsed())
            },
            Err(e) => {
                error!(
                    "Upload failed: file = {}, protocol = {}, host = {}, user = {}: {}",
                    local_file.display(),
                    target.protocol,
                    target.host,
                    target.username,
                    e
                );
                UploadResult::failed(target, remote_path, e.to_string(), started.elapsed())
            },
        }
    }

    fn try_upload(
        &self,
        local_file: &Path,
        target: &TransferTarget,
        remote_name: &str,
        remote_path: &str,
    ) -> TransferResult<u64> {
        target.validate()?;
        if remote_name.is_empty() {
            return Err(TransferError::InvalidTarget(format!(
                "no remote name for {}",
                local_file.display()
            )));
        }
        let mut source = File::open(local_file)?;

        let mut session = self.factory.open(target)?;
        let outcome = upload_over(session.as_mut(), target, remote_name, remote_path, &mut source);
        session.close();
        outcome
    }

    /// List `target`'s directory (or `options.directory`).
    ///
    /// Unlike uploads, failures are returned to the caller.
    pub async fn list(
        &self,
        target: &TransferTarget,
        options: &ListOptions,
    ) -> TransferResult<Vec<RemoteFileInfo>> {
        let client = self.clone();
        let target = target.clone();
        let options = options.clone();

        tokio::task::spawn_blocking(move || client.list_blocking(&target, &options))
            .await
            .map_err(|e| TransferError::TaskFailed(e.to_string()))?
    }

    /// Blocking form of [`list`](Self::list)
    pub fn list_blocking(
        &self,
        target: &TransferTarget,
        options: &ListOptions,
    ) -> TransferResult<Vec<RemoteFileInfo>> {
        target.validate()?;

        let glob = non_blank(options.glob.as_deref())
            .map(GlobPattern::new)
            .transpose()?;
        let root = normalize_dir(
            non_blank(options.directory.as_deref())
                .or_else(|| non_blank(target.remote_directory.as_deref()))
                .unwrap_or("/"),
        );

        let mut session = self.factory.open(target)?;
        let mut found = Vec::new();
        let outcome = walk(session.as_mut(), &root, options, glob.as_ref(), &mut found);
        session.close();
        outcome?;

        info!(
            "Listed {} entries under {}://{}{}",
            found.len(),
            target.protocol,
            target.host,
            root
        );
        Ok(found)
    }
}

fn upload_over(
    session: &mut dyn RemoteSession,
    target: &TransferTarget,
    remote_name: &str,
    remote_path: &str,
    source: &mut File,
) -> TransferResult<u64> {
    let dir = target.normalized_directory();

    if let Some(dir) = dir.as_deref() {
        if target.create_directories {
            session.ensure_directory(dir)?;
        }
    }

    if !target.overwrite && session.probe(dir.as_deref(), remote_name)? == Probe::Present {
        return Err(TransferError::RemoteExists(remote_path.to_string()));
    }

    debug!("Storing {}", remote_path);
    session.store(dir.as_deref(), remote_name, source)
}

/// Depth-first walk; `.` and `..` are never reported
fn walk(
    session: &mut dyn RemoteSession,
    dir: &str,
    options: &ListOptions,
    glob: Option<&GlobPattern>,
    found: &mut Vec<RemoteFileInfo>,
) -> TransferResult<()> {
    for entry in session.read_dir(dir)? {
        if entry.name == "." || entry.name == ".." {
            continue;
        }

        let path = join_remote(dir, &entry.name);
        let selected = glob.map_or(true, |g| g.is_match(&entry.name));

        match entry.kind {
            RemoteEntryKind::Directory => {
                if options.include_directories && selected {
                    found.push(RemoteFileInfo {
                        path: path.clone(),
                        is_directory: true,
                        size: None,
                        modified: entry.modified,
                    });
                }
                if options.recursive {
                    walk(session, &path, options, glob, found)?;
                }
            },
            RemoteEntryKind::File => {
                if selected {
                    found.push(RemoteFileInfo {
                        path,
                        is_directory: false,
                        size: entry.size,
                        modified: entry.modified,
                    });
                }
            },
            RemoteEntryKind::Other => {},
        }
    }
    Ok(())
}
