//! Protocol-neutral remote session
//!
//! [`TransferClient`](super::TransferClient) implements upload and listing
//! once against these traits. FTP and SFTP each provide a [`RemoteSession`];
//! tests provide an in-memory one.

use std::io::Read;

use chrono::{DateTime, Utc};

use super::ftp::FtpSession;
use super::sftp::SftpSession;
use super::types::{Protocol, TransferTarget};
use crate::error::TransferResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEntryKind {
    File,
    Directory,
    /// Symlinks, devices and anything else a listing skips
    Other,
}

/// One child of a remote directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: RemoteEntryKind,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
}

/// Result of checking for an existing remote file before an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Absent,
    Present,
}

/// An authenticated connection, scoped to a single client call
pub trait RemoteSession {
    /// Create `dir` (normalized, `/a/b/`) and any missing parents
    fn ensure_directory(&mut self, dir: &str) -> TransferResult<()>;

    /// Whether a regular file `name` already exists in `dir`
    fn probe(&mut self, dir: Option<&str>, name: &str) -> TransferResult<Probe>;

    /// Stream `reader` to `dir/name`, returning the bytes sent
    fn store(&mut self, dir: Option<&str>, name: &str, reader: &mut dyn Read) -> TransferResult<u64>;

    /// Immediate children of `dir`
    fn read_dir(&mut self, dir: &str) -> TransferResult<Vec<RemoteEntry>>;

    /// Best-effort logout; never fails
    fn close(&mut self);
}

/// Opens sessions for validated targets
pub trait SessionFactory: Send + Sync {
    fn open(&self, target: &TransferTarget) -> TransferResult<Box<dyn RemoteSession>>;
}

/// Real network sessions, picked by protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkSessions;

impl SessionFactory for NetworkSessions {
    fn open(&self, target: &TransferTarget) -> TransferResult<Box<dyn RemoteSession>> {
        match target.protocol {
            Protocol::Ftp => Ok(Box::new(FtpSession::connect(target)?)),
            Protocol::Sftp => Ok(Box::new(SftpSession::connect(target)?)),
        }
    }
}
