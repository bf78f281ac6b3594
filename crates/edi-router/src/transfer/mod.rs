//! FTP and SFTP transfers
//!
//! One upload/list contract over two wire protocols. Protocol specifics live
//! behind the [`RemoteSession`] seam; [`TransferClient`] owns the shared
//! rules (name resolution, directory creation, overwrite checks, listing
//! walk and glob filtering).

pub mod client;
pub mod ftp;
pub mod glob;
pub mod paths;
pub mod session;
pub mod sftp;
pub mod types;

pub use client::TransferClient;
pub use glob::GlobPattern;
pub use session::{
    NetworkSessions, Probe, RemoteEntry, RemoteEntryKind, RemoteSession, SessionFactory,
};
pub use sftp::{HostKeyFingerprint, HostKeyPolicy};
pub use types::{ListOptions, Protocol, RemoteFileInfo, TransferTarget, UploadResult};
