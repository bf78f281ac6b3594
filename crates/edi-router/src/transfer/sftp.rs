//! SFTP session on top of `ssh2`
//!
//! Host keys are always checked against an explicit policy. Fingerprints
//! are accepted in OpenSSH form (`SHA256:<base64>`) or as MD5 colon-hex
//! (`MD5:aa:bb:..` or bare `aa:bb:..`).

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ssh2::{ErrorCode, HashType, Session, Sftp};
use tracing::{debug, info, warn};

use super::paths::{compose_remote_path, directory_prefixes};
use super::session::{Probe, RemoteEntry, RemoteEntryKind, RemoteSession};
use super::types::{non_blank, TransferTarget};
use crate::error::{TransferError, TransferResult};

/// SFTP status code for "no such file"
const SSH_FX_NO_SUCH_FILE: i32 = 2;

const MD5_LEN: usize = 16;

const SHA256_LEN: usize = 32;

/// A host-key fingerprint the server must present
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyFingerprint {
    /// Unpadded base64 of the SHA-256 digest
    Sha256(String),
    /// Lowercase colon-separated hex of the MD5 digest
    Md5(String),
}

impl HostKeyFingerprint {
    /// Render a raw digest the same way `from_str` normalizes input
    pub fn format_sha256(digest: &[u8]) -> String {
        format!("SHA256:{}", STANDARD_NO_PAD.encode(digest))
    }

    pub fn format_md5(digest: &[u8]) -> String {
        colon_hex(digest)
    }

    fn hash_type(&self) -> HashType {
        match self {
            HostKeyFingerprint::Sha256(_) => HashType::Sha256,
            HostKeyFingerprint::Md5(_) => HashType::Md5,
        }
    }

    fn matches(&self, digest: &[u8]) -> bool {
        match self {
            HostKeyFingerprint::Sha256(expected) => STANDARD_NO_PAD.encode(digest) == *expected,
            HostKeyFingerprint::Md5(expected) => colon_hex(digest) == *expected,
        }
    }

    fn render(&self, digest: &[u8]) -> String {
        match self {
            HostKeyFingerprint::Sha256(_) => Self::format_sha256(digest),
            HostKeyFingerprint::Md5(_) => format!("MD5:{}", Self::format_md5(digest)),
        }
    }
}

impl FromStr for HostKeyFingerprint {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        if let Some(encoded) = trimmed.strip_prefix("SHA256:") {
            let encoded = encoded.trim_end_matches('=');
            let digest = STANDARD_NO_PAD
                .decode(encoded)
                .map_err(|e| TransferError::InvalidTarget(format!("bad fingerprint '{}': {}", s, e)))?;
            if digest.len() != SHA256_LEN {
                return Err(TransferError::InvalidTarget(format!(
                    "bad fingerprint '{}': SHA256 digest must be {} bytes",
                    s, SHA256_LEN
                )));
            }
            return Ok(HostKeyFingerprint::Sha256(STANDARD_NO_PAD.encode(digest)));
        }

        let hex_part = trimmed
            .strip_prefix("MD5:")
            .or_else(|| trimmed.strip_prefix("md5:"))
            .unwrap_or(trimmed);
        let digest = hex::decode(hex_part.replace(':', ""))
            .map_err(|e| TransferError::InvalidTarget(format!("bad fingerprint '{}': {}", s, e)))?;
        if digest.len() != MD5_LEN {
            return Err(TransferError::InvalidTarget(format!(
                "bad fingerprint '{}': expected SHA256:<base64> or a 16 byte MD5",
                s
            )));
        }

        Ok(HostKeyFingerprint::Md5(colon_hex(&digest)))
    }
}

/// How an SFTP session decides whether to trust the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    Fingerprint(HostKeyFingerprint),
    TrustUnknown,
}

impl HostKeyPolicy {
    /// Policy configured on `target`; an explicit fingerprint wins over trust-unknown
    pub fn for_target(target: &TransferTarget) -> TransferResult<Self> {
        if let Some(fingerprint) = non_blank(target.host_key_fingerprint.as_deref()) {
            return Ok(HostKeyPolicy::Fingerprint(fingerprint.parse()?));
        }
        if target.trust_unknown_host_keys {
            return Ok(HostKeyPolicy::TrustUnknown);
        }
        Err(TransferError::MissingHostKeyPolicy {
            host: target.host.clone(),
        })
    }

    fn verify(&self, session: &Session, target: &TransferTarget) -> TransferResult<()> {
        match self {
            HostKeyPolicy::TrustUnknown => {
                warn!(
                    "SFTP: trusting any host key for {}:{}",
                    target.host,
                    target.effective_port()
                );
                Ok(())
            },
            HostKeyPolicy::Fingerprint(expected) => {
                let digest = session.host_key_hash(expected.hash_type()).ok_or_else(|| {
                    TransferError::Protocol("server host key hash unavailable".into())
                })?;
                if expected.matches(digest) {
                    debug!("Host key verified for {}", target.host);
                    Ok(())
                } else {
                    Err(TransferError::HostKeyMismatch {
                        expected: target.host_key_fingerprint.clone().unwrap_or_default(),
                        actual: expected.render(digest),
                    })
                }
            },
        }
    }
}

pub struct SftpSession {
    session: Session,
    sftp: Sftp,
}

impl SftpSession {
    /// Connect, verify the host key, authenticate and open the SFTP channel
    pub fn connect(target: &TransferTarget) -> TransferResult<Self> {
        let policy = HostKeyPolicy::for_target(target)?;
        let port = target.effective_port();

        info!("Connecting (SFTP) to {}:{}", target.host, port);
        let tcp = connect_tcp(&target.host, port, target)?;

        let mut session = Session::new().map_err(|e| TransferError::Connection(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(u32::try_from(target.socket_timeout_ms).unwrap_or(u32::MAX));
        session
            .handshake()
            .map_err(|e| TransferError::Connection(format!("SSH handshake failed: {}", e)))?;

        let outcome = policy
            .verify(&session, target)
            .and_then(|()| authenticate(&session, target))
            .and_then(|()| {
                session
                    .sftp()
                    .map_err(|e| TransferError::Protocol(format!("Cannot open SFTP channel: {}", e)))
            });

        match outcome {
            Ok(sftp) => Ok(Self { session, sftp }),
            Err(e) => {
                let _ = session.disconnect(None, "closing", None);
                Err(e)
            },
        }
    }

    fn stat_probe(&self, path: &Path) -> TransferResult<Probe> {
        match self.sftp.stat(path) {
            Ok(_) => Ok(Probe::Present),
            Err(e) if is_not_found(&e) => Ok(Probe::Absent),
            Err(e) => Err(TransferError::Protocol(format!(
                "Cannot stat {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

impl RemoteSession for SftpSession {
    fn ensure_directory(&mut self, dir: &str) -> TransferResult<()> {
        for prefix in directory_prefixes(dir) {
            let path = Path::new(&prefix);
            if self.stat_probe(path)? == Probe::Absent {
                debug!("Creating SFTP directory {}", prefix);
                self.sftp.mkdir(path, 0o755).map_err(|e| {
                    TransferError::Protocol(format!("Failed to create SFTP directory {}: {}", prefix, e))
                })?;
            }
        }
        Ok(())
    }

    fn probe(&mut self, dir: Option<&str>, name: &str) -> TransferResult<Probe> {
        let remote_path = compose_remote_path(dir, name);
        self.stat_probe(Path::new(&remote_path))
    }

    fn store(&mut self, dir: Option<&str>, name: &str, reader: &mut dyn Read) -> TransferResult<u64> {
        let remote_path = compose_remote_path(dir, name);
        let mut remote = self.sftp.create(Path::new(&remote_path)).map_err(|e| {
            TransferError::Protocol(format!("Cannot create {}: {}", remote_path, e))
        })?;

        let bytes = io::copy(reader, &mut remote)?;
        remote.flush()?;
        Ok(bytes)
    }

    fn read_dir(&mut self, dir: &str) -> TransferResult<Vec<RemoteEntry>> {
        let entries = self
            .sftp
            .readdir(Path::new(dir))
            .map_err(|e| TransferError::Protocol(format!("Failed to list directory {}: {}", dir, e)))?;

        Ok(entries
            .into_iter()
            .filter_map(|(path, stat)| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                let kind = if stat.is_dir() {
                    RemoteEntryKind::Directory
                } else if stat.is_file() {
                    RemoteEntryKind::File
                } else {
                    RemoteEntryKind::Other
                };
                let modified = stat
                    .mtime
                    .and_then(|secs| i64::try_from(secs).ok())
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

                Some(RemoteEntry {
                    name,
                    kind,
                    size: if kind == RemoteEntryKind::File { stat.size } else { None },
                    modified,
                })
            })
            .collect())
    }

    fn close(&mut self) {
        if let Err(e) = self.session.disconnect(None, "closing", None) {
            warn!("Failed to close SFTP session gracefully: {}", e);
        }
    }
}

fn connect_tcp(host: &str, port: u16, target: &TransferTarget) -> TransferResult<TcpStream> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| TransferError::Connection(format!("Cannot resolve {}:{}: {}", host, port, e)))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, target.connect_timeout()) {
            Ok(stream) => {
                stream.set_read_timeout(Some(target.socket_timeout()))?;
                stream.set_write_timeout(Some(target.socket_timeout()))?;
                return Ok(stream);
            },
            Err(e) => last_error = Some(e),
        }
    }

    Err(TransferError::Connection(match last_error {
        Some(e) => format!("Cannot connect to {}:{}: {}", host, port, e),
        None => format!("No address for {}:{}", host, port),
    }))
}

fn authenticate(session: &Session, target: &TransferTarget) -> TransferResult<()> {
    let result = match non_blank(target.private_key.as_deref()) {
        Some(key) => {
            debug!("Authenticating {} with private key", target.username);
            let passphrase = non_blank(target.passphrase.as_deref());
            session.userauth_pubkey_memory(&target.username, None, key, passphrase)
        },
        None => {
            debug!("Authenticating {} with password", target.username);
            session.userauth_password(
                &target.username,
                target.password.as_deref().unwrap_or_default(),
            )
        },
    };

    match result {
        Ok(()) if session.authenticated() => Ok(()),
        Ok(()) => Err(TransferError::Authentication(format!(
            "SFTP login failed for user {}",
            target.username
        ))),
        Err(e) => Err(TransferError::Authentication(format!(
            "SFTP login failed for user {}: {}",
            target.username, e
        ))),
    }
}

fn is_not_found(error: &ssh2::Error) -> bool {
    matches!(error.code(), ErrorCode::SFTP(SSH_FX_NO_SUCH_FILE))
}

fn colon_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| hex::encode([*b]))
        .collect::<Vec<_>>()
        .join(":")
}
