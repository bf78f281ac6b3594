//! FTP session on top of `suppaftp`
//!
//! Synchronous; the client runs it on a blocking thread.

use std::io::Read;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use suppaftp::list::File as ListEntry;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpResult, FtpStream, Mode, Status};
use tracing::{debug, info, warn};

use super::paths::directory_prefixes;
use super::session::{Probe, RemoteEntry, RemoteEntryKind, RemoteSession};
use super::types::TransferTarget;
use crate::error::{TransferError, TransferResult};

pub struct FtpSession {
    stream: FtpStream,
}

impl FtpSession {
    /// Connect, log in and switch to binary mode
    pub fn connect(target: &TransferTarget) -> TransferResult<Self> {
        let port = target.effective_port();
        let addr = resolve(&target.host, port)?;

        info!("Connecting (FTP) to {}:{}", target.host, port);
        let mut stream = FtpStream::connect_timeout(addr, target.connect_timeout())
            .map_err(|e| TransferError::Connection(e.to_string()))?;

        let socket = stream.get_ref();
        socket.set_read_timeout(Some(target.socket_timeout()))?;
        socket.set_write_timeout(Some(target.socket_timeout()))?;

        debug!("Logging in as: {}", target.username);
        let password = target.password.as_deref().unwrap_or_default();
        if let Err(e) = stream.login(target.username.as_str(), password) {
            let _ = stream.quit();
            return Err(TransferError::Authentication(format!(
                "FTP login failed for user {}: {}",
                target.username, e
            )));
        }

        stream.set_mode(if target.ftp_passive_mode {
            Mode::Passive
        } else {
            Mode::Active
        });

        if let Err(e) = stream.transfer_type(FileType::Binary) {
            let _ = stream.quit();
            return Err(TransferError::Protocol(format!("Failed to set binary mode: {}", e)));
        }

        Ok(Self { stream })
    }

    fn change_dir(&mut self, dir: Option<&str>) -> TransferResult<()> {
        if let Some(dir) = dir {
            self.stream
                .cwd(dir)
                .map_err(|e| TransferError::Protocol(format!("Could not change directory to {}: {}", dir, e)))?;
        }
        Ok(())
    }
}

impl RemoteSession for FtpSession {
    fn ensure_directory(&mut self, dir: &str) -> TransferResult<()> {
        for prefix in directory_prefixes(dir) {
            if self.stream.cwd(&prefix).is_err() {
                debug!("Creating FTP directory {}", prefix);
                self.stream.mkdir(&prefix).map_err(|e| {
                    TransferError::Protocol(format!("Failed to create FTP directory {}: {}", prefix, e))
                })?;
            }
        }
        Ok(())
    }

    fn probe(&mut self, dir: Option<&str>, name: &str) -> TransferResult<Probe> {
        self.change_dir(dir)?;

        probe_outcome(self.stream.list(Some(name)), name)
    }

    fn store(&mut self, dir: Option<&str>, name: &str, mut reader: &mut dyn Read) -> TransferResult<u64> {
        self.change_dir(dir)?;

        self.stream
            .put_file(name, &mut reader)
            .map_err(|e| TransferError::Protocol(format!("FTP STOR {} failed: {}", name, e)))
    }

    fn read_dir(&mut self, dir: &str) -> TransferResult<Vec<RemoteEntry>> {
        let lines = self
            .stream
            .list(Some(dir))
            .map_err(|e| TransferError::Protocol(format!("Failed to list directory {}: {}", dir, e)))?;

        Ok(lines.iter().filter_map(|line| parse_list_line(line)).collect())
    }

    fn close(&mut self) {
        if let Err(e) = self.stream.quit() {
            warn!("Failed to quit FTP session gracefully: {}", e);
        }
    }
}

fn resolve(host: &str, port: u16) -> TransferResult<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| TransferError::Connection(format!("Cannot resolve {}:{}: {}", host, port, e)))?
        .next()
        .ok_or_else(|| TransferError::Connection(format!("No address for {}:{}", host, port)))
}

/// Interpret the reply to `LIST <name>`
fn probe_outcome(reply: FtpResult<Vec<String>>, name: &str) -> TransferResult<Probe> {
    match reply {
        Ok(lines) => {
            let exists = lines
                .iter()
                .filter_map(|line| ListEntry::from_str(line).ok())
                .any(|entry| entry.is_file());
            Ok(if exists { Probe::Present } else { Probe::Absent })
        },
        // servers answer 450/550 for a name that does not exist
        Err(FtpError::UnexpectedResponse(response))
            if matches!(
                response.status,
                Status::RequestFileActionIgnored | Status::FileUnavailable
            ) =>
        {
            debug!("LIST {} was refused ({}), treating as absent", name, response.status);
            Ok(Probe::Absent)
        },
        Err(e) => Err(TransferError::Protocol(format!("LIST {} failed: {}", name, e))),
    }
}

/// Parse one LIST line (UNIX or DOS style)
fn parse_list_line(line: &str) -> Option<RemoteEntry> {
    let entry = match ListEntry::from_str(line) {
        Ok(entry) => entry,
        Err(_) => {
            debug!("Skipping unparseable LIST line: {}", line);
            return None;
        },
    };

    let kind = if entry.is_directory() {
        RemoteEntryKind::Directory
    } else if entry.is_file() {
        RemoteEntryKind::File
    } else {
        RemoteEntryKind::Other
    };

    let modified: DateTime<Utc> = entry.modified().into();

    Some(RemoteEntry {
        name: entry.name().to_string(),
        kind,
        size: (kind == RemoteEntryKind::File).then_some(entry.size() as u64),
        modified: Some(modified),
    })
}
