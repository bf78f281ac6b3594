//! Transfer value objects

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::paths::normalize_dir;
use super::sftp::HostKeyPolicy;
use crate::error::{TransferError, TransferResult};

// ============================================================================
// Transfer Defaults
// ============================================================================

/// Default FTP control port.
pub const FTP_DEFAULT_PORT: u16 = 21;

/// Default SSH port.
pub const SFTP_DEFAULT_PORT: u16 = 22;

/// Default connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;

/// Default socket read/write timeout in milliseconds.
pub const DEFAULT_SOCKET_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Ftp,
    Sftp,
}

impl Protocol {
    pub fn as_str(&self) -> &str {
        match self {
            Protocol::Ftp => "FTP",
            Protocol::Sftp => "SFTP",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Ftp => FTP_DEFAULT_PORT,
            Protocol::Sftp => SFTP_DEFAULT_PORT,
        }
    }
}

impl FromStr for Protocol {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ftp" => Ok(Protocol::Ftp),
            "sftp" => Ok(Protocol::Sftp),
            _ => Err(TransferError::UnsupportedProtocol(s.to_string())),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how to connect for one upload or listing
#[derive(Clone)]
pub struct TransferTarget {
    pub protocol: Protocol,
    pub host: String,
    /// `None` or `Some(0)` means the protocol default
    pub port: Option<u16>,
    pub username: String,
    pub password: Option<String>,
    /// Private key material (PEM/OpenSSH text), SFTP only
    pub private_key: Option<String>,
    pub passphrase: Option<String>,
    pub remote_directory: Option<String>,
    /// Overrides the local file's name on the server
    pub remote_file_name: Option<String>,
    pub create_directories: bool,
    pub overwrite: bool,
    /// FTP only
    pub ftp_passive_mode: bool,
    pub connect_timeout_ms: u64,
    pub socket_timeout_ms: u64,
    /// SFTP only: `SHA256:<base64>` or MD5 colon-hex
    pub host_key_fingerprint: Option<String>,
    /// SFTP only: accept whatever host key the server presents
    pub trust_unknown_host_keys: bool,
}

impl TransferTarget {
    pub fn new(protocol: Protocol, host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            protocol,
            host: host.into(),
            port: None,
            username: username.into(),
            password: None,
            private_key: None,
            passphrase: None,
            remote_directory: None,
            remote_file_name: None,
            create_directories: true,
            overwrite: true,
            ftp_passive_mode: true,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            socket_timeout_ms: DEFAULT_SOCKET_TIMEOUT_MS,
            host_key_fingerprint: None,
            trust_unknown_host_keys: false,
        }
    }

    pub fn effective_port(&self) -> u16 {
        match self.port {
            Some(port) if port > 0 => port,
            _ => self.protocol.default_port(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    /// Remote directory as `/a/b/`, or `None` when unset or blank
    pub fn normalized_directory(&self) -> Option<String> {
        non_blank(self.remote_directory.as_deref()).map(normalize_dir)
    }

    /// The override name if set, else the local file's base name
    pub fn remote_name_for(&self, local_file: &Path) -> String {
        match non_blank(self.remote_file_name.as_deref()) {
            Some(name) => name.to_string(),
            None => local_file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// Checks that need no network: a host, and for SFTP a well-formed host-key policy
    pub fn validate(&self) -> TransferResult<()> {
        if self.host.trim().is_empty() {
            return Err(TransferError::InvalidTarget("host is required".into()));
        }

        if self.protocol == Protocol::Sftp {
            HostKeyPolicy::for_target(self)?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for TransferTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferTarget")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.effective_port())
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("private_key", &self.private_key.as_ref().map(|_| "***"))
            .field("remote_directory", &self.remote_directory)
            .field("remote_file_name", &self.remote_file_name)
            .field("create_directories", &self.create_directories)
            .field("overwrite", &self.overwrite)
            .field("ftp_passive_mode", &self.ftp_passive_mode)
            .field("host_key_fingerprint", &self.host_key_fingerprint)
            .field("trust_unknown_host_keys", &self.trust_unknown_host_keys)
            .finish()
    }
}

/// Listing parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Start here instead of the target's remote directory
    pub directory: Option<String>,
    pub recursive: bool,
    /// `*` and `?` wildcards, matched against entry names; `None` matches all
    pub glob: Option<String>,
    pub include_directories: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFileInfo {
    pub path: String,
    pub is_directory: bool,
    /// Always `None` for directories
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub success: bool,
    pub protocol: Protocol,
    pub host: String,
    pub remote_path: String,
    pub bytes: u64,
    pub duration_ms: u64,
    /// Success detail or failure cause
    pub message: String,
}

impl UploadResult {
    pub(crate) fn succeeded(
        target: &TransferTarget,
        remote_path: String,
        bytes: u64,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: true,
            protocol: target.protocol,
            host: target.host.clone(),
            remote_path,
            bytes,
            duration_ms: elapsed.as_millis() as u64,
            message: format!("OK @ {}", Utc::now().to_rfc3339()),
        }
    }

    pub(crate) fn failed(
        target: &TransferTarget,
        remote_path: String,
        message: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: false,
            protocol: target.protocol,
            host: target.host.clone(),
            remote_path,
            bytes: 0,
            duration_ms: elapsed.as_millis() as u64,
            message,
        }
    }
}

impl std::fmt::Display for UploadResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success { "OK" } else { "FAILED" };
        write!(
            f,
            "{} {} {}:{} ({} bytes, {}ms) {}",
            status, self.protocol, self.host, self.remote_path, self.bytes, self.duration_ms, self.message
        )
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse() {
        assert_eq!("ftp".parse::<Protocol>().unwrap(), Protocol::Ftp);
        assert_eq!("SFTP".parse::<Protocol>().unwrap(), Protocol::Sftp);
        assert!(matches!(
            "scp".parse::<Protocol>(),
            Err(TransferError::UnsupportedProtocol(p)) if p == "scp"
        ));
    }

    #[test]
    fn test_target_defaults() {
        let target = TransferTarget::new(Protocol::Ftp, "edi.example.com", "partner");
        assert_eq!(target.effective_port(), 21);
        assert!(target.create_directories);
        assert!(target.overwrite);
        assert!(target.ftp_passive_mode);
        assert_eq!(target.connect_timeout(), Duration::from_millis(15_000));
        assert_eq!(target.socket_timeout(), Duration::from_millis(30_000));
        assert!(!target.trust_unknown_host_keys);
    }

    #[test]
    fn test_zero_port_uses_default() {
        let mut target = TransferTarget::new(Protocol::Sftp, "h", "u");
        target.port = Some(0);
        assert_eq!(target.effective_port(), 22);
        target.port = Some(2222);
        assert_eq!(target.effective_port(), 2222);
    }

    #[test]
    fn test_remote_name_override() {
        let mut target = TransferTarget::new(Protocol::Ftp, "h", "u");
        assert_eq!(target.remote_name_for(Path::new("/out/850.edi")), "850.edi");

        target.remote_file_name = Some("  ".into());
        assert_eq!(target.remote_name_for(Path::new("/out/850.edi")), "850.edi");

        target.remote_file_name = Some("PO_850.x12".into());
        assert_eq!(target.remote_name_for(Path::new("/out/850.edi")), "PO_850.x12");
    }

    #[test]
    fn test_sftp_requires_host_key_policy() {
        let mut target = TransferTarget::new(Protocol::Sftp, "h", "u");
        assert!(matches!(
            target.validate(),
            Err(TransferError::MissingHostKeyPolicy { .. })
        ));

        target.trust_unknown_host_keys = true;
        assert!(target.validate().is_ok());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let mut target = TransferTarget::new(Protocol::Ftp, "h", "u");
        target.password = Some("hunter2".into());
        assert!(!format!("{:?}", target).contains("hunter2"));
    }
}
