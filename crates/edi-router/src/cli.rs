//! Command-line interface definitions

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::transfer::types::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_SOCKET_TIMEOUT_MS};
use crate::transfer::{ListOptions, Protocol, TransferTarget};

/// EDI Router - drop-folder ingestion and FTP/SFTP delivery for X12 files
#[derive(Parser, Debug)]
#[command(name = "edi-router")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the incoming directory and route files until interrupted
    Watch {
        /// Base directory holding incoming/processing/archive/errors
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },

    /// Parse a local X12 file and print its envelope hierarchy
    Parse {
        /// File to parse
        file: PathBuf,

        /// Print the full hierarchy as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upload a local file to an FTP or SFTP server
    Upload {
        /// File to upload
        file: PathBuf,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// List files on an FTP or SFTP server
    List {
        #[command(flatten)]
        target: TargetArgs,

        /// Directory to list (defaults to --remote-dir, then /)
        #[arg(long)]
        dir: Option<String>,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Only report names matching this pattern (* and ? wildcards)
        #[arg(short, long)]
        glob: Option<String>,

        /// Report matching directories as well as files
        #[arg(long)]
        include_dirs: bool,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Connection settings shared by `upload` and `list`
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// ftp or sftp
    #[arg(long, default_value = "ftp")]
    pub protocol: Protocol,

    /// Server host name
    #[arg(long)]
    pub host: String,

    /// Server port (defaults to 21 for FTP, 22 for SFTP)
    #[arg(long)]
    pub port: Option<u16>,

    /// Login user
    #[arg(short, long)]
    pub user: String,

    /// Login password
    #[arg(long, env = "EDI_TRANSFER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Private key file for SFTP public-key authentication
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// Passphrase for the private key
    #[arg(long, env = "EDI_KEY_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Remote directory
    #[arg(long)]
    pub remote_dir: Option<String>,

    /// Store under this name instead of the local file name
    #[arg(long)]
    pub remote_name: Option<String>,

    /// Fail instead of creating missing remote directories
    #[arg(long)]
    pub no_create_dirs: bool,

    /// Refuse to replace an existing remote file
    #[arg(long)]
    pub no_overwrite: bool,

    /// Use active instead of passive FTP
    #[arg(long)]
    pub active: bool,

    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
    pub connect_timeout_ms: u64,

    #[arg(long, default_value_t = DEFAULT_SOCKET_TIMEOUT_MS)]
    pub socket_timeout_ms: u64,

    /// Expected SFTP host key (SHA256:<base64> or MD5 colon-hex)
    #[arg(long)]
    pub fingerprint: Option<String>,

    /// Accept any SFTP host key
    #[arg(long)]
    pub trust_unknown_host_keys: bool,
}

impl TargetArgs {
    /// Build the transfer target, reading the key file if one was given
    pub fn to_target(&self) -> anyhow::Result<TransferTarget> {
        let private_key = match &self.key_file {
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read key file {}", path.display()))?,
            ),
            None => None,
        };

        let mut target = TransferTarget::new(self.protocol, &self.host, &self.user);
        target.port = self.port;
        target.password = self.password.clone();
        target.private_key = private_key;
        target.passphrase = self.passphrase.clone();
        target.remote_directory = self.remote_dir.clone();
        target.remote_file_name = self.remote_name.clone();
        target.create_directories = !self.no_create_dirs;
        target.overwrite = !self.no_overwrite;
        target.ftp_passive_mode = !self.active;
        target.connect_timeout_ms = self.connect_timeout_ms;
        target.socket_timeout_ms = self.socket_timeout_ms;
        target.host_key_fingerprint = self.fingerprint.clone();
        target.trust_unknown_host_keys = self.trust_unknown_host_keys;

        Ok(target)
    }
}

/// Listing options from the `list` subcommand flags
pub fn list_options(
    dir: Option<String>,
    recursive: bool,
    glob: Option<String>,
    include_dirs: bool,
) -> ListOptions {
    ListOptions {
        directory: dir,
        recursive,
        glob,
        include_directories: include_dirs,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_upload_flags_map_to_target() {
        let cli = Cli::parse_from([
            "edi-router",
            "upload",
            "out/850.edi",
            "--protocol",
            "SFTP",
            "--host",
            "sftp.partner.example",
            "--user",
            "acme",
            "--remote-dir",
            "/inbound",
            "--no-overwrite",
            "--trust-unknown-host-keys",
        ]);

        let Commands::Upload { file, target } = cli.command else {
            panic!("expected upload command");
        };
        assert_eq!(file, PathBuf::from("out/850.edi"));

        let target = target.to_target().unwrap();
        assert_eq!(target.protocol, Protocol::Sftp);
        assert_eq!(target.effective_port(), 22);
        assert_eq!(target.remote_directory.as_deref(), Some("/inbound"));
        assert!(!target.overwrite);
        assert!(target.create_directories);
        assert!(target.ftp_passive_mode);
        assert!(target.trust_unknown_host_keys);
    }

    #[test]
    fn test_unknown_protocol_is_rejected() {
        let parsed = Cli::try_parse_from([
            "edi-router", "list", "--protocol", "scp", "--host", "h", "--user", "u",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_missing_key_file_is_an_error() {
        let cli = Cli::parse_from([
            "edi-router",
            "list",
            "--host",
            "h",
            "--user",
            "u",
            "--key-file",
            "/definitely/not/here/id_ed25519",
        ]);
        let Commands::List { target, .. } = cli.command else {
            panic!("expected list command");
        };
        assert!(target.to_target().is_err());
    }
}
