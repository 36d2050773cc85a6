//! Key store — provider API keys kept as files under one base directory.
//!
//! Layout:
//!   <base>/encryption_key.txt   salt (first 16 bytes, rest ignored)
//!   <base>/deepseek.txt         iv (16) || ciphertext
//!   <base>/siliconflow.txt      raw key, surrounding whitespace ignored
//!
//! Nothing is cached: every lookup re-reads the files and re-derives the key.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zeroize::Zeroizing;

use super::{decrypt, derive_key, encrypt, generate_salt, Salt, VaultError, EMBEDDED_PASSPHRASE, SALT_LEN};
use crate::provider::{KeyStorage, Provider};

/// Name of the salt file shared by all encrypted providers.
pub const SALT_FILE: &str = "encryption_key.txt";

/// Where the vault looks for its files and which passphrase unlocks them.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub base_dir: Option<PathBuf>,
    pub passphrase: String,
}

impl VaultConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
            ..Self::default()
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            passphrase: EMBEDDED_PASSPHRASE.to_string(),
        }
    }
}

pub struct CredentialVault {
    config: VaultConfig,
}

impl CredentialVault {
    pub fn new(config: VaultConfig) -> Self {
        Self { config }
    }

    fn base_dir(&self) -> Result<&Path, VaultError> {
        self.config
            .base_dir
            .as_deref()
            .ok_or_else(|| VaultError::Configuration("vault base directory is not set (AG_CONFIG_PATH)".into()))
    }

    /// Look up a key by provider id, e.g. `"deepseek"`.
    pub fn api_key_for(&self, provider_id: &str) -> Result<Zeroizing<String>, VaultError> {
        let provider: Provider = provider_id.parse()?;
        self.api_key(provider)
    }

    /// Return the plaintext API key for `provider`.
    pub fn api_key(&self, provider: Provider) -> Result<Zeroizing<String>, VaultError> {
        let base = self.base_dir()?;
        let key_path = base.join(provider.key_file_name());

        match provider.key_storage() {
            KeyStorage::Plaintext => {
                debug!(provider = %provider, path = %key_path.display(), "Reading plaintext key");
                let raw = Zeroizing::new(
                    fs::read_to_string(&key_path).map_err(|source| io_error(&key_path, source))?,
                );
                Ok(Zeroizing::new(raw.trim().to_string()))
            }
            KeyStorage::Encrypted => {
                let salt_path = base.join(SALT_FILE);
                debug!(provider = %provider, path = %key_path.display(), "Unlocking encrypted key");
                let salt = read_salt(&salt_path)?;
                let encrypted = fs::read(&key_path).map_err(|source| io_error(&key_path, source))?;

                let key = derive_key(&self.config.passphrase, &salt);
                Ok(Zeroizing::new(decrypt(&encrypted, &key)?))
            }
        }
    }

    /// Provision `secret` for `provider`, replacing any existing key file.
    ///
    /// Encrypted providers reuse the existing salt file so other keys sealed
    /// under it stay readable; a fresh salt is written only if none exists.
    pub fn store_api_key(&self, provider: Provider, secret: &str) -> Result<PathBuf, VaultError> {
        let base = self.base_dir()?;
        fs::create_dir_all(base).map_err(|source| io_error(base, source))?;
        let key_path = base.join(provider.key_file_name());
        let secret = secret.trim();

        match provider.key_storage() {
            KeyStorage::Plaintext => {
                atomic_write(&key_path, secret.as_bytes())?;
            }
            KeyStorage::Encrypted => {
                let salt_path = base.join(SALT_FILE);
                let salt = match read_salt(&salt_path) {
                    Ok(salt) => salt,
                    Err(VaultError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                        info!(path = %salt_path.display(), "No salt file — generating a new one");
                        let salt = generate_salt();
                        atomic_write(&salt_path, &salt)?;
                        salt
                    }
                    Err(e) => return Err(e),
                };

                let key = derive_key(&self.config.passphrase, &salt);
                atomic_write(&key_path, &encrypt(secret, &key))?;
            }
        }

        info!(provider = %provider, path = %key_path.display(), "API key stored");
        Ok(key_path)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> VaultError {
    VaultError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_salt(path: &Path) -> Result<Salt, VaultError> {
    let content = fs::read(path).map_err(|source| io_error(path, source))?;
    content
        .get(..SALT_LEN)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            VaultError::Decoding(format!(
                "{} holds {} bytes, need at least {SALT_LEN} of salt",
                path.display(),
                content.len()
            ))
        })
}

/// Write via temp file + fsync + rename so a crash never leaves a torn key file.
fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), VaultError> {
    let tmp_path = path.with_extension("txt.tmp");

    {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|source| io_error(&tmp_path, source))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|source| io_error(&tmp_path, source))?;
        }

        file.write_all(contents)
            .and_then(|_| file.sync_all())
            .map_err(|source| io_error(&tmp_path, source))?;
    }

    fs::rename(&tmp_path, path).map_err(|source| io_error(path, source))
}
