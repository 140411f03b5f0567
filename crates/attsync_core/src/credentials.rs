//! Sink credentials.
//!
//! Connection parameters for the cloud database are never stored in the
//! configuration file in clear. They come from a [`CredentialProvider`],
//! usually an [`EncryptedCredentialFile`]: an AES-256-GCM blob laid out as
//!
//! ```text
//! nonce (12 bytes) || ciphertext || tag (16 bytes)
//! ```
//!
//! whose plaintext is `{"DB_CONFIG": {"host": .., "port": .., "user": ..,
//! "password": .., "database": ..}}`.

use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM tag in bytes.
pub const TAG_SIZE: usize = 16;

const KDF_INFO: &[u8] = b"attsync-credentials-key-v1";

/// Connection parameters of the cloud sink.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SinkCredentials {
    /// Database host.
    pub host: String,
    /// Database port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Database (schema) name.
    pub database: String,
}

fn default_port() -> u16 {
    3306
}

impl SinkCredentials {
    /// Returns a `mysql://` connection URL.
    pub fn url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            url_escape(&self.user),
            url_escape(&self.password),
            self.host,
            self.port,
            self.database
        )
    }
}

fn url_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

impl fmt::Debug for SinkCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct CredentialDocument {
    #[serde(rename = "DB_CONFIG")]
    db_config: SinkCredentials,
}

/// Supplies sink connection parameters.
pub trait CredentialProvider: Send + Sync {
    /// Returns decrypted credentials.
    fn decrypt(&self) -> CoreResult<SinkCredentials>;
}

/// Credentials held in memory.
#[derive(Debug, Clone)]
pub struct StaticCredentials(SinkCredentials);

impl StaticCredentials {
    /// Wraps fixed credentials.
    pub fn new(credentials: SinkCredentials) -> Self {
        Self(credentials)
    }
}

impl CredentialProvider for StaticCredentials {
    fn decrypt(&self) -> CoreResult<SinkCredentials> {
        Ok(self.0.clone())
    }
}

/// A 256-bit credential key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CredentialKey {
    bytes: [u8; KEY_SIZE],
}

impl CredentialKey {
    /// Generates a random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CoreError::credentials(format!(
                "key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { bytes: key })
    }

    /// Parses a hex-encoded key.
    pub fn from_hex(text: &str) -> CoreResult<Self> {
        let mut raw = hex::decode(text.trim())
            .map_err(|e| CoreError::credentials(format!("key is not hex: {e}")))?;
        let key = Self::from_bytes(&raw);
        raw.zeroize();
        key
    }

    /// Derives a key from a passphrase with HKDF-SHA256.
    pub fn derive_from_passphrase(passphrase: &[u8], salt: &[u8]) -> CoreResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), passphrase);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(KDF_INFO, &mut bytes)
            .map_err(|_| CoreError::credentials("key derivation failed"))?;
        Ok(Self { bytes })
    }

    /// Hex form of the key, for handing to operators once.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// AES-256-GCM over credential documents.
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// Creates a cipher from a key.
    pub fn new(key: &CredentialKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(GenericArray::from_slice(&key.bytes)),
        }
    }

    /// Encrypts credentials into a blob.
    pub fn seal(&self, credentials: &SinkCredentials) -> CoreResult<Vec<u8>> {
        let document = CredentialDocument {
            db_config: credentials.clone(),
        };
        let mut plaintext = serde_json::to_vec(&document)
            .map_err(|e| CoreError::credentials(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|_| CoreError::credentials("encryption failed"));
        plaintext.zeroize();

        let mut blob = Vec::with_capacity(NONCE_SIZE + plaintext.len() + TAG_SIZE);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend(sealed?);
        Ok(blob)
    }

    /// Decrypts a blob into credentials.
    pub fn open(&self, blob: &[u8]) -> CoreResult<SinkCredentials> {
        if blob.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CoreError::credentials("credential blob too short"));
        }

        let (nonce, sealed) = blob.split_at(NONCE_SIZE);
        let mut plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CoreError::credentials("wrong key or tampered credential blob"))?;

        let parsed = serde_json::from_slice::<CredentialDocument>(&plaintext);
        plaintext.zeroize();

        parsed
            .map(|doc| doc.db_config.clone())
            .map_err(|e| CoreError::credentials(format!("bad credential document: {e}")))
    }
}

/// Where the decryption key comes from.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Hex key in an environment variable.
    HexEnv(String),
    /// Passphrase in an environment variable, stretched with HKDF.
    PassphraseEnv {
        /// Variable name.
        var: String,
        /// HKDF salt.
        salt: String,
    },
    /// A key held in memory.
    Key(CredentialKey),
}

impl KeySource {
    fn resolve(&self) -> CoreResult<CredentialKey> {
        match self {
            KeySource::HexEnv(var) => {
                let value = std::env::var(var)
                    .map_err(|_| CoreError::credentials(format!("{var} is not set")))?;
                CredentialKey::from_hex(&value)
            }
            KeySource::PassphraseEnv { var, salt } => {
                let value = std::env::var(var)
                    .map_err(|_| CoreError::credentials(format!("{var} is not set")))?;
                CredentialKey::derive_from_passphrase(value.as_bytes(), salt.as_bytes())
            }
            KeySource::Key(key) => Ok(key.clone()),
        }
    }
}

/// Credentials read from an encrypted file on every call.
#[derive(Debug, Clone)]
pub struct EncryptedCredentialFile {
    path: PathBuf,
    key: KeySource,
}

impl EncryptedCredentialFile {
    /// Creates a provider for `path` using `key`.
    pub fn new(path: impl AsRef<Path>, key: KeySource) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            key,
        }
    }

    /// Returns the blob path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialProvider for EncryptedCredentialFile {
    fn decrypt(&self) -> CoreResult<SinkCredentials> {
        let blob = fs::read(&self.path).map_err(|e| {
            CoreError::credentials(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let key = self.key.resolve()?;
        CredentialCipher::new(&key).open(&blob)
    }
}
