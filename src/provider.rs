//! Known API providers and how each one stores its key at rest.

use std::fmt;
use std::str::FromStr;

use crate::vault::VaultError;

/// Where a provider's API key lives under the vault base directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStorage {
    /// `<provider>.txt` holds the raw key.
    Plaintext,
    /// `<provider>.txt` holds `iv || ciphertext`, unlocked with the salt
    /// in `encryption_key.txt`.
    Encrypted,
}

/// Which of the provider's two model families to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelKind {
    #[default]
    Chat,
    Reasoner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    DeepSeek,
    SiliconFlow,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::DeepSeek, Provider::SiliconFlow];

    /// Identifier used on the command line and for the key file name.
    pub fn id(&self) -> &'static str {
        match self {
            Provider::DeepSeek => "deepseek",
            Provider::SiliconFlow => "siliconflow",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Provider::DeepSeek => "https://api.deepseek.com",
            Provider::SiliconFlow => "https://api.siliconflow.cn/v1",
        }
    }

    pub fn model(&self, kind: ModelKind) -> &'static str {
        match (self, kind) {
            (Provider::DeepSeek, ModelKind::Chat) => "deepseek-chat",
            (Provider::DeepSeek, ModelKind::Reasoner) => "deepseek-reasoner",
            (Provider::SiliconFlow, ModelKind::Chat) => "deepseek-ai/DeepSeek-V3",
            (Provider::SiliconFlow, ModelKind::Reasoner) => "deepseek-ai/DeepSeek-R1",
        }
    }

    pub fn key_storage(&self) -> KeyStorage {
        match self {
            Provider::DeepSeek => KeyStorage::Encrypted,
            Provider::SiliconFlow => KeyStorage::Plaintext,
        }
    }

    /// File name of the key artifact under the vault base directory.
    pub fn key_file_name(&self) -> String {
        format!("{}.txt", self.id())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Provider {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.id() == s)
            .ok_or_else(|| VaultError::Configuration(format!("unknown provider '{s}'")))
    }
}
