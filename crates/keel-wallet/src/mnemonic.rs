//! BIP-39 mnemonic generation, validation, and seed derivation.

use bip39::Language;
use rand::RngCore;
use std::fmt;
use zeroize::Zeroizing;

use crate::error::WalletError;
use crate::keys::Seed;

/// Supported mnemonic lengths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WordCount {
    /// 128 bits of entropy.
    #[default]
    Twelve,
    /// 256 bits of entropy.
    TwentyFour,
}

impl WordCount {
    fn entropy_len(&self) -> usize {
        match self {
            WordCount::Twelve => 16,
            WordCount::TwentyFour => 32,
        }
    }
}

/// A validated BIP-39 English mnemonic.
///
/// The phrase is only reachable through [`Mnemonic::phrase`], which hands
/// back a buffer that is zeroized on drop. `Debug` never prints words.
pub struct Mnemonic {
    inner: bip39::Mnemonic,
}

impl Mnemonic {
    /// The space-separated phrase.
    pub fn phrase(&self) -> Zeroizing<String> {
        Zeroizing::new(self.inner.to_string())
    }

    pub fn word_count(&self) -> usize {
        self.inner.word_count()
    }
}

impl fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mnemonic")
            .field("words", &self.inner.word_count())
            .field("phrase", &"[REDACTED]")
            .finish()
    }
}

/// Generates and validates mnemonics and turns them into binary seeds.
pub struct SeedManager;

impl SeedManager {
    /// Generate a fresh 12-word mnemonic from OS randomness.
    pub fn generate() -> Mnemonic {
        Self::generate_with(WordCount::default())
    }

    /// Generate a fresh mnemonic of the given length from OS randomness.
    pub fn generate_with(words: WordCount) -> Mnemonic {
        let mut entropy = Zeroizing::new([0u8; 32]);
        let len = words.entropy_len();
        rand::rngs::OsRng.fill_bytes(&mut entropy[..len]);
        let inner = bip39::Mnemonic::from_entropy_in(Language::English, &entropy[..len])
            .expect("16 or 32 bytes always produces a valid mnemonic");
        Mnemonic { inner }
    }

    /// Parse and validate a phrase against the English wordlist and checksum.
    ///
    /// Normalizes whitespace and converts to lowercase before parsing.
    pub fn from_phrase(phrase: &str) -> Result<Mnemonic, WalletError> {
        let normalized = Zeroizing::new(
            phrase
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
        );
        let inner = bip39::Mnemonic::parse_in(Language::English, normalized.as_str())
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
        Ok(Mnemonic { inner })
    }

    /// The 64-byte BIP-39 seed with an empty passphrase.
    pub fn to_seed(mnemonic: &Mnemonic) -> Seed {
        Self::to_seed_with_passphrase(mnemonic, "")
    }

    /// The 64-byte BIP-39 seed protected by `passphrase`.
    pub fn to_seed_with_passphrase(mnemonic: &Mnemonic, passphrase: &str) -> Seed {
        let bytes = Zeroizing::new(mnemonic.inner.to_seed(passphrase));
        Seed::from_bip39(&bytes)
    }
}
