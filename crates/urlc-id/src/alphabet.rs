use sqids::Sqids;

use crate::error::IdError;

/// Alphanumeric alphabet used to render hashes, 62 symbols.
///
/// Same symbols in the same order as the sqids default, so the default
/// generator and `Sqids::default()` agree.
pub const DEFAULT_ALPHABET: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const MIN_SYMBOLS: usize = 3;

/// Validated symbol set for short ids.
///
/// Only unique ASCII alphanumerics are accepted, so every id stays a valid
/// [`ShortId`](urlc_types::ShortId).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alphabet {
    symbols: String,
}

impl Alphabet {
    /// Build an alphabet from `symbols`.
    ///
    /// Symbols must be unique ASCII alphanumerics; at least three are required.
    pub fn new(symbols: &str) -> Result<Self, IdError> {
        let mut seen = [false; 128];
        for ch in symbols.chars() {
            if !ch.is_ascii_alphanumeric() {
                return Err(IdError::NonAlphanumeric(ch));
            }
            let slot = &mut seen[ch as usize];
            if *slot {
                return Err(IdError::DuplicateCharacter(ch));
            }
            *slot = true;
        }
        if symbols.len() < MIN_SYMBOLS {
            return Err(IdError::AlphabetTooShort(symbols.len()));
        }
        Ok(Self {
            symbols: symbols.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.symbols
    }

    pub fn contains(&self, ch: char) -> bool {
        self.symbols.contains(ch)
    }

    /// Build the sqids encoder for this alphabet.
    ///
    /// The default blocklist stays active.
    pub(crate) fn encoder(&self) -> Result<Sqids, IdError> {
        Ok(Sqids::builder()
            .alphabet(self.symbols.chars().collect())
            .build()?)
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_ALPHABET.to_string(),
        }
    }
}
