use std::fmt;

use sqids::Sqids;
use urlc_types::ShortId;

use crate::alphabet::Alphabet;
use crate::error::IdError;
use crate::hasher::fnv1a_64;

/// Deterministic payload → [`ShortId`] assignment.
///
/// The FNV-1a 64 hash of the payload is rendered with sqids. `assign`
/// depends only on the payload bytes and the alphabet, never on call order,
/// clocks, or randomness.
pub struct ShortIdGenerator {
    alphabet: Alphabet,
    sqids: Sqids,
}

impl ShortIdGenerator {
    /// Generator over the default 62-symbol alphabet.
    pub fn new() -> Self {
        Self {
            alphabet: Alphabet::default(),
            sqids: Sqids::default(),
        }
    }

    /// Generator over a custom alphabet.
    pub fn with_alphabet(alphabet: Alphabet) -> Result<Self, IdError> {
        let sqids = alphabet.encoder()?;
        Ok(Self { alphabet, sqids })
    }

    /// Compute the short id of `payload`.
    pub fn assign(&self, payload: &[u8]) -> Result<ShortId, IdError> {
        let encoded = self.sqids.encode(&[fnv1a_64(payload)])?;
        Ok(ShortId::new_unchecked(encoded))
    }

    /// Recover the 64-bit hash a short id encodes.
    ///
    /// Only canonical ids are accepted: the hash must re-encode to exactly
    /// `id`.
    pub fn hash_of(&self, id: &ShortId) -> Result<u64, IdError> {
        let undecodable = || IdError::Undecodable(id.as_str().to_string());
        match self.sqids.decode(id.as_str()).as_slice() {
            [hash] => {
                let canonical = self.sqids.encode(&[*hash])?;
                if canonical == id.as_str() {
                    Ok(*hash)
                } else {
                    Err(undecodable())
                }
            }
            _ => Err(undecodable()),
        }
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }
}

impl Default for ShortIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShortIdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShortIdGenerator")
            .field("alphabet", &self.alphabet.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn same_payload_same_id() {
        let generator = ShortIdGenerator::new();
        let a = generator.assign(b"https://example.com/a").unwrap();
        let b = generator.assign(b"https://example.com/a").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_payloads_differ() {
        let generator = ShortIdGenerator::new();
        assert_ne!(
            generator.assign(b"https://example.com/a").unwrap(),
            generator.assign(b"https://example.com/b").unwrap()
        );
    }

    #[test]
    fn default_generator_renders_like_default_sqids() {
        let payload = b"https://example.com/path?q=1";
        let expected = Sqids::default().encode(&[fnv1a_64(payload)]).unwrap();
        assert_eq!(ShortIdGenerator::new().assign(payload).unwrap().as_str(), expected);
    }

    #[test]
    fn explicit_default_alphabet_matches_default_generator() {
        let explicit = ShortIdGenerator::with_alphabet(Alphabet::default()).unwrap();
        let payload = b"https://example.com";
        assert_eq!(
            explicit.assign(payload).unwrap(),
            ShortIdGenerator::new().assign(payload).unwrap()
        );
    }

    #[test]
    fn ids_are_valid_short_ids() {
        let id = ShortIdGenerator::new().assign(b"https://example.com").unwrap();
        assert!(ShortId::parse(id.as_str()).is_ok());
    }

    #[test]
    fn hash_of_inverts_assign() {
        let generator = ShortIdGenerator::new();
        let id = generator.assign(b"foobar").unwrap();
        assert_eq!(generator.hash_of(&id).unwrap(), fnv1a_64(b"foobar"));
    }

    #[test]
    fn hash_of_rejects_foreign_ids() {
        let generator = ShortIdGenerator::new();
        let id = ShortId::new_unchecked("___".to_string());
        assert!(matches!(generator.hash_of(&id), Err(IdError::Undecodable(_))));
    }

    #[test]
    fn custom_alphabet_limits_symbols() {
        let hex = ShortIdGenerator::with_alphabet(Alphabet::new("0123456789abcdef").unwrap()).unwrap();
        let id = hex.assign(b"a").unwrap();
        assert!(id.as_str().chars().all(|ch| hex.alphabet().contains(ch)));
        assert_eq!(hex.hash_of(&id).unwrap(), fnv1a_64(b"a"));
    }

    proptest! {
        #[test]
        fn assign_is_deterministic(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let generator = ShortIdGenerator::new();
            prop_assert_eq!(generator.assign(&payload).unwrap(), generator.assign(&payload).unwrap());
        }

        #[test]
        fn every_assigned_id_decodes_to_its_hash(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let generator = ShortIdGenerator::new();
            let id = generator.assign(&payload).unwrap();
            prop_assert_eq!(generator.hash_of(&id).unwrap(), fnv1a_64(&payload));
        }
    }
}
