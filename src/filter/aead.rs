use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::filter::{ChunkTransform, DecoderFactory, DecoderFilter, EncoderFilter};
use crate::manifest::{FilterConfig, FilterResult, StreamConfigRecord};
use crate::resolve::ResolvedEntry;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

#[derive(Clone, PartialEq, Eq)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    pub fn generate() -> Key {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Key(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Key {
        Key(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    // First 8 bytes of SHA-256 over the raw key, lowercase hex. This is
    // the keyId manifests reference; raw key material never enters a
    // config.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        digest[..8].iter().fold(String::with_capacity(16), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
    }
}

impl std::fmt::Debug for Key {
    // Never prints key bytes
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Key({})", self.fingerprint())
    }
}

// Each input chunk is sealed independently with a fresh random IV and
// emitted as IV || ciphertext || tag in a single output chunk. One
// chunk in, one chunk out, so streaming decrypt needs no reassembly.
pub struct AeadEncoder {
    cipher: Aes256Gcm,
    key_id: String,
}

impl AeadEncoder {
    pub fn new(key: &Key) -> Self {
        AeadEncoder {
            cipher: Aes256Gcm::new_from_slice(key.as_bytes()).expect("32-byte key"),
            key_id: key.fingerprint(),
        }
    }
}

impl ChunkTransform for AeadEncoder {
    fn update(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), chunk)
            .map_err(|_| {
                Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "aead seal failed"))
            })?;

        let mut out = Vec::with_capacity(IV_LEN + sealed.len());
        out.extend_from_slice(&iv);
        out.extend(sealed);
        Ok(out)
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

impl EncoderFilter for AeadEncoder {
    fn config(&self) -> FilterConfig {
        FilterConfig::Aead {
            key_id: self.key_id.clone(),
        }
    }

    fn result(&self) -> Option<FilterResult> {
        Some(FilterResult::Aead {
            key_id: self.key_id.clone(),
        })
    }
}

pub struct AeadDecoder {
    cipher: Aes256Gcm,
}

impl AeadDecoder {
    pub fn new(key: &Key) -> Self {
        AeadDecoder {
            cipher: Aes256Gcm::new_from_slice(key.as_bytes()).expect("32-byte key"),
        }
    }
}

impl ChunkTransform for AeadDecoder {
    fn update(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }
        if chunk.len() < IV_LEN + TAG_LEN {
            return Err(Error::DecryptFailure);
        }

        let (iv, sealed) = chunk.split_at(IV_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(iv), sealed)
            .map_err(|_| Error::DecryptFailure)
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

struct AeadDecoderFilter {
    key: Key,
}

impl DecoderFilter for AeadDecoderFilter {
    fn decoder(&self) -> Result<Box<dyn ChunkTransform>> {
        Ok(Box::new(AeadDecoder::new(&self.key)))
    }
}

// Resolves AES-GCM slots against keys indexed by fingerprint. A slot
// whose keyId matches no key is left unclaimed, surfacing as
// UnresolvedFilter if the consumer later asks for decode().
pub struct AeadFactory {
    keys: HashMap<String, Key>,
}

impl AeadFactory {
    pub fn new() -> Self {
        AeadFactory { keys: HashMap::new() }
    }

    pub fn add_key(&mut self, key: Key) {
        self.keys.insert(key.fingerprint(), key);
    }

    pub fn with_keys<I: IntoIterator<Item = Key>>(keys: I) -> Self {
        let mut factory = AeadFactory::new();
        for key in keys {
            factory.add_key(key);
        }
        factory
    }
}

impl Default for AeadFactory {
    fn default() -> Self {
        AeadFactory::new()
    }
}

impl DecoderFactory for AeadFactory {
    fn detect(
        &self,
        _record: &StreamConfigRecord,
        mut entries: Vec<ResolvedEntry>,
    ) -> Result<Vec<ResolvedEntry>> {
        for entry in entries.iter_mut() {
            if entry.instance.is_none() {
                if let FilterConfig::Aead { key_id } = &entry.input {
                    if let Some(key) = self.keys.get(key_id) {
                        entry.instance = Some(Rc::new(AeadDecoderFilter { key: key.clone() }));
                    }
                }
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod test_aead {
    use super::*;
    use crate::filter::test_support::drive;

    #[test]
    fn round_trip() {
        let key = Key::generate();
        let mut enc = AeadEncoder::new(&key);

        let sealed = enc.update(b"top secret payload").unwrap();
        assert_eq!(sealed.len(), 18 + IV_LEN + TAG_LEN);
        assert_ne!(&sealed[IV_LEN..IV_LEN + 18], b"top secret payload");

        let mut dec = AeadDecoder::new(&key);
        assert_eq!(dec.update(&sealed).unwrap(), b"top secret payload");
    }

    #[test]
    fn chunk_boundaries_preserved() {
        let key = Key::generate();
        let mut enc = AeadEncoder::new(&key);
        let mut dec = AeadDecoder::new(&key);

        let chunks: [&[u8]; 3] = [b"first", b"second chunk", b"third"];
        for chunk in chunks {
            let sealed = enc.update(chunk).unwrap();
            assert_eq!(sealed.len(), chunk.len() + IV_LEN + TAG_LEN);
            assert_eq!(dec.update(&sealed).unwrap(), chunk);
        }
        assert!(enc.flush().unwrap().is_empty());
        assert!(dec.flush().unwrap().is_empty());
    }

    #[test]
    fn same_plaintext_seals_differently() {
        let key = Key::generate();
        let mut enc = AeadEncoder::new(&key);

        let first = enc.update(b"same bytes").unwrap();
        let second = enc.update(b"same bytes").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn wrong_key_fails() {
        let mut enc = AeadEncoder::new(&Key::generate());
        let sealed = enc.update(b"top secret payload").unwrap();

        let mut dec = AeadDecoder::new(&Key::generate());
        assert!(matches!(dec.update(&sealed), Err(Error::DecryptFailure)));
    }

    #[test]
    fn tampered_chunk_fails() {
        let key = Key::generate();
        let mut enc = AeadEncoder::new(&key);
        let mut sealed = enc.update(b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        let mut dec = AeadDecoder::new(&key);
        assert!(matches!(dec.update(&sealed), Err(Error::DecryptFailure)));
    }

    #[test]
    fn short_chunk_fails() {
        let mut dec = AeadDecoder::new(&Key::generate());
        assert!(matches!(dec.update(&[0u8; 20]), Err(Error::DecryptFailure)));
    }

    #[test]
    fn encoder_is_pure_per_chunk() {
        let key = Key::generate();
        let mut enc = AeadEncoder::new(&key);
        let out = drive(&mut enc, &[b"".as_ref()]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn fingerprint_shape() {
        let key = Key::generate();
        let fp = key.fingerprint();

        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(fp, key.fingerprint());
        assert_ne!(fp, Key::generate().fingerprint());
    }

    #[test]
    fn fingerprint_known_vector() {
        // SHA-256 of 32 zero bytes starts with 66687aadf862bd77
        let key = Key::from_bytes([0u8; KEY_LEN]);
        assert_eq!(key.fingerprint(), "66687aadf862bd77");
    }
}
