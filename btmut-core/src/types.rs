//! Domain types for mutable publications.
//!
//! Keys and hashes are fixed-size byte arrays; their canonical text form is
//! lowercase hex, which is what the vault, the magnet codec and the sequence
//! store all index by.

use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32_NOPAD;
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CoreError;

/// Size of an Ed25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Size of an Ed25519 secret seed in bytes.
pub const SECRET_KEY_SIZE: usize = 32;
/// Size of a BitTorrent v1 info-hash in bytes.
pub const INFO_HASH_SIZE: usize = 20;

fn decode_fixed<const N: usize>(what: &str, hex_str: &str) -> Result<[u8; N], CoreError> {
    let mut buf = [0u8; N];
    hex::decode_to_slice(hex_str.trim(), &mut buf).map_err(|e| {
        CoreError::InvalidKey(format!(
            "{what} must be {} hex characters: {e}",
            N * 2
        ))
    })?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Public key
// ---------------------------------------------------------------------------

/// Public half of an owner keypair. Identifies a mutable publication.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse from hex. Accepts an optional `0x` prefix.
    pub fn from_hex(hex_str: &str) -> Result<Self, CoreError> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        decode_fixed::<PUBLIC_KEY_SIZE>("public key", hex_str).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The key as a curve point, for signature verification.
    pub fn verifying_key(&self) -> Result<VerifyingKey, CoreError> {
        VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CoreError::InvalidKey(format!("public key is not a valid point: {e}")))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Secret key
// ---------------------------------------------------------------------------

/// Secret seed of an owner keypair. Zeroized on drop; never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; SECRET_KEY_SIZE]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; SECRET_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CoreError> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        decode_fixed::<SECRET_KEY_SIZE>("secret key", hex_str).map(Self)
    }

    /// Decode a vault entry: raw 32-byte seed, raw 64-byte `seed || public`,
    /// or the hex text of either.
    pub fn from_stored(bytes: &[u8]) -> Result<Self, CoreError> {
        // Hex text first: a 64-char hex seed is also 64 bytes long.
        let text = bytes.trim_ascii();
        if !text.is_empty() && text.iter().all(u8::is_ascii_hexdigit) {
            let decoded = hex::decode(text).map_err(|e| {
                CoreError::InvalidKey(format!("stored secret hex decode error: {e}"))
            })?;
            return Self::from_raw(&decoded);
        }
        Self::from_raw(bytes)
    }

    fn from_raw(bytes: &[u8]) -> Result<Self, CoreError> {
        match bytes.len() {
            SECRET_KEY_SIZE | 64 => {
                let mut buf = [0u8; SECRET_KEY_SIZE];
                buf.copy_from_slice(&bytes[..SECRET_KEY_SIZE]);
                Ok(Self(buf))
            }
            n => Err(CoreError::InvalidKey(format!(
                "stored secret has {n} bytes, expected 32 or 64"
            ))),
        }
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.0)
    }

    /// The public key this secret derives.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key().verifying_key().to_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretKey {}

// ---------------------------------------------------------------------------
// Keypair
// ---------------------------------------------------------------------------

/// An owner keypair. The public half always derives from the secret half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keypair {
    public: PublicKey,
    secret: SecretKey,
}

impl Keypair {
    /// Fresh keypair from the OS random source.
    pub fn generate() -> Result<Self, CoreError> {
        let mut seed = [0u8; SECRET_KEY_SIZE];
        getrandom::getrandom(&mut seed)
            .map_err(|e| CoreError::InvalidKey(format!("OS random source failed: {e}")))?;
        let pair = Self::from_seed(seed);
        seed.zeroize();
        Ok(pair)
    }

    /// Deterministic keypair from a 32-byte seed.
    pub fn from_seed(seed: [u8; SECRET_KEY_SIZE]) -> Self {
        Self::from_secret(SecretKey(seed))
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        Self {
            public: secret.public_key(),
            secret,
        }
    }

    /// Pair an explicit public key with its secret.
    ///
    /// Fails if `secret` does not derive `public`.
    pub fn from_parts(public: PublicKey, secret: SecretKey) -> Result<Self, CoreError> {
        let derived = secret.public_key();
        if derived != public {
            return Err(CoreError::InvalidKey(format!(
                "secret key does not match public key {public}"
            )));
        }
        Ok(Self { public, secret })
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

// ---------------------------------------------------------------------------
// Info-hash
// ---------------------------------------------------------------------------

/// Content-derived identifier of a file-set snapshot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; INFO_HASH_SIZE]);

impl InfoHash {
    pub fn from_bytes(bytes: [u8; INFO_HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CoreError> {
        decode_fixed::<INFO_HASH_SIZE>("info-hash", hex_str).map(Self)
    }

    /// RFC 4648 base32, the 32-character `urn:btih:` form. Case-insensitive.
    pub fn from_base32(b32: &str) -> Result<Self, CoreError> {
        let upper = b32.trim().to_ascii_uppercase();
        let bytes = BASE32_NOPAD.decode(upper.as_bytes()).map_err(|e| {
            CoreError::InvalidKey(format!("info-hash is not valid base32: {e}"))
        })?;
        let bytes: [u8; INFO_HASH_SIZE] = bytes.try_into().map_err(|v: Vec<u8>| {
            CoreError::InvalidKey(format!(
                "info-hash must be {INFO_HASH_SIZE} bytes, base32 gave {}",
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Either `urn:btih:` encoding: 40 hex or 32 base32 characters.
    pub fn from_topic(value: &str) -> Result<Self, CoreError> {
        match value.trim().len() {
            32 => Self::from_base32(value),
            _ => Self::from_hex(value),
        }
    }

    pub fn as_bytes(&self) -> &[u8; INFO_HASH_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self.to_hex())
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_derives_stable_keypair() {
        let a = Keypair::from_seed([7u8; 32]);
        let b = Keypair::from_seed([7u8; 32]);
        assert_eq!(a.public(), b.public());
        assert_ne!(a.public(), Keypair::from_seed([8u8; 32]).public());
    }

    #[test]
    fn generated_keypairs_differ() {
        let a = Keypair::generate().expect("generate");
        let b = Keypair::generate().expect("generate");
        assert_ne!(a.public(), b.public());
    }

    #[test]
    fn from_parts_rejects_mismatch() {
        let a = Keypair::from_seed([1u8; 32]);
        let b = Keypair::from_seed([2u8; 32]);
        assert!(Keypair::from_parts(*a.public(), a.secret().clone()).is_ok());
        assert!(Keypair::from_parts(*a.public(), b.secret().clone()).is_err());
    }

    #[test]
    fn public_key_hex_roundtrip() {
        let pair = Keypair::from_seed([3u8; 32]);
        let hex = pair.public().to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(PublicKey::from_hex(&hex).unwrap(), *pair.public());
        assert_eq!(PublicKey::from_hex(&format!("0x{hex}")).unwrap(), *pair.public());
    }

    #[test]
    fn public_key_rejects_short_hex() {
        assert!(PublicKey::from_hex("abcd").is_err());
        assert!(InfoHash::from_hex("zz").is_err());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let pair = Keypair::from_seed([9u8; 32]);
        let rendered = format!("{pair:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&pair.secret().to_hex()));
    }

    #[test]
    fn secret_from_stored_accepts_raw_and_hex() {
        let pair = Keypair::from_seed([4u8; 32]);
        let seed = *pair.secret().as_bytes();

        let mut full = seed.to_vec();
        full.extend_from_slice(pair.public().as_bytes());

        for stored in [
            seed.to_vec(),
            full.clone(),
            hex::encode(seed).into_bytes(),
            format!("{}\n", hex::encode(&full)).into_bytes(),
        ] {
            let secret = SecretKey::from_stored(&stored).expect("decode");
            assert_eq!(secret, *pair.secret());
        }
        assert!(SecretKey::from_stored(b"nope").is_err());
    }

    #[test]
    fn info_hash_topic_accepts_hex_and_base32() {
        let hash = InfoHash::from_bytes([0xab; 20]);
        let b32 = BASE32_NOPAD.encode(hash.as_bytes());
        assert_eq!(b32.len(), 32);
        assert_eq!(InfoHash::from_topic(&b32).unwrap(), hash);
        assert_eq!(InfoHash::from_topic(&b32.to_lowercase()).unwrap(), hash);
        assert_eq!(InfoHash::from_topic(&hash.to_hex().to_uppercase()).unwrap(), hash);
        assert!(InfoHash::from_topic("not-a-hash").is_err());
    }
}
