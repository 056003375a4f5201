//! Magnet identifier codec.
//!
//! # Wire format
//!
//! ```text
//! magnet:?xt=urn:btih:<40 hex | 32 base32>[&<other params>...][&xs=urn:btpk:<64 hex>]
//! ```
//!
//! `xt` carries the info-hash of a fixed snapshot. `xs` with the `urn:btpk:`
//! prefix is the owner extension: it marks the identifier as a pointer to a
//! mutable publication, which must be resolved before it can be fetched.
//! Either may be absent, but not both.
//!
//! A decoded magnet remembers each parameter's position and raw text, so
//! `encode(decode(x)) == x` holds for any accepted `x`. Values built from
//! scratch, or fields changed after decoding, fall back to the canonical
//! layout: `xt` first, extras in order, `xs` last.
//!
//! This is the only module that knows the owner-extension format.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{malformed, CoreError};
use crate::types::{InfoHash, PublicKey};

/// Prefix of the owner-extension parameter value.
pub const BTPK_PREFIX: &str = "urn:btpk:";
/// Prefix of the exact-topic parameter value.
pub const BTIH_PREFIX: &str = "urn:btih:";

const SCHEME_PREFIX: &str = "magnet:?";

/// A decoded magnet identifier.
///
/// Equality compares the decoded values only, not the original spelling.
#[derive(Debug, Clone)]
pub struct Magnet {
    pub info_hash: Option<InfoHash>,
    pub public_key: Option<PublicKey>,
    /// Every other parameter, raw and in original order (`dn`, `tr`, ...).
    pub extra: Vec<(String, String)>,
    layout: Vec<Slot>,
}

/// One parameter of a decoded identifier, as it was written.
#[derive(Debug, Clone)]
enum Slot {
    Topic { raw: String, hash: InfoHash },
    Owner { raw: String, key: PublicKey },
    Extra { raw: String },
}

impl PartialEq for Magnet {
    fn eq(&self, other: &Self) -> bool {
        self.info_hash == other.info_hash
            && self.public_key == other.public_key
            && self.extra == other.extra
    }
}

impl Eq for Magnet {}

impl Magnet {
    /// A magnet pointing at a fixed snapshot.
    pub fn immutable(info_hash: InfoHash) -> Self {
        Self {
            info_hash: Some(info_hash),
            public_key: None,
            extra: Vec::new(),
            layout: Vec::new(),
        }
    }

    /// A bare owner pointer, not yet resolved to any snapshot.
    pub fn owned(public_key: PublicKey) -> Self {
        Self {
            info_hash: None,
            public_key: Some(public_key),
            extra: Vec::new(),
            layout: Vec::new(),
        }
    }

    /// Same identifier with the owner extension set to `public_key`.
    pub fn with_public_key(mut self, public_key: PublicKey) -> Self {
        self.public_key = Some(public_key);
        self
    }

    pub fn with_info_hash(mut self, info_hash: InfoHash) -> Self {
        self.info_hash = Some(info_hash);
        self
    }

    /// Same identifier with the owner extension removed.
    pub fn without_public_key(mut self) -> Self {
        self.public_key = None;
        self
    }

    /// True when the identifier carries the owner extension.
    pub fn is_owned(&self) -> bool {
        self.public_key.is_some()
    }

    pub fn decode(identifier: &str) -> Result<Self, CoreError> {
        decode(identifier)
    }

    pub fn encode(&self) -> String {
        encode(self)
    }
}

impl fmt::Display for Magnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Magnet {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

/// Parse a magnet identifier.
///
/// Fails with [`CoreError::MalformedIdentifier`] if the string is not a
/// `magnet:` URI, if a known parameter has a bad value, or if it carries
/// neither an info-hash nor an owner key.
pub fn decode(identifier: &str) -> Result<Magnet, CoreError> {
    let identifier = identifier.trim();
    let url = Url::parse(identifier).map_err(|e| malformed(identifier, e.to_string()))?;
    if url.scheme() != "magnet" {
        return Err(malformed(
            identifier,
            format!("expected magnet scheme, got '{}'", url.scheme()),
        ));
    }
    // The raw query, not the normalized one `url` would hand back.
    let query = identifier
        .split_once('?')
        .map(|(_, q)| q.split_once('#').map_or(q, |(q, _)| q))
        .filter(|q| !q.is_empty())
        .ok_or_else(|| malformed(identifier, "missing query parameters"))?;

    let mut magnet = Magnet {
        info_hash: None,
        public_key: None,
        extra: Vec::new(),
        layout: Vec::new(),
    };

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if let Some(hex_key) = value.strip_prefix(BTPK_PREFIX) {
            if magnet.public_key.is_some() {
                return Err(malformed(identifier, "more than one owner key"));
            }
            let key = PublicKey::from_hex(hex_key)
                .map_err(|e| malformed(identifier, e.to_string()))?;
            magnet.public_key = Some(key);
            magnet.layout.push(Slot::Owner {
                raw: pair.to_owned(),
                key,
            });
        } else if key == "xt" && value.starts_with(BTIH_PREFIX) && magnet.info_hash.is_none() {
            let hash = InfoHash::from_topic(&value[BTIH_PREFIX.len()..])
                .map_err(|e| malformed(identifier, e.to_string()))?;
            magnet.info_hash = Some(hash);
            magnet.layout.push(Slot::Topic {
                raw: pair.to_owned(),
                hash,
            });
        } else {
            magnet.extra.push((key.to_owned(), value.to_owned()));
            magnet.layout.push(Slot::Extra {
                raw: pair.to_owned(),
            });
        }
    }

    if magnet.info_hash.is_none() && magnet.public_key.is_none() {
        return Err(malformed(identifier, "no info-hash and no owner key"));
    }
    Ok(magnet)
}

/// Build the identifier string.
///
/// Parameters keep the position and spelling they were decoded with as long
/// as their value is unchanged. Anything new is placed canonically.
pub fn encode(magnet: &Magnet) -> String {
    let topic = |hash: &InfoHash| format!("xt={BTIH_PREFIX}{}", hash.to_hex());
    let owner = |key: &PublicKey| format!("xs={BTPK_PREFIX}{}", key.to_hex());

    let mut params: Vec<String> = Vec::with_capacity(magnet.extra.len() + 2);
    let mut topic_placed = false;
    let mut owner_placed = false;
    let mut extras = magnet.extra.iter();

    for slot in &magnet.layout {
        match slot {
            Slot::Topic { raw, hash } => {
                if let Some(current) = &magnet.info_hash {
                    params.push(if current == hash { raw.clone() } else { topic(current) });
                    topic_placed = true;
                }
            }
            Slot::Owner { raw, key } => {
                if let Some(current) = &magnet.public_key {
                    params.push(if current == key { raw.clone() } else { owner(current) });
                    owner_placed = true;
                }
            }
            Slot::Extra { raw } => {
                if let Some(pair) = extras.next() {
                    params.push(if split_pair(raw) == *pair {
                        raw.clone()
                    } else {
                        join_pair(pair)
                    });
                }
            }
        }
    }

    params.extend(extras.map(join_pair));
    if let (Some(hash), false) = (&magnet.info_hash, topic_placed) {
        params.insert(0, topic(hash));
    }
    if let (Some(key), false) = (&magnet.public_key, owner_placed) {
        params.push(owner(key));
    }
    format!("{SCHEME_PREFIX}{}", params.join("&"))
}

fn split_pair(raw: &str) -> (String, String) {
    let (key, value) = raw.split_once('=').unwrap_or((raw, ""));
    (key.to_owned(), value.to_owned())
}

fn join_pair((key, value): &(String, String)) -> String {
    if value.is_empty() {
        key.clone()
    } else {
        format!("{key}={value}")
    }
}

/// True iff `identifier` decodes and carries an owner key.
pub fn is_owned(identifier: &str) -> bool {
    decode(identifier).map(|m| m.is_owned()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PK: &str = "3b6a27bcceb6a42d62a3a8d02a6f0d73653215771de243a63ac048a18b59da29";
    const IH: &str = "c9e15763f722f23e98a29decdfae341b98d53056";

    #[test]
    fn decode_owner_only() {
        let m = decode(&format!("magnet:?xs=urn:btpk:{PK}")).unwrap();
        assert!(m.info_hash.is_none());
        assert_eq!(m.public_key.unwrap().to_hex(), PK);
        assert!(m.is_owned());
    }

    #[test]
    fn decode_immutable() {
        let m = decode(&format!("magnet:?xt=urn:btih:{IH}&dn=photos")).unwrap();
        assert_eq!(m.info_hash.unwrap().to_hex(), IH);
        assert!(!m.is_owned());
        assert_eq!(m.extra, vec![("dn".to_string(), "photos".to_string())]);
    }

    #[test]
    fn encode_puts_owner_last() {
        let m = Magnet::immutable(InfoHash::from_hex(IH).unwrap())
            .with_public_key(PublicKey::from_hex(PK).unwrap());
        assert_eq!(
            m.encode(),
            format!("magnet:?xt=urn:btih:{IH}&xs=urn:btpk:{PK}")
        );
    }

    #[test]
    fn is_owned_false_on_garbage() {
        assert!(!is_owned("not a magnet"));
        assert!(!is_owned(&format!("magnet:?xt=urn:btih:{IH}")));
        assert!(is_owned(&format!("magnet:?xs=urn:btpk:{PK}")));
    }

    #[test]
    fn rejects_empty_and_wrong_scheme() {
        assert!(matches!(
            decode("magnet:?dn=nothing"),
            Err(CoreError::MalformedIdentifier { .. })
        ));
        assert!(matches!(
            decode(&format!("http://example.com/?xt=urn:btih:{IH}")),
            Err(CoreError::MalformedIdentifier { .. })
        ));
        assert!(matches!(
            decode("magnet:?xs=urn:btpk:deadbeef"),
            Err(CoreError::MalformedIdentifier { .. })
        ));
    }
}
