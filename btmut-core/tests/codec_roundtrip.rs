//! Magnet codec round-trip and rejection cases.

use btmut_core::{magnet, CoreError, InfoHash, Keypair, Magnet, PublicKey};
use rstest::rstest;

const PK: &str = "3b6a27bcceb6a42d62a3a8d02a6f0d73653215771de243a63ac048a18b59da29";
const IH: &str = "c9e15763f722f23e98a29decdfae341b98d53056";
/// `IH` in base32.
const IH_B32: &str = "ZHQVOY7XELZD5GFCTXWN7LRUDOMNKMCW";

#[rstest]
#[case::owner_only(format!("magnet:?xs=urn:btpk:{PK}"))]
#[case::hash_and_owner(format!("magnet:?xt=urn:btih:{IH}&xs=urn:btpk:{PK}"))]
#[case::with_name(format!("magnet:?xt=urn:btih:{IH}&dn=holiday&xs=urn:btpk:{PK}"))]
#[case::with_trackers(format!(
    "magnet:?xt=urn:btih:{IH}&dn=a&tr=udp%3A%2F%2Ftracker.example%3A80&xs=urn:btpk:{PK}"
))]
#[case::name_first(format!("magnet:?dn=photos&xt=urn:btih:{IH}&xs=urn:btpk:{PK}"))]
#[case::owner_first(format!("magnet:?xs=urn:btpk:{PK}&xt=urn:btih:{IH}&dn=photos"))]
#[case::uppercase_hex(format!(
    "magnet:?xt=urn:btih:{}&xs=urn:btpk:{}",
    IH.to_uppercase(),
    PK.to_uppercase()
))]
#[case::base32_topic(format!("magnet:?xt=urn:btih:{IH_B32}&xs=urn:btpk:{PK}"))]
#[case::empty_value(format!("magnet:?xt=urn:btih:{IH}&dn=&ws&xs=urn:btpk:{PK}"))]
fn owned_identifiers_roundtrip(#[case] identifier: String) {
    let decoded = magnet::decode(&identifier).expect("decode");
    assert!(decoded.is_owned());
    assert_eq!(magnet::encode(&decoded), identifier);
}

#[rstest]
#[case::empty("")]
#[case::not_a_uri("just some words")]
#[case::wrong_scheme("https://example.com/?xt=urn:btih:c9e15763f722f23e98a29decdfae341b98d53056")]
#[case::no_topic("magnet:?dn=nothing")]
#[case::short_owner_key("magnet:?xs=urn:btpk:abcd")]
#[case::bad_info_hash("magnet:?xt=urn:btih:xyz")]
fn malformed_identifiers_are_rejected(#[case] identifier: &str) {
    let err = magnet::decode(identifier).unwrap_err();
    assert!(
        matches!(err, CoreError::MalformedIdentifier { .. }),
        "got: {err}"
    );
    assert!(!magnet::is_owned(identifier));
}

#[test]
fn decode_encode_preserves_value() {
    let key = *Keypair::from_seed([11; 32]).public();
    let value = Magnet::immutable(InfoHash::from_hex(IH).unwrap()).with_public_key(key);
    assert_eq!(magnet::decode(&magnet::encode(&value)).unwrap(), value);

    let bare = Magnet::owned(PublicKey::from_hex(PK).unwrap());
    assert_eq!(magnet::decode(&bare.to_string()).unwrap(), bare);
}

#[test]
fn base32_and_hex_topics_decode_to_same_hash() {
    let hex = magnet::decode(&format!("magnet:?xt=urn:btih:{IH}")).unwrap();
    let b32 = magnet::decode(&format!("magnet:?xt=urn:btih:{IH_B32}")).unwrap();
    assert_eq!(hex.info_hash, b32.info_hash);
    assert_eq!(hex, b32);
}

#[test]
fn changed_fields_keep_their_position() {
    let other = InfoHash::from_bytes([7; 20]);
    let decoded = magnet::decode(&format!("magnet:?dn=photos&xt=urn:btih:{IH}&xs=urn:btpk:{PK}"))
        .unwrap()
        .with_info_hash(other);
    assert_eq!(
        decoded.encode(),
        format!(
            "magnet:?dn=photos&xt=urn:btih:{}&xs=urn:btpk:{PK}",
            other.to_hex()
        )
    );

    let key = *Keypair::from_seed([3; 32]).public();
    let added = magnet::decode(&format!("magnet:?dn=photos&xt=urn:btih:{IH}"))
        .unwrap()
        .with_public_key(key);
    assert_eq!(
        added.encode(),
        format!("magnet:?dn=photos&xt=urn:btih:{IH}&xs=urn:btpk:{}", key.to_hex())
    );

    let dropped = magnet::decode(&format!("magnet:?xs=urn:btpk:{PK}&xt=urn:btih:{IH}"))
        .unwrap()
        .without_public_key();
    assert_eq!(dropped.encode(), format!("magnet:?xt=urn:btih:{IH}"));
}
