//! bt-mut core library: keys, magnet codec, and the per-directory state
//! that backs a mutable publication.
//!
//! - [`types`]: public/secret keys, keypairs, info-hashes
//! - [`magnet`]: magnet identifier codec, including the owner extension
//! - [`vault`]: secret-key storage indexed by public key
//! - [`pointer`]: the `.bt` pointer file inside a synchronized directory
//! - [`sequence`]: monotonic sequence guard for owned publications
//! - [`config`]: storage roots resolved once at startup
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod error;
pub mod magnet;
pub mod pointer;
pub mod sequence;
pub mod types;
pub mod vault;

pub use config::Config;
pub use error::CoreError;
pub use magnet::Magnet;
pub use sequence::SequenceGuard;
pub use types::{InfoHash, Keypair, PublicKey, SecretKey};
pub use vault::KeyVault;
