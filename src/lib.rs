//! Purpose-scoped authenticated encryption over a rotating, persisted set of keys.
//!
//! If you need to hand some bytes (a cookie, a password reset token, a bit of session state) to
//! someone you don't trust, and get them back later knowing they haven't been read or fiddled
//! with, then this crate is for you.  You never handle a key yourself: a [`KeyManager`] creates
//! keys when it needs them, stores them in a [`KeyRepository`] of your choosing, retires them
//! when they expire, and keeps the old ones around so that anything protected under them can
//! still be unprotected.
//!
//! Protection happens through a [`DataProtector`], which is bound to a *purpose chain* (say,
//! `["my-app", "session"]`).  Every purpose chain gets its own subkeys, derived from each key's
//! master secret, so data protected for one purpose is useless for any other.  Protected
//! payloads look like this:
//!
//! ```text
//! +---------+-------------+-------------------+------------------+
//! | version | key id      | algorithm id      | ciphertext block |
//! | 1 byte  | 16 bytes    | u16, little-endian| ...              |
//! +---------+-------------+-------------------+------------------+
//! ```
//!
//! The block is `nonce || tag || ciphertext` for AES-GCM, and `iv || ciphertext || mac` for
//! AES-CBC with HMAC-SHA256.  Which of the two is used for new keys depends on what the host
//! supports; see [`PlatformCapability`] and [`AlgorithmSelection`].
//!
//! # Key Lifecycle
//!
//! Every [`Key`] has an activation time and an expiration time, and may be revoked.  At any
//! moment, the newest active key is the *default*, and is used to protect new data.  Keys that
//! aren't active (not yet activated, expired, or revoked) are never used to protect anything,
//! but are always available to unprotect.  When there's no active key at all, the manager makes
//! a new one, valid for 90 days.
//!
//! The set of keys the manager knows about is kept in an immutable [`KeyRing`], which is rebuilt
//! from the repository every couple of minutes, or sooner if a payload turns up that was
//! protected with a key the ring doesn't know about.
mod error;
mod secret;

mod algorithm;
mod capability;
mod configuration;
mod encryptor;
mod kdf;

mod key;
mod key_id;
mod key_ring;

mod at_rest;
mod clock;
mod key_manager;
mod options;
mod payload;
mod protector;
mod repository;

pub use algorithm::{AesKeySize, Algorithm, AlgorithmId};
pub use at_rest::{AtRestEncryptor, ChaChaAtRestEncryptor, NullAtRestEncryptor};
pub use capability::PlatformCapability;
pub use configuration::{EncryptorConfiguration, EncryptorConfigurationFactory, MASTER_SECRET_LEN};
pub use error::{Error, RepositoryError};
pub use key::{Key, KeyStatus};
pub use key_id::KeyId;
pub use key_manager::KeyManager;
pub use key_ring::KeyRing;
pub use options::{AlgorithmSelection, KeyManagerOptions};
pub use protector::{DataProtectionProvider, DataProtector};
pub use repository::{FileSystemRepository, KeyDescriptor, KeyRepository, MemoryRepository};
pub use secret::ProtectedSecret;

use encryptor::AuthenticatedEncryptor;

#[cfg(test)]
mod test_support {
	use std::sync::Once;
	use tracing_subscriber::{layer::SubscriberExt as _, registry::Registry};

	static INIT: Once = Once::new();

	pub(crate) fn init() {
		INIT.call_once(|| {
			let layer = tracing_tree::HierarchicalLayer::default()
				.with_writer(tracing_subscriber::fmt::TestWriter::new())
				.with_indent_lines(true)
				.with_indent_amount(2)
				.with_targets(true);

			let sub = Registry::default().with(layer);
			tracing::subscriber::set_global_default(sub).unwrap();
		});
	}
}
