use chacha20poly1305::{
	ChaCha20Poly1305, KeyInit as _,
	aead::{Aead as _, Payload},
};
use rand::{TryRngCore as _, rngs::OsRng};
use secrecy::{ExposeSecret as _, SecretBox};
use zeroize::{Zeroize as _, Zeroizing};

use super::Error;

/// Protects serialized key configurations before they are handed to a
/// [`KeyRepository`](super::KeyRepository).
///
/// The key manager never calls this directly; configurations route their own serialized form
/// through it.
pub trait AtRestEncryptor: Send + Sync + std::fmt::Debug {
	fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error>;

	fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error>;
}

/// Stores configurations exactly as they are serialized, master secret and all.
///
/// Only appropriate when the repository itself is adequately protected.
#[derive(Debug)]
pub struct NullAtRestEncryptor(());

impl NullAtRestEncryptor {
	pub fn new() -> Self {
		tracing::warn!("Key material will be stored unencrypted at rest");
		Self(())
	}
}

impl Default for NullAtRestEncryptor {
	fn default() -> Self {
		Self::new()
	}
}

impl AtRestEncryptor for NullAtRestEncryptor {
	fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
		Ok(plaintext.to_vec())
	}

	fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
		Ok(Zeroizing::new(ciphertext.to_vec()))
	}
}

// This makes more sense in base64
const AT_REST_MAGIC: [u8; 3] = [0xb1, 0xab, 0x5e];
const AT_REST_CONTEXT: &[u8] = b"strong-ring::key-configuration";
const NONCE_LEN: usize = 12;

/// Encrypts configurations with ChaCha20-Poly1305 under a key the host keeps somewhere other
/// than the repository.
pub struct ChaChaAtRestEncryptor {
	key: SecretBox<[u8; 32]>,
}

impl ChaChaAtRestEncryptor {
	/// Take a copy of `key`, and wipe the original.
	pub fn new(key: &mut [u8; 32]) -> Self {
		let this = Self {
			key: Box::new(*key).into(),
		};
		key.zeroize();

		this
	}
}

impl std::fmt::Debug for ChaChaAtRestEncryptor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChaChaAtRestEncryptor").finish_non_exhaustive()
	}
}

impl AtRestEncryptor for ChaChaAtRestEncryptor {
	#[tracing::instrument(level = "trace", skip_all)]
	fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
		let cipher = ChaCha20Poly1305::new(self.key.expose_secret().into());
		let mut nonce = [0u8; NONCE_LEN];
		OsRng
			.try_fill_bytes(&mut nonce)
			.map_err(|_| Error::EntropyUnavailable)?;

		let ciphertext = cipher
			.encrypt(
				(&nonce).into(),
				Payload {
					msg: plaintext,
					aad: AT_REST_CONTEXT,
				},
			)
			.map_err(|_| Error::insanity("at-rest encryption failed"))?;

		let mut v = Vec::with_capacity(AT_REST_MAGIC.len() + NONCE_LEN + ciphertext.len());
		v.extend_from_slice(&AT_REST_MAGIC);
		v.extend_from_slice(&nonce);
		v.extend_from_slice(&ciphertext);

		Ok(v)
	}

	#[tracing::instrument(level = "trace", skip_all)]
	fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
		if ciphertext.len() < AT_REST_MAGIC.len() + NONCE_LEN {
			return Err(Error::invalid_descriptor("at-rest ciphertext too short"));
		}

		let (magic, rest) = ciphertext.split_at(AT_REST_MAGIC.len());
		if magic != AT_REST_MAGIC {
			tracing::debug!(magic=?AT_REST_MAGIC, actual=?magic);
			return Err(Error::invalid_descriptor("incorrect at-rest magic"));
		}

		let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
		let cipher = ChaCha20Poly1305::new(self.key.expose_secret().into());

		cipher
			.decrypt(
				nonce.into(),
				Payload {
					msg: ciphertext,
					aad: AT_REST_CONTEXT,
				},
			)
			.map(Zeroizing::new)
			.map_err(|_| Error::invalid_descriptor("at-rest decryption failed"))
	}
}
