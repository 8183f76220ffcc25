use std::sync::Arc;

use super::{Error, KeyManager, payload};

/// The starting point for creating [`DataProtector`]s.
///
/// Each protector is bound to a *purpose chain*: an ordered list of strings saying what the
/// protected data is for.  Data protected under one chain can only be unprotected under exactly
/// the same chain, so cookies can't be replayed as password reset tokens, and so on.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use strong_ring::{
/// 	DataProtectionProvider, Error, KeyManager, KeyManagerOptions, MemoryRepository,
/// 	NullAtRestEncryptor,
/// };
/// # fn main() -> Result<(), Error> {
///
/// let manager = KeyManager::new(
/// 	Arc::new(MemoryRepository::new()),
/// 	Arc::new(NullAtRestEncryptor::new()),
/// 	KeyManagerOptions::default(),
/// );
/// let provider = DataProtectionProvider::new(Arc::new(manager));
///
/// let app = provider.create_protector("app")?;
/// let v1 = app.create_protector("v1")?;
/// let v2 = app.create_protector("v2")?;
///
/// let blob = v1.protect(b"hello")?;
/// assert_eq!(b"hello".to_vec(), v1.unprotect(&blob)?);
///
/// // Same application, different purpose
/// assert!(matches!(v2.unprotect(&blob), Err(Error::AuthenticationFailed)));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct DataProtectionProvider {
	manager: Arc<KeyManager>,
}

impl DataProtectionProvider {
	pub fn new(manager: Arc<KeyManager>) -> Self {
		Self { manager }
	}

	pub fn key_manager(&self) -> &Arc<KeyManager> {
		&self.manager
	}

	/// Create a protector for a top-level purpose.
	///
	/// # Errors
	///
	/// [`Error::InvalidPurpose`] if `purpose` is empty.
	pub fn create_protector(&self, purpose: impl Into<String>) -> Result<DataProtector, Error> {
		DataProtector::new(self.manager.clone(), Vec::new(), purpose.into())
	}
}

/// Protects and unprotects data for one purpose chain.
#[derive(Clone, Debug)]
pub struct DataProtector {
	manager: Arc<KeyManager>,
	purposes: Vec<String>,
}

impl DataProtector {
	fn new(
		manager: Arc<KeyManager>,
		mut purposes: Vec<String>,
		purpose: String,
	) -> Result<Self, Error> {
		if purpose.is_empty() {
			return Err(Error::invalid_purpose("purposes cannot be empty"));
		}
		purposes.push(purpose);

		Ok(Self { manager, purposes })
	}

	/// Create a protector whose purpose chain is this one's, plus `purpose`.
	pub fn create_protector(&self, purpose: impl Into<String>) -> Result<DataProtector, Error> {
		Self::new(self.manager.clone(), self.purposes.clone(), purpose.into())
	}

	pub fn purposes(&self) -> &[String] {
		&self.purposes
	}

	/// Protect `plaintext` with the current default key.
	///
	/// The result is `version || key id || algorithm id || ciphertext block`.
	///
	/// # Errors
	///
	/// Whatever [`KeyManager::get_current_ring`] can fail with, most notably
	/// [`Error::NoDefaultKeyAvailable`].
	#[tracing::instrument(level = "debug", skip(self, plaintext), fields(purposes = ?self.purposes))]
	pub fn protect(&self, plaintext: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
		let ring = self.manager.get_current_ring()?;
		let key = ring.default_key().ok_or(Error::NoDefaultKeyAvailable)?;

		let header = payload::header(key.id(), key.algorithm_id());
		let block = key
			.configuration()
			.create_encryptor(&self.purposes)?
			.encrypt(plaintext.as_ref(), &header)?;

		tracing::debug!(key_id = %key.id(), "Protected payload");

		let mut blob = Vec::with_capacity(header.len() + block.len());
		blob.extend_from_slice(&header);
		blob.extend_from_slice(&block);

		Ok(blob)
	}

	/// Reverse [`DataProtector::protect`].
	///
	/// Any key the manager can find will do, whether it's active, expired, revoked, or not yet
	/// activated.
	///
	/// # Errors
	///
	/// * [`Error::MalformedPayload`] if `blob` doesn't look like a protected payload at all.
	/// * [`Error::KeyNotFound`] if the key it was protected with can't be found.
	/// * [`Error::AlgorithmMismatch`] if the payload claims a different algorithm to its key.
	/// * [`Error::AuthenticationFailed`] if the payload has been tampered with, or was protected
	///   for a different purpose chain.
	#[tracing::instrument(level = "debug", skip(self, blob), fields(purposes = ?self.purposes))]
	pub fn unprotect(&self, blob: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
		let payload = payload::Payload::try_from(blob.as_ref())?;
		let key = self.manager.get_key(&payload.key_id)?;

		if key.algorithm_id() != payload.algorithm {
			tracing::debug!(key_id = %key.id(), "Algorithm mismatch");
			return Err(Error::AlgorithmMismatch {
				expected: key.algorithm_id(),
				actual: payload.algorithm,
			});
		}

		let plaintext = key
			.configuration()
			.create_encryptor(&self.purposes)?
			.decrypt(payload.block, payload.header);

		match &plaintext {
			Ok(_) => tracing::debug!(key_id = %key.id(), "Unprotected payload"),
			Err(_) => tracing::debug!(key_id = %key.id(), "Payload failed authentication"),
		}

		plaintext
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		KeyId, KeyManagerOptions, KeyStatus, MemoryRepository, NullAtRestEncryptor,
		PlatformCapability, payload::HEADER_LEN, test_support::init,
	};
	use chrono::TimeDelta;

	fn provider_for(capability: PlatformCapability) -> DataProtectionProvider {
		init();
		let manager = KeyManager::new(
			Arc::new(MemoryRepository::new()),
			Arc::new(NullAtRestEncryptor::new()),
			KeyManagerOptions {
				capability: Some(capability),
				..KeyManagerOptions::default()
			},
		);

		DataProtectionProvider::new(Arc::new(manager))
	}

	fn provider() -> DataProtectionProvider {
		provider_for(PlatformCapability::ModernSuiteAvailable)
	}

	fn protector(p: &DataProtectionProvider, purposes: &[&str]) -> DataProtector {
		let (first, rest) = purposes.split_first().unwrap();
		rest.iter()
			.fold(p.create_protector(*first).unwrap(), |dp, purpose| {
				dp.create_protector(*purpose).unwrap()
			})
	}

	#[test]
	fn hello_app_v1() {
		let p = provider();
		let v1 = protector(&p, &["app", "v1"]);

		let blob = v1.protect(b"hello").unwrap();
		let key_id = p
			.key_manager()
			.get_current_ring()
			.unwrap()
			.default_key_id()
			.unwrap();

		assert_eq!(1, blob[0]);
		assert_eq!(key_id.as_bytes()[..], blob[1..17]);
		assert_eq!([2, 0], blob[17..19]);
		// nonce, tag, and five bytes of ciphertext
		assert_eq!(HEADER_LEN + 12 + 16 + 5, blob.len());

		assert_eq!(b"hello".to_vec(), v1.unprotect(&blob).unwrap());

		let v2 = protector(&p, &["app", "v2"]);
		assert!(matches!(
			v2.unprotect(&blob),
			Err(Error::AuthenticationFailed)
		));
	}

	#[test]
	fn round_trips_on_both_suites() {
		for capability in [
			PlatformCapability::ModernSuiteAvailable,
			PlatformCapability::LegacySuiteAvailable,
		] {
			let p = provider_for(capability);
			let dp = protector(&p, &["round", "trip"]);

			for plaintext in [&b""[..], &b"x"[..], &[0u8; 16][..], &[0xffu8; 1000][..]] {
				let blob = dp.protect(plaintext).unwrap();
				assert_eq!(plaintext.to_vec(), dp.unprotect(&blob).unwrap());
			}
		}
	}

	#[test]
	fn legacy_payloads_are_cbc_hmac() {
		let p = provider_for(PlatformCapability::LegacySuiteAvailable);
		let blob = protector(&p, &["app"]).protect(b"hello").unwrap();

		assert_eq!([1, 0], blob[17..19]);
		// IV, one padded block, and the MAC
		assert_eq!(HEADER_LEN + 16 + 16 + 32, blob.len());
	}

	#[test]
	fn purpose_chains_are_isolated() {
		let p = provider();
		let chains: [&[&str]; 4] = [&["a"], &["a", "b"], &["ab"], &["b", "a"]];

		for (i, c1) in chains.iter().enumerate() {
			let blob = protector(&p, c1).protect(b"secret").unwrap();

			for (j, c2) in chains.iter().enumerate() {
				let result = protector(&p, c2).unprotect(&blob);
				if i == j {
					assert_eq!(b"secret".to_vec(), result.unwrap());
				} else {
					assert!(
						matches!(result, Err(Error::AuthenticationFailed)),
						"{c1:?} payload unprotected under {c2:?}"
					);
				}
			}
		}
	}

	#[test]
	fn tampering_is_detected() {
		for capability in [
			PlatformCapability::ModernSuiteAvailable,
			PlatformCapability::LegacySuiteAvailable,
		] {
			let p = provider_for(capability);
			let dp = protector(&p, &["tamper"]);
			let blob = dp.protect(b"don't touch").unwrap();

			for byte in HEADER_LEN..blob.len() {
				for bit in 0..8 {
					let mut tampered = blob.clone();
					tampered[byte] ^= 1 << bit;

					assert!(matches!(
						dp.unprotect(&tampered),
						Err(Error::AuthenticationFailed)
					));
				}
			}
		}
	}

	#[test]
	fn header_tampering() {
		let p = provider();
		let dp = protector(&p, &["header"]);
		let blob = dp.protect(b"hi").unwrap();

		let mut bad_version = blob.clone();
		bad_version[0] = 0;
		assert!(matches!(
			dp.unprotect(&bad_version),
			Err(Error::MalformedPayload(_))
		));

		let mut bad_key = blob.clone();
		bad_key[5] ^= 0x01;
		assert!(matches!(
			dp.unprotect(&bad_key),
			Err(Error::KeyNotFound(_))
		));

		let mut cross_wired = blob.clone();
		cross_wired[17] = 1;
		assert!(matches!(
			dp.unprotect(&cross_wired),
			Err(Error::AlgorithmMismatch {
				expected: crate::AlgorithmId::Gcm,
				actual: crate::AlgorithmId::CbcHmac,
			})
		));

		assert!(matches!(
			dp.unprotect(&blob[..10]),
			Err(Error::MalformedPayload(_))
		));
	}

	#[test]
	fn unknown_key() {
		let p = provider();
		let dp = protector(&p, &["app"]);
		let mut blob = dp.protect(b"hi").unwrap();
		blob[1..17].copy_from_slice(KeyId::from([0x99; 16]).as_bytes());

		assert!(matches!(dp.unprotect(&blob), Err(Error::KeyNotFound(_))));
	}

	#[test]
	fn decrypt_after_expiry_and_revocation() {
		let p = provider();
		let km = p.key_manager();
		let dp = protector(&p, &["long", "lived"]);

		let blob = dp.protect(b"still readable").unwrap();
		let key_id = KeyId::try_from(&blob[1..17]).unwrap();

		km.timewarp(TimeDelta::days(91));
		assert_eq!(b"still readable".to_vec(), dp.unprotect(&blob).unwrap());

		// New protections use a fresh key
		let newer = dp.protect(b"newer").unwrap();
		assert_ne!(blob[1..17], newer[1..17]);

		km.revoke_key(&key_id).unwrap();
		assert_eq!(b"still readable".to_vec(), dp.unprotect(&blob).unwrap());
		assert_eq!(
			KeyStatus::Revoked,
			km.get_key(&key_id).unwrap().status(km.now())
		);
	}

	#[test]
	fn not_yet_active_keys_still_unprotect() {
		let p = provider();
		let km = p.key_manager();
		let dp = protector(&p, &["pending"]);

		let blob = dp.protect(b"early").unwrap();
		let key_id = KeyId::try_from(&blob[1..17]).unwrap();

		// Seen from a host whose clock is running a day behind, the key hasn't activated yet
		km.timewarp(TimeDelta::days(-1));
		assert_eq!(
			KeyStatus::Created,
			km.get_key(&key_id).unwrap().status(km.now())
		);
		assert_eq!(b"early".to_vec(), dp.unprotect(&blob).unwrap());
	}

	#[test]
	fn empty_purposes_are_refused() {
		let p = provider();

		assert!(matches!(
			p.create_protector(""),
			Err(Error::InvalidPurpose(_))
		));
		assert!(matches!(
			p.create_protector("app").unwrap().create_protector(""),
			Err(Error::InvalidPurpose(_))
		));
	}

	#[test]
	fn purpose_chains_accumulate() {
		let p = provider();
		let dp = protector(&p, &["a", "b", "c"]);

		assert_eq!(&["a", "b", "c"][..], dp.purposes());
	}

	#[test]
	fn protectors_are_usable_across_threads() {
		let p = provider();
		let dp = protector(&p, &["threads"]);

		std::thread::scope(|s| {
			for i in 0..8u8 {
				let dp = dp.clone();
				s.spawn(move || {
					let blob = dp.protect([i; 40]).unwrap();
					assert_eq!(vec![i; 40], dp.unprotect(&blob).unwrap());
				});
			}
		});
	}
}
