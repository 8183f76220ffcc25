use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{
	Algorithm, AlgorithmSelection, AtRestEncryptor, AuthenticatedEncryptor, Error,
	PlatformCapability, ProtectedSecret, kdf,
};

/// Size of the master secret generated for every new key.
pub const MASTER_SECRET_LEN: usize = 512 / 8;

const RECORD_VERSION: u8 = 1;

/// An algorithm, and the master secret that per-purpose subkeys for that algorithm are derived
/// from.
///
/// Every [`Key`](super::Key) owns exactly one of these, and it never changes after construction.
#[derive(Debug)]
pub struct EncryptorConfiguration {
	algorithm: Algorithm,
	secret: ProtectedSecret,
}

impl EncryptorConfiguration {
	pub(crate) fn new(algorithm: Algorithm, secret: ProtectedSecret) -> Self {
		Self { algorithm, secret }
	}

	pub fn algorithm(&self) -> Algorithm {
		self.algorithm
	}

	/// Derive the subkey for `purposes` and build an encryptor around it.
	#[tracing::instrument(level = "trace", skip(self))]
	pub(crate) fn create_encryptor(
		&self,
		purposes: &[String],
	) -> Result<AuthenticatedEncryptor, Error> {
		let subkey = kdf::derive_key(
			&self.secret,
			&kdf::purpose_context(purposes),
			self.algorithm.subkey_len(),
		)?;

		AuthenticatedEncryptor::new(&self.algorithm, subkey)
	}

	/// Produce the opaque blob stored in a key descriptor.
	///
	/// The master secret only ever leaves this struct after it has been passed through the
	/// at-rest encryptor.
	#[tracing::instrument(level = "trace", skip(self, at_rest))]
	pub(crate) fn serialize(&self, at_rest: &dyn AtRestEncryptor) -> Result<Vec<u8>, Error> {
		let mut record = Zeroizing::new(Vec::<u8>::new());

		self.secret.use_secret(|secret| {
			ciborium::into_writer(
				&RecordRef {
					version: RECORD_VERSION,
					algorithm: self.algorithm,
					secret,
				},
				&mut *record,
			)
			.map_err(|e| Error::insanity(format!("failed to encode configuration: {e}")))
		})?;

		at_rest.encrypt(&record)
	}

	#[tracing::instrument(level = "trace", skip_all)]
	pub(crate) fn deserialize(blob: &[u8], at_rest: &dyn AtRestEncryptor) -> Result<Self, Error> {
		let record = at_rest.decrypt(blob)?;

		let mut record: Record = ciborium::from_reader(&record[..])
			.map_err(|e| Error::invalid_descriptor(format!("undecodable configuration: {e}")))?;

		if record.version != RECORD_VERSION {
			return Err(Error::invalid_descriptor(format!(
				"unknown configuration version {}",
				record.version
			)));
		}

		if record.secret.is_empty() {
			return Err(Error::invalid_descriptor("empty master secret"));
		}

		Ok(Self::new(
			record.algorithm,
			ProtectedSecret::new(&mut record.secret),
		))
	}
}

#[derive(Serialize)]
struct RecordRef<'a> {
	version: u8,
	algorithm: Algorithm,
	#[serde(with = "serde_bytes")]
	secret: &'a [u8],
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
struct Record {
	#[zeroize(skip)]
	version: u8,
	#[zeroize(skip)]
	algorithm: Algorithm,
	#[serde(with = "serde_bytes")]
	secret: Vec<u8>,
}

/// Creates fresh [`EncryptorConfiguration`]s, each with its own newly generated master secret.
///
/// This is the only place where master key material comes into existence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncryptorConfigurationFactory {
	algorithm: Algorithm,
}

impl EncryptorConfigurationFactory {
	pub fn new(algorithm: Algorithm) -> Self {
		Self { algorithm }
	}

	/// Pick the factory the host has nominated for the given capability tier.
	///
	/// # Errors
	///
	/// Returns [`Error::UnsupportedPlatform`] for [`PlatformCapability::NoNativeSuite`] unless the
	/// host has explicitly chosen a fallback algorithm.
	#[tracing::instrument(level = "debug")]
	pub fn for_capability(
		capability: PlatformCapability,
		selection: &AlgorithmSelection,
	) -> Result<Self, Error> {
		match capability {
			PlatformCapability::ModernSuiteAvailable => Ok(Self::new(selection.modern)),
			PlatformCapability::LegacySuiteAvailable => Ok(Self::new(selection.legacy)),
			PlatformCapability::NoNativeSuite => selection
				.fallback
				.map(Self::new)
				.ok_or(Error::UnsupportedPlatform),
		}
	}

	pub fn algorithm(&self) -> Algorithm {
		self.algorithm
	}

	/// # Errors
	///
	/// Returns [`Error::EntropyUnavailable`] if no secret could be generated.
	#[tracing::instrument(level = "debug")]
	pub fn create_new_configuration(&self) -> Result<EncryptorConfiguration, Error> {
		Ok(EncryptorConfiguration::new(
			self.algorithm,
			ProtectedSecret::random(MASTER_SECRET_LEN)?,
		))
	}
}
