use rand::{TryRngCore as _, rngs::OsRng};
use secrecy::{ExposeSecret as _, SecretSlice};
use zeroize::{Zeroize as _, Zeroizing};

use super::Error;

/// An owned buffer of secret key material.
///
/// The bytes are only ever reachable through [`ProtectedSecret::use_secret`], and are wiped when
/// the secret is dropped.  There is deliberately no `Clone`, `PartialEq`, or serialization support;
/// if you need the same material in two places, you've probably got a design problem.
pub struct ProtectedSecret(SecretSlice<u8>);

impl ProtectedSecret {
	/// Take ownership of the secret material in `bytes`.
	///
	/// The caller's buffer is zeroed once it has been copied in.
	pub fn new(bytes: &mut [u8]) -> Self {
		let secret: SecretSlice<u8> = bytes.to_vec().into();
		bytes.zeroize();

		Self(secret)
	}

	/// Generate `len` bytes of fresh secret material from the operating system's RNG.
	///
	/// # Errors
	///
	/// Returns [`Error::EntropyUnavailable`] if the RNG cannot be read.  There is no fallback to
	/// a weaker source.
	#[tracing::instrument(level = "trace")]
	pub fn random(len: usize) -> Result<Self, Error> {
		let mut buf = Zeroizing::new(vec![0u8; len]);

		OsRng.try_fill_bytes(&mut buf[..]).map_err(|e| {
			tracing::error!(error = %e, "OS RNG unavailable");
			Error::EntropyUnavailable
		})?;

		Ok(Self::new(&mut buf[..]))
	}

	/// Run `f` with transient read access to the secret bytes.
	pub fn use_secret<T>(&self, f: impl FnOnce(&[u8]) -> T) -> T {
		f(self.0.expose_secret())
	}

	pub fn len(&self) -> usize {
		self.0.expose_secret().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl From<Zeroizing<Vec<u8>>> for ProtectedSecret {
	fn from(mut v: Zeroizing<Vec<u8>>) -> Self {
		Self::new(&mut v[..])
	}
}

impl std::fmt::Debug for ProtectedSecret {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ProtectedSecret")
			.field("len", &self.len())
			.finish_non_exhaustive()
	}
}
