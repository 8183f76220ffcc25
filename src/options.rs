use std::time::Duration;

use super::{Algorithm, PlatformCapability};

/// Which algorithm new keys should use, for each [`PlatformCapability`] tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlgorithmSelection {
	pub modern: Algorithm,
	pub legacy: Algorithm,
	/// What to use when the platform can't tell us what it supports.
	///
	/// There is no default; a host running on such a platform has to opt in, otherwise key
	/// creation fails with [`Error::UnsupportedPlatform`](super::Error::UnsupportedPlatform).
	pub fallback: Option<Algorithm>,
}

impl Default for AlgorithmSelection {
	fn default() -> Self {
		Self {
			modern: Algorithm::DEFAULT_GCM,
			legacy: Algorithm::DEFAULT_CBC_HMAC,
			fallback: None,
		}
	}
}

/// Tunables for a [`KeyManager`](super::KeyManager).
#[derive(Clone, Debug)]
pub struct KeyManagerOptions {
	/// How long a key ring is trusted before the repository is consulted again.
	pub refresh_interval: Duration,
	/// How long automatically generated keys stay active for.
	pub key_lifetime: Duration,
	/// Whether to create a key when there is no active one.
	pub auto_generate_keys: bool,
	/// How long any single repository call may take.
	pub repository_timeout: Duration,
	/// Override the detected platform capability.
	pub capability: Option<PlatformCapability>,
	pub algorithms: AlgorithmSelection,
}

impl Default for KeyManagerOptions {
	fn default() -> Self {
		Self {
			refresh_interval: Duration::from_secs(2 * 60),
			key_lifetime: Duration::from_secs(90 * 24 * 3600),
			auto_generate_keys: true,
			repository_timeout: Duration::from_secs(30),
			capability: None,
			algorithms: AlgorithmSelection::default(),
		}
	}
}
