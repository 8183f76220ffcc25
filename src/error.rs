use super::{AlgorithmId, KeyId};

#[derive(Debug, thiserror::Error, thiserror_ext::Construct)]
#[non_exhaustive]
pub enum Error {
	#[error("secure random number generator is unavailable")]
	EntropyUnavailable,

	#[error("no default key is available for protecting data")]
	NoDefaultKeyAvailable,

	#[error("key {0} was not found in the key ring")]
	KeyNotFound(KeyId),

	#[error("failed to authenticate payload")]
	AuthenticationFailed,

	#[error("malformed payload: {0}")]
	MalformedPayload(String),

	#[error("payload was produced by {actual}, but key is configured for {expected}")]
	AlgorithmMismatch {
		expected: AlgorithmId,
		actual: AlgorithmId,
	},

	#[error("key repository unavailable: {0}")]
	RepositoryUnavailable(#[from] RepositoryError),

	#[error("invalid purpose: {0}")]
	InvalidPurpose(String),

	#[error("invalid key descriptor: {0}")]
	InvalidDescriptor(String),

	#[error("no authenticated encryption suite is available on this platform")]
	UnsupportedPlatform,

	#[error("CAN'T HAPPEN: {0}")]
	Insanity(String),
}

/// Failures reported by a [`KeyRepository`](super::KeyRepository) implementation.
///
/// These are always surfaced to callers of the key manager as
/// [`Error::RepositoryUnavailable`], and are generally worth retrying.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RepositoryError {
	#[error("deadline exceeded")]
	Timeout,

	#[error("I/O failure: {0}")]
	Io(#[from] std::io::Error),

	#[error("descriptor encoding failure: {0}")]
	Encoding(String),

	#[error("{0}")]
	Other(String),
}
