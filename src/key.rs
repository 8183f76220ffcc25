use chrono::{DateTime, Utc};

use super::{AlgorithmId, EncryptorConfiguration, KeyId};

/// Where a [`Key`] is in its lifecycle, as at a particular instant.
///
/// Every status can still be used to unprotect data; only [`KeyStatus::Active`] keys are
/// eligible to protect new data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyStatus {
	/// Not yet activated.
	Created,
	/// Activated, not expired, and not revoked.
	Active,
	/// Past its expiration date.
	Expired,
	/// Explicitly withdrawn from use.
	Revoked,
}

/// A single, identified, time-limited key.
///
/// Keys are only ever constructed by the [`KeyManager`](super::KeyManager), either when creating
/// a brand new key, or when reconstructing one from the repository.  Nothing in a key changes
/// after construction; revocation is recorded in the repository and shows up in the next key
/// ring.
#[derive(Debug)]
pub struct Key {
	id: KeyId,
	created_at: DateTime<Utc>,
	activation_at: DateTime<Utc>,
	expiration_at: DateTime<Utc>,
	revoked: bool,
	configuration: EncryptorConfiguration,
}

impl Key {
	pub(crate) fn new(
		id: KeyId,
		created_at: DateTime<Utc>,
		activation_at: DateTime<Utc>,
		expiration_at: DateTime<Utc>,
		revoked: bool,
		configuration: EncryptorConfiguration,
	) -> Self {
		Self {
			id,
			created_at,
			activation_at,
			expiration_at,
			revoked,
			configuration,
		}
	}

	pub fn id(&self) -> KeyId {
		self.id
	}

	pub fn created_at(&self) -> DateTime<Utc> {
		self.created_at
	}

	pub fn activation_at(&self) -> DateTime<Utc> {
		self.activation_at
	}

	pub fn expiration_at(&self) -> DateTime<Utc> {
		self.expiration_at
	}

	pub fn is_revoked(&self) -> bool {
		self.revoked
	}

	pub fn algorithm_id(&self) -> AlgorithmId {
		self.configuration.algorithm().id()
	}

	pub(crate) fn configuration(&self) -> &EncryptorConfiguration {
		&self.configuration
	}

	/// Where the key is in its lifecycle at `now`.
	///
	/// The checks are made in this order, and the first that matches wins:
	///
	/// 1. revoked keys are [`KeyStatus::Revoked`], even if they haven't activated yet;
	/// 2. keys whose activation time is after `now` are [`KeyStatus::Created`];
	/// 3. keys whose expiration time is at or before `now` are [`KeyStatus::Expired`];
	/// 4. everything else is [`KeyStatus::Active`].
	///
	/// Only active keys can become a ring's default, so the order of the first two only affects
	/// what gets reported.
	pub fn status(&self, now: DateTime<Utc>) -> KeyStatus {
		if self.revoked {
			KeyStatus::Revoked
		} else if self.activation_at > now {
			KeyStatus::Created
		} else if now >= self.expiration_at {
			KeyStatus::Expired
		} else {
			KeyStatus::Active
		}
	}
}
