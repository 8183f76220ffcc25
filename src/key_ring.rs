use chrono::{DateTime, Utc};
use std::{collections::BTreeMap, sync::Arc};

use super::{Key, KeyId, KeyStatus};

/// An immutable snapshot of every known key, and which of them new data should be protected
/// with.
///
/// Rings are never edited; when the key manager learns something new, it builds a whole new
/// ring and swaps it in.
#[derive(Debug)]
pub struct KeyRing {
	keys: BTreeMap<KeyId, Arc<Key>>,
	default_key_id: Option<KeyId>,
	built_at: DateTime<Utc>,
	// Which repository listing this ring was built from
	generation: u64,
}

impl KeyRing {
	/// Build a ring from `keys`, choosing the default as at `now`.
	///
	/// The default is the [`KeyStatus::Active`] key with the latest activation time.  Ties go to
	/// the key with the greatest id, which is arbitrary, but at least every process sharing a
	/// repository will make the same arbitrary choice.
	#[tracing::instrument(level = "trace", skip(keys))]
	pub(crate) fn new(keys: impl IntoIterator<Item = Arc<Key>>, now: DateTime<Utc>) -> Self {
		let keys: BTreeMap<KeyId, Arc<Key>> = keys.into_iter().map(|k| (k.id(), k)).collect();

		let default_key_id = keys
			.values()
			.filter(|k| k.status(now) == KeyStatus::Active)
			.max_by_key(|k| (k.activation_at(), k.id()))
			.map(|k| k.id());

		match default_key_id {
			Some(key_id) => tracing::debug!(%key_id, keys = keys.len(), "Selected default key"),
			None => tracing::debug!(keys = keys.len(), "No active key available"),
		}

		Self {
			keys,
			default_key_id,
			built_at: now,
			generation: 0,
		}
	}

	pub(crate) fn with_generation(self, generation: u64) -> Self {
		Self { generation, ..self }
	}

	pub fn default_key_id(&self) -> Option<KeyId> {
		self.default_key_id
	}

	pub fn default_key(&self) -> Option<&Arc<Key>> {
		self.default_key_id.and_then(|id| self.keys.get(&id))
	}

	pub fn get(&self, id: &KeyId) -> Option<&Arc<Key>> {
		self.keys.get(id)
	}

	pub fn keys(&self) -> impl Iterator<Item = &Arc<Key>> {
		self.keys.values()
	}

	pub fn len(&self) -> usize {
		self.keys.len()
	}

	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}

	pub fn built_at(&self) -> DateTime<Utc> {
		self.built_at
	}

	pub(crate) fn generation(&self) -> u64 {
		self.generation
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{Algorithm, EncryptorConfigurationFactory};
	use chrono::TimeDelta;

	fn key(id: [u8; 16], activation_at: DateTime<Utc>, revoked: bool) -> Arc<Key> {
		Arc::new(Key::new(
			KeyId::from(id),
			activation_at,
			activation_at,
			activation_at + TimeDelta::days(90),
			revoked,
			EncryptorConfigurationFactory::new(Algorithm::DEFAULT_GCM)
				.create_new_configuration()
				.unwrap(),
		))
	}

	#[test]
	fn latest_activation_wins() {
		let t0 = Utc::now() - TimeDelta::days(2);
		let t1 = t0 + TimeDelta::days(1);
		let a = key([0xff; 16], t0, false);
		let b = key([0x01; 16], t1, false);

		let ring = KeyRing::new([a.clone(), b.clone()], Utc::now());
		assert_eq!(Some(b.id()), ring.default_key_id());
		assert_eq!(2, ring.len());
	}

	#[test]
	fn ties_go_to_the_greatest_id() {
		let t0 = Utc::now() - TimeDelta::days(1);
		let a = key([0x01; 16], t0, false);
		let b = key([0x02; 16], t0, false);

		let ring = KeyRing::new([b.clone(), a.clone()], Utc::now());
		assert_eq!(Some(b.id()), ring.default_key_id());

		let ring = KeyRing::new([a, b.clone()], Utc::now());
		assert_eq!(Some(b.id()), ring.default_key_id());
	}

	#[test]
	fn inactive_keys_are_never_default() {
		let now = Utc::now();
		let revoked = key([0x01; 16], now - TimeDelta::days(1), true);
		let pending = key([0x02; 16], now + TimeDelta::days(1), false);
		let expired = key([0x03; 16], now - TimeDelta::days(100), false);

		let ring = KeyRing::new([revoked.clone(), pending, expired], now);
		assert_eq!(None, ring.default_key_id());
		assert!(ring.default_key().is_none());

		// ... but they're all still there for decryption
		assert_eq!(3, ring.len());
		assert!(ring.get(&revoked.id()).is_some());
	}

	#[test]
	fn empty_ring() {
		let ring = KeyRing::new(Vec::new(), Utc::now());

		assert!(ring.is_empty());
		assert_eq!(None, ring.default_key_id());
	}
}
