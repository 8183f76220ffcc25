use arc_swap::ArcSwapOption;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::{
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	time::{Duration, Instant},
};

use super::{
	AtRestEncryptor, EncryptorConfiguration, EncryptorConfigurationFactory, Error, Key,
	KeyDescriptor, KeyId, KeyManagerOptions, KeyRepository, KeyRing, KeyStatus,
	PlatformCapability, clock::Clock,
};

/// Keeps track of every key, creates new ones when needed, and hands out [`KeyRing`]s.
///
/// The manager holds at most one ring at a time.  A ring is reused until it is older than the
/// configured refresh interval, or until something happens that the ring can't answer (no usable
/// default key, or an unprotect for a key id the ring has never heard of).  At that point the
/// repository is listed again, a complete new ring is built, and it replaces the old one in a
/// single atomic swap, so readers never see a ring that's only partly built.
///
/// There are no background tasks; all refreshing happens on the thread that needed it.
/// Concurrent refreshes are collapsed into one, and every repository call gets a deadline of
/// [`KeyManagerOptions::repository_timeout`].
#[derive(Debug)]
pub struct KeyManager {
	repository: Arc<dyn KeyRepository>,
	at_rest: Arc<dyn AtRestEncryptor>,
	options: KeyManagerOptions,
	capability: PlatformCapability,
	factory: Option<EncryptorConfigurationFactory>,

	ring: ArcSwapOption<KeyRing>,
	// Held only while building a new ring
	refresh_lock: Mutex<()>,
	// Repository listings started so far; a ring remembers which one it came from
	listings: AtomicU64,

	time: Clock,
}

impl KeyManager {
	#[tracing::instrument(level = "debug", skip(repository, at_rest))]
	pub fn new(
		repository: Arc<dyn KeyRepository>,
		at_rest: Arc<dyn AtRestEncryptor>,
		options: KeyManagerOptions,
	) -> Self {
		let capability = options.capability.unwrap_or_else(PlatformCapability::detect);

		let factory =
			match EncryptorConfigurationFactory::for_capability(capability, &options.algorithms) {
				Ok(f) => Some(f),
				Err(e) => {
					tracing::warn!(?capability, error = %e, "New keys cannot be created on this platform");
					None
				}
			};

		Self {
			repository,
			at_rest,
			options,
			capability,
			factory,
			ring: ArcSwapOption::empty(),
			refresh_lock: Mutex::new(()),
			listings: AtomicU64::new(0),
			time: Clock::default(),
		}
	}

	pub fn capability(&self) -> PlatformCapability {
		self.capability
	}

	pub fn options(&self) -> &KeyManagerOptions {
		&self.options
	}

	/// Get a key ring that has a usable default key.
	///
	/// If there's no active key anywhere, and automatic key generation is enabled, a new key is
	/// created, persisted, and the ring is resolved once more.
	///
	/// # Errors
	///
	/// * [`Error::RepositoryUnavailable`] if the repository couldn't be listed.
	/// * [`Error::NoDefaultKeyAvailable`] if there's no active key, and one couldn't be created
	///   (because automatic generation is disabled, or the new key couldn't be saved).
	/// * [`Error::EntropyUnavailable`] or [`Error::UnsupportedPlatform`] if a new key was needed
	///   but its secret couldn't be generated.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn get_current_ring(&self) -> Result<Arc<KeyRing>, Error> {
		let now = self.time.now();
		let cached = self.ring.load_full();

		if let Some(ring) = &cached {
			if self.is_fresh(ring, now) && has_usable_default(ring, now) {
				return Ok(ring.clone());
			}
		}

		let ring = self.refresh(cached.as_deref().map_or(0, KeyRing::generation))?;
		if has_usable_default(&ring, now) {
			return Ok(ring);
		}

		if !self.options.auto_generate_keys {
			tracing::warn!("No active key, and automatic key generation is disabled");
			return Err(Error::NoDefaultKeyAvailable);
		}

		let lifetime = to_time_delta(self.options.key_lifetime)?;
		match self.create_new_key(now, now + lifetime) {
			Ok(_) => (),
			Err(Error::RepositoryUnavailable(e)) => {
				tracing::warn!(error = %e, "Failed to persist automatically generated key");
				return Err(Error::NoDefaultKeyAvailable);
			}
			Err(e) => return Err(e),
		}

		let ring = self.refresh(self.listings.load(Ordering::SeqCst))?;
		if has_usable_default(&ring, self.time.now()) {
			Ok(ring)
		} else {
			Err(Error::NoDefaultKeyAvailable)
		}
	}

	/// Find a key by id, for unprotecting data.
	///
	/// The key can be in any state.  If the current ring doesn't know about the key, the
	/// repository is consulted one more time before giving up, in case another process has
	/// created it since the ring was built.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn get_key(&self, id: &KeyId) -> Result<Arc<Key>, Error> {
		// Only a listing that starts after this point can be trusted to say the key doesn't exist
		let requested = self.listings.load(Ordering::SeqCst);
		let ring = self.lookup_ring()?;

		if let Some(key) = ring.get(id) {
			return Ok(key.clone());
		}

		if ring.generation() > requested {
			tracing::debug!(key_id = %id, "Key not found in freshly built ring");
			return Err(Error::KeyNotFound(*id));
		}

		tracing::debug!(key_id = %id, "Key not found in cached ring, refreshing");
		self.refresh(requested)?
			.get(id)
			.cloned()
			.ok_or(Error::KeyNotFound(*id))
	}

	/// Every key the manager knows about, in id order.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn get_all_keys(&self) -> Result<Vec<Arc<Key>>, Error> {
		let ring = self.lookup_ring()?;

		Ok(ring.keys().cloned().collect())
	}

	/// Create and persist a new key, which will be active between the given times.
	///
	/// The cached ring is discarded, so the next resolution will see the new key.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn create_new_key(
		&self,
		activation_at: DateTime<Utc>,
		expiration_at: DateTime<Utc>,
	) -> Result<KeyId, Error> {
		let factory = self.factory.ok_or(Error::UnsupportedPlatform)?;
		let configuration = factory.create_new_configuration()?;

		let descriptor = KeyDescriptor {
			id: KeyId::generate(),
			created_at: self.time.now(),
			activation_at,
			expiration_at,
			revoked: false,
			configuration: configuration.serialize(self.at_rest.as_ref())?,
		};

		self.repository.save(&descriptor, self.deadline())?;
		tracing::info!(key_id = %descriptor.id, algorithm = %factory.algorithm().id(), %activation_at, %expiration_at, "Created new key");

		self.invalidate();
		Ok(descriptor.id)
	}

	/// Withdraw a key from use for protecting new data.
	///
	/// Data already protected with the key can still be unprotected.
	///
	/// # Errors
	///
	/// [`Error::KeyNotFound`] if the repository has no such key.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn revoke_key(&self, id: &KeyId) -> Result<(), Error> {
		let deadline = self.deadline();

		let mut descriptor = self
			.repository
			.list(deadline)?
			.into_iter()
			.find(|d| d.id == *id)
			.ok_or(Error::KeyNotFound(*id))?;

		if !descriptor.revoked {
			descriptor.revoked = true;
			self.repository.save(&descriptor, deadline)?;
			tracing::info!(key_id = %id, "Revoked key");
		}

		self.invalidate();
		Ok(())
	}

	/// Revoke every key in the repository, returning how many were newly revoked.
	///
	/// Unless automatic key generation is disabled, the next protection will create a new key.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn revoke_all_keys(&self) -> Result<usize, Error> {
		let deadline = self.deadline();
		let mut count = 0;

		for mut descriptor in self.repository.list(deadline)? {
			if descriptor.revoked {
				continue;
			}

			descriptor.revoked = true;
			self.repository.save(&descriptor, deadline)?;
			tracing::info!(key_id = %descriptor.id, "Revoked key");
			count += 1;
		}

		self.invalidate();
		Ok(count)
	}

	fn deadline(&self) -> Instant {
		Instant::now() + self.options.repository_timeout
	}

	fn is_fresh(&self, ring: &KeyRing, now: DateTime<Utc>) -> bool {
		to_time_delta(self.options.refresh_interval)
			.is_ok_and(|interval| now.signed_duration_since(ring.built_at()) < interval)
	}

	fn invalidate(&self) {
		let _guard = self.refresh_lock.lock();
		self.ring.store(None);
	}

	/// A ring suitable for looking keys up in.
	fn lookup_ring(&self) -> Result<Arc<KeyRing>, Error> {
		let cached = self.ring.load_full();

		if let Some(ring) = &cached {
			if self.is_fresh(ring, self.time.now()) {
				return Ok(ring.clone());
			}
		}

		self.refresh(cached.as_deref().map_or(0, KeyRing::generation))
	}

	/// Build a new ring from the repository, unless the current ring came from a listing that
	/// started after listing number `after`, in which case it's as new as ours would be.
	#[tracing::instrument(level = "trace", skip(self))]
	fn refresh(&self, after: u64) -> Result<Arc<KeyRing>, Error> {
		let _guard = self.refresh_lock.lock();

		if let Some(current) = self.ring.load_full() {
			if current.generation() > after {
				tracing::debug!(generation = current.generation(), "Ring already refreshed by another caller");
				return Ok(current);
			}
		}

		let generation = self.listings.fetch_add(1, Ordering::SeqCst) + 1;
		let descriptors = self.repository.list(self.deadline())?;
		let keys = descriptors
			.into_iter()
			.filter_map(|d| match self.reconstruct(d) {
				Ok(k) => Some(Arc::new(k)),
				Err((key_id, e)) => {
					tracing::warn!(%key_id, error = %e, "Skipping key that could not be reconstructed");
					None
				}
			})
			.collect::<Vec<_>>();

		let ring = Arc::new(KeyRing::new(keys, self.time.now()).with_generation(generation));
		self.ring.store(Some(ring.clone()));

		Ok(ring)
	}

	fn reconstruct(&self, d: KeyDescriptor) -> Result<Key, (KeyId, Error)> {
		let configuration = EncryptorConfiguration::deserialize(&d.configuration, self.at_rest.as_ref())
			.map_err(|e| (d.id, e))?;

		Ok(Key::new(
			d.id,
			d.created_at,
			d.activation_at,
			d.expiration_at,
			d.revoked,
			configuration,
		))
	}

	#[cfg(test)]
	pub(crate) fn timewarp(&self, delta: TimeDelta) {
		self.time.timewarp(delta)
	}

	#[cfg(test)]
	pub(crate) fn now(&self) -> DateTime<Utc> {
		self.time.now()
	}
}

fn has_usable_default(ring: &KeyRing, now: DateTime<Utc>) -> bool {
	ring.default_key()
		.is_some_and(|k| k.status(now) == KeyStatus::Active)
}

fn to_time_delta(d: Duration) -> Result<TimeDelta, Error> {
	TimeDelta::from_std(d).map_err(|_| Error::insanity(format!("{d:?} is out of range")))
}
