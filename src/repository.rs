use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
	collections::BTreeMap,
	fs,
	path::{Path, PathBuf},
	time::Instant,
};

use super::{KeyId, RepositoryError};

/// The durable form of a [`Key`](super::Key).
///
/// The `configuration` is opaque to repositories: it is whatever the key's encryptor
/// configuration serialized itself to, after at-rest encryption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDescriptor {
	pub id: KeyId,
	pub created_at: DateTime<Utc>,
	pub activation_at: DateTime<Utc>,
	pub expiration_at: DateTime<Utc>,
	pub revoked: bool,
	#[serde(with = "serde_bytes")]
	pub configuration: Vec<u8>,
}

/// Somewhere to keep key descriptors.
///
/// Implementations are expected to tolerate the same descriptor being saved more than once, and
/// several processes saving different descriptors at the same time; the key manager does no
/// locking of its own.  Saving a descriptor whose id already exists replaces it.
///
/// Every call comes with a deadline, after which the implementation should give up and return
/// [`RepositoryError::Timeout`] rather than keep the caller waiting.
pub trait KeyRepository: Send + Sync + std::fmt::Debug {
	fn list(&self, deadline: Instant) -> Result<Vec<KeyDescriptor>, RepositoryError>;

	fn save(&self, descriptor: &KeyDescriptor, deadline: Instant) -> Result<(), RepositoryError>;
}

fn check_deadline(deadline: Instant) -> Result<(), RepositoryError> {
	if Instant::now() >= deadline {
		Err(RepositoryError::Timeout)
	} else {
		Ok(())
	}
}

/// A repository that lives and dies with the process.
///
/// Handy for tests, and for hosts that only need protected data to outlive a single request.
#[derive(Debug, Default)]
pub struct MemoryRepository {
	descriptors: RwLock<BTreeMap<KeyId, KeyDescriptor>>,
}

impl MemoryRepository {
	pub fn new() -> Self {
		Self::default()
	}
}

impl KeyRepository for MemoryRepository {
	#[tracing::instrument(level = "trace", skip(self))]
	fn list(&self, deadline: Instant) -> Result<Vec<KeyDescriptor>, RepositoryError> {
		check_deadline(deadline)?;

		Ok(self.descriptors.read().values().cloned().collect())
	}

	#[tracing::instrument(level = "trace", skip(self, descriptor), fields(key_id = %descriptor.id))]
	fn save(&self, descriptor: &KeyDescriptor, deadline: Instant) -> Result<(), RepositoryError> {
		check_deadline(deadline)?;

		self.descriptors
			.write()
			.insert(descriptor.id, descriptor.clone());
		Ok(())
	}
}

/// A repository that keeps one CBOR file per key in a directory.
///
/// Files are named `key-<hex id>.cbor`, and are written to a temporary name and then renamed
/// into place, so readers never see a half-written descriptor.
#[derive(Debug)]
pub struct FileSystemRepository {
	dir: PathBuf,
}

const FILE_PREFIX: &str = "key-";
const FILE_SUFFIX: &str = ".cbor";

impl FileSystemRepository {
	/// Use `dir` as the repository, creating it if need be.
	pub fn new(dir: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
		let dir = dir.into();
		fs::create_dir_all(&dir)?;

		Ok(Self { dir })
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	fn path_for(&self, id: &KeyId) -> PathBuf {
		self.dir.join(format!("{FILE_PREFIX}{id}{FILE_SUFFIX}"))
	}
}

impl KeyRepository for FileSystemRepository {
	#[tracing::instrument(level = "trace", skip(self), fields(dir = %self.dir.display()))]
	fn list(&self, deadline: Instant) -> Result<Vec<KeyDescriptor>, RepositoryError> {
		let mut descriptors = Vec::new();

		for entry in fs::read_dir(&self.dir)? {
			check_deadline(deadline)?;

			let path = entry?.path();
			let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
				continue;
			};
			if !(name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)) {
				continue;
			}

			let bytes = fs::read(&path)?;
			match ciborium::from_reader::<KeyDescriptor, _>(&bytes[..]) {
				Ok(d) => descriptors.push(d),
				Err(e) => {
					tracing::warn!(path = %path.display(), error = %e, "Skipping undecodable key descriptor");
				}
			}
		}

		Ok(descriptors)
	}

	#[tracing::instrument(level = "trace", skip(self, descriptor), fields(key_id = %descriptor.id))]
	fn save(&self, descriptor: &KeyDescriptor, deadline: Instant) -> Result<(), RepositoryError> {
		check_deadline(deadline)?;

		let mut bytes = Vec::new();
		ciborium::into_writer(descriptor, &mut bytes)
			.map_err(|e| RepositoryError::Encoding(e.to_string()))?;

		let tmp = self
			.dir
			.join(format!(".{}.{}.tmp", descriptor.id, uuid::Uuid::new_v4()));
		fs::write(&tmp, &bytes)?;

		if let Err(e) = fs::rename(&tmp, self.path_for(&descriptor.id)) {
			let _ = fs::remove_file(&tmp);
			return Err(e.into());
		}

		Ok(())
	}
}
