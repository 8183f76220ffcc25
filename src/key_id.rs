use serde::{Deserialize, Deserializer, Serialize, Serializer};

type Kid = [u8; 16];

/// The 128-bit identifier of a [`Key`](super::Key).
///
/// Identifiers are generated randomly at key creation, and are carried in the clear at the front
/// of every protected payload so the right key can be found for unprotection.
#[allow(clippy::derived_hash_with_manual_eq)] // k1 == k2 => hash(k1) == hash(k2) will hold
#[derive(Clone, Copy, Debug, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct KeyId(Kid);

impl KeyId {
	pub const LEN: usize = 16;

	#[tracing::instrument(level = "trace")]
	pub(crate) fn generate() -> Self {
		Self(uuid::Uuid::new_v4().into_bytes())
	}

	pub fn as_bytes(&self) -> &Kid {
		&self.0
	}
}

impl From<Kid> for KeyId {
	fn from(k: Kid) -> Self {
		Self(k)
	}
}

impl TryFrom<&[u8]> for KeyId {
	type Error = std::array::TryFromSliceError;

	fn try_from(b: &[u8]) -> Result<Self, Self::Error> {
		Ok(Self(b.try_into()?))
	}
}

impl PartialEq for KeyId {
	fn eq(&self, other: &Self) -> bool {
		constant_time_eq::constant_time_eq_n(&self.0, &other.0)
	}
}

impl Eq for KeyId {}

impl std::fmt::Display for KeyId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		for b in &self.0 {
			f.write_fmt(format_args!("{b:02x}"))?;
		}

		Ok(())
	}
}

impl Serialize for KeyId {
	fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_bytes(&self.0)
	}
}

impl<'de> Deserialize<'de> for KeyId {
	fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
		let buf = serde_bytes::ByteBuf::deserialize(d)?;

		KeyId::try_from(&buf[..]).map_err(|_| {
			serde::de::Error::invalid_length(buf.len(), &"a 16 byte key identifier")
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generated_ids_are_unique() {
		let a = KeyId::generate();
		let b = KeyId::generate();

		assert_ne!(a, b);
	}

	#[test]
	fn displays_as_hex() {
		let id = KeyId::from([
			0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
			0x0e, 0xff,
		]);

		assert_eq!("000102030405060708090a0b0c0d0eff", id.to_string());
	}

	#[test]
	fn ordering_is_lexicographic() {
		let low = KeyId::from([0x01; 16]);
		let mut high_bytes = [0x01; 16];
		high_bytes[0] = 0x02;
		let high = KeyId::from(high_bytes);

		assert!(high > low);
	}

	#[test]
	fn wrong_length_is_rejected() {
		assert!(KeyId::try_from(&[0u8; 15][..]).is_err());
		assert!(KeyId::try_from(&[0u8; 16][..]).is_ok());
	}
}
