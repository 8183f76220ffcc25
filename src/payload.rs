use super::{AlgorithmId, Error, KeyId};

pub(crate) const PAYLOAD_VERSION: u8 = 1;
pub(crate) const HEADER_LEN: usize = 1 + KeyId::LEN + 2;

/// Build the fixed-size header that starts every protected payload.
///
/// The header doubles as the associated data for the encryptor, so the key id and algorithm can't
/// be swapped out from under a ciphertext.
pub(crate) fn header(key_id: KeyId, algorithm: AlgorithmId) -> [u8; HEADER_LEN] {
	let mut h = [0u8; HEADER_LEN];

	h[0] = PAYLOAD_VERSION;
	h[1..1 + KeyId::LEN].copy_from_slice(key_id.as_bytes());
	h[1 + KeyId::LEN..].copy_from_slice(&algorithm.to_le_bytes());

	h
}

/// A protected payload, split into its parts, borrowing from the original bytes.
#[derive(Clone, Debug)]
pub(crate) struct Payload<'a> {
	pub(crate) header: &'a [u8],
	pub(crate) key_id: KeyId,
	pub(crate) algorithm: AlgorithmId,
	pub(crate) block: &'a [u8],
}

impl<'a> TryFrom<&'a [u8]> for Payload<'a> {
	type Error = Error;

	fn try_from(b: &'a [u8]) -> Result<Self, Self::Error> {
		if b.len() < HEADER_LEN {
			return Err(Error::malformed_payload("too short"));
		}

		let (header, block) = b.split_at(HEADER_LEN);

		if header[0] != PAYLOAD_VERSION {
			tracing::debug!(expected = PAYLOAD_VERSION, actual = header[0]);
			return Err(Error::malformed_payload("unknown version"));
		}

		let key_id = KeyId::try_from(&header[1..1 + KeyId::LEN])
			.map_err(|_| Error::insanity("key id slice did not fit into key id"))?;

		let raw_alg = u16::from_le_bytes([header[1 + KeyId::LEN], header[2 + KeyId::LEN]]);
		let algorithm = AlgorithmId::try_from(raw_alg)
			.map_err(|n| Error::malformed_payload(format!("unknown algorithm {n}")))?;

		Ok(Self {
			header,
			key_id,
			algorithm,
			block,
		})
	}
}
