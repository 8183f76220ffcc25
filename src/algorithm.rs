use serde::{Deserialize, Serialize};

/// The on-the-wire identifier of an authenticated encryption algorithm family.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
pub enum AlgorithmId {
	CbcHmac = 1,
	Gcm = 2,
}

impl AlgorithmId {
	pub fn to_le_bytes(self) -> [u8; 2] {
		(self as u16).to_le_bytes()
	}
}

impl TryFrom<u16> for AlgorithmId {
	type Error = u16;

	fn try_from(n: u16) -> Result<Self, u16> {
		match n {
			1 => Ok(Self::CbcHmac),
			2 => Ok(Self::Gcm),
			n => Err(n),
		}
	}
}

impl std::fmt::Display for AlgorithmId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::CbcHmac => f.write_str("AES-CBC+HMAC-SHA256"),
			Self::Gcm => f.write_str("AES-GCM"),
		}
	}
}

/// Which flavour of AES to use as the block cipher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AesKeySize {
	Aes128,
	#[default]
	Aes256,
}

impl AesKeySize {
	pub fn bytes(self) -> usize {
		match self {
			Self::Aes128 => 16,
			Self::Aes256 => 32,
		}
	}
}

/// An algorithm family together with its parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
	/// AES in CBC mode with PKCS#7 padding, authenticated with HMAC-SHA256 (encrypt-then-MAC).
	CbcHmacSha256 { key_size: AesKeySize },
	/// AES-GCM, with a 96-bit nonce and 128-bit tag.
	Gcm { key_size: AesKeySize },
}

impl Algorithm {
	pub const DEFAULT_CBC_HMAC: Algorithm = Algorithm::CbcHmacSha256 {
		key_size: AesKeySize::Aes256,
	};
	pub const DEFAULT_GCM: Algorithm = Algorithm::Gcm {
		key_size: AesKeySize::Aes256,
	};

	pub fn id(&self) -> AlgorithmId {
		match self {
			Self::CbcHmacSha256 { .. } => AlgorithmId::CbcHmac,
			Self::Gcm { .. } => AlgorithmId::Gcm,
		}
	}

	/// How many bytes of subkey the encryptor for this algorithm needs.
	pub fn subkey_len(&self) -> usize {
		match self {
			Self::CbcHmacSha256 { key_size } => key_size.bytes() + crate::encryptor::HMAC_KEY_LEN,
			Self::Gcm { key_size } => key_size.bytes(),
		}
	}
}
