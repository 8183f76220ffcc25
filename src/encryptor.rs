use aes::{Aes128, Aes256};
use aes_gcm::{
	Aes128Gcm, Aes256Gcm,
	aead::{AeadInPlace, KeyInit, generic_array::GenericArray},
};
use cbc::cipher::{BlockDecryptMut as _, BlockEncryptMut as _, KeyIvInit as _, block_padding::Pkcs7};
use hmac::{Hmac, Mac};
use rand::{TryRngCore as _, rngs::OsRng};
use sha2::Sha256;

use super::{AesKeySize, Algorithm, Error, ProtectedSecret, kdf};

type HmacSha256 = Hmac<Sha256>;

pub(crate) const HMAC_KEY_LEN: usize = 32;
const MAC_LEN: usize = 32;
const CBC_IV_LEN: usize = 16;
const GCM_NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;

/// Performs authenticated encryption and decryption under one derived subkey.
///
/// Which algorithm is used is fixed by the [`Algorithm`] the encryptor was built for; there is no
/// negotiation.  Every encryption uses a fresh random nonce or IV, and every decryption failure,
/// whatever its cause, is reported as [`Error::AuthenticationFailed`].
#[derive(Debug)]
pub(crate) enum AuthenticatedEncryptor {
	CbcHmac {
		key_size: AesKeySize,
		encryption_key: ProtectedSecret,
		validation_key: ProtectedSecret,
	},
	Gcm {
		key_size: AesKeySize,
		key: ProtectedSecret,
	},
}

impl AuthenticatedEncryptor {
	#[tracing::instrument(level = "trace", skip(subkey))]
	pub(crate) fn new(algorithm: &Algorithm, subkey: ProtectedSecret) -> Result<Self, Error> {
		if subkey.len() != algorithm.subkey_len() {
			return Err(Error::insanity(format!(
				"{} byte subkey given to {} encryptor",
				subkey.len(),
				algorithm.id()
			)));
		}

		Ok(match *algorithm {
			Algorithm::CbcHmacSha256 { key_size } => {
				// One subkey comes in, two independent keys come out
				let mut enc_ctx = Vec::new();
				kdf::push_length_prefixed(&mut enc_ctx, b"cbc-hmac::encryption");
				let mut val_ctx = Vec::new();
				kdf::push_length_prefixed(&mut val_ctx, b"cbc-hmac::validation");

				Self::CbcHmac {
					key_size,
					encryption_key: kdf::derive_key(&subkey, &enc_ctx, key_size.bytes())?,
					validation_key: kdf::derive_key(&subkey, &val_ctx, HMAC_KEY_LEN)?,
				}
			}
			Algorithm::Gcm { key_size } => Self::Gcm { key_size, key: subkey },
		})
	}

	#[tracing::instrument(level = "trace", skip_all)]
	pub(crate) fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, Error> {
		match self {
			Self::CbcHmac {
				key_size,
				encryption_key,
				validation_key,
			} => {
				let iv: [u8; CBC_IV_LEN] = random_bytes()?;

				let ciphertext = encryption_key.use_secret(|k| match key_size {
					AesKeySize::Aes128 => cbc::Encryptor::<Aes128>::new_from_slices(k, &iv)
						.map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
					AesKeySize::Aes256 => cbc::Encryptor::<Aes256>::new_from_slices(k, &iv)
						.map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
				})
				.map_err(|_| Error::insanity("CBC key length mismatch"))?;

				let mac = cbc_mac(validation_key, aad, &iv, &ciphertext)?.finalize();

				let mut block = Vec::with_capacity(CBC_IV_LEN + ciphertext.len() + MAC_LEN);
				block.extend_from_slice(&iv);
				block.extend_from_slice(&ciphertext);
				block.extend_from_slice(&mac.into_bytes());

				Ok(block)
			}
			Self::Gcm { key_size, key } => {
				let nonce: [u8; GCM_NONCE_LEN] = random_bytes()?;
				let mut buf = plaintext.to_vec();

				let tag = key.use_secret(|k| match key_size {
					AesKeySize::Aes128 => gcm_seal::<Aes128Gcm>(k, &nonce, aad, &mut buf),
					AesKeySize::Aes256 => gcm_seal::<Aes256Gcm>(k, &nonce, aad, &mut buf),
				})?;

				let mut block = Vec::with_capacity(GCM_NONCE_LEN + GCM_TAG_LEN + buf.len());
				block.extend_from_slice(&nonce);
				block.extend_from_slice(&tag);
				block.extend_from_slice(&buf);

				Ok(block)
			}
		}
	}

	#[tracing::instrument(level = "trace", skip_all)]
	pub(crate) fn decrypt(&self, block: &[u8], aad: &[u8]) -> Result<Vec<u8>, Error> {
		match self {
			Self::CbcHmac {
				key_size,
				encryption_key,
				validation_key,
			} => {
				// The smallest possible block is an IV, one block of padding, and the MAC
				if block.len() < CBC_IV_LEN + 16 + MAC_LEN {
					return Err(Error::AuthenticationFailed);
				}

				let (iv, rest) = block.split_at(CBC_IV_LEN);
				let (ciphertext, mac) = rest.split_at(rest.len() - MAC_LEN);

				cbc_mac(validation_key, aad, iv, ciphertext)?
					.verify_slice(mac)
					.map_err(|_| Error::AuthenticationFailed)?;

				encryption_key
					.use_secret(|k| match key_size {
						AesKeySize::Aes128 => cbc::Decryptor::<Aes128>::new_from_slices(k, iv)
							.map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
						AesKeySize::Aes256 => cbc::Decryptor::<Aes256>::new_from_slices(k, iv)
							.map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
					})
					.map_err(|_| Error::insanity("CBC key length mismatch"))?
					.map_err(|_| Error::AuthenticationFailed)
			}
			Self::Gcm { key_size, key } => {
				if block.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
					return Err(Error::AuthenticationFailed);
				}

				let (nonce, rest) = block.split_at(GCM_NONCE_LEN);
				let (tag, ciphertext) = rest.split_at(GCM_TAG_LEN);
				let mut buf = ciphertext.to_vec();

				key.use_secret(|k| match key_size {
					AesKeySize::Aes128 => gcm_open::<Aes128Gcm>(k, nonce, tag, aad, &mut buf),
					AesKeySize::Aes256 => gcm_open::<Aes256Gcm>(k, nonce, tag, aad, &mut buf),
				})?;

				Ok(buf)
			}
		}
	}
}

fn random_bytes<const N: usize>() -> Result<[u8; N], Error> {
	let mut b = [0u8; N];

	OsRng
		.try_fill_bytes(&mut b)
		.map_err(|_| Error::EntropyUnavailable)?;

	Ok(b)
}

fn cbc_mac(
	validation_key: &ProtectedSecret,
	aad: &[u8],
	iv: &[u8],
	ciphertext: &[u8],
) -> Result<HmacSha256, Error> {
	let mut mac = validation_key
		.use_secret(|k| <HmacSha256 as Mac>::new_from_slice(k))
		.map_err(|_| Error::insanity("HMAC key rejected"))?;

	mac.update(&(aad.len() as u64).to_be_bytes());
	mac.update(aad);
	mac.update(iv);
	mac.update(ciphertext);

	Ok(mac)
}

fn gcm_seal<C: KeyInit + AeadInPlace>(
	key: &[u8],
	nonce: &[u8],
	aad: &[u8],
	buf: &mut [u8],
) -> Result<Vec<u8>, Error> {
	let cipher = C::new_from_slice(key).map_err(|_| Error::insanity("GCM key length mismatch"))?;

	let tag = cipher
		.encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, buf)
		.map_err(|_| Error::insanity("GCM encryption failed"))?;

	Ok(tag.to_vec())
}

fn gcm_open<C: KeyInit + AeadInPlace>(
	key: &[u8],
	nonce: &[u8],
	tag: &[u8],
	aad: &[u8],
	buf: &mut [u8],
) -> Result<(), Error> {
	let cipher = C::new_from_slice(key).map_err(|_| Error::insanity("GCM key length mismatch"))?;

	cipher
		.decrypt_in_place_detached(
			GenericArray::from_slice(nonce),
			aad,
			buf,
			GenericArray::from_slice(tag),
		)
		.map_err(|_| Error::AuthenticationFailed)
}
