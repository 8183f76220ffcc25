use hkdf::Hkdf;
use sha2::Sha512;
use zeroize::Zeroizing;

use super::{Error, ProtectedSecret};

/// Append `s` to `buf`, preceded by its length as a big-endian `u32`.
///
/// Length-prefixing keeps `["ab", "c"]` and `["a", "bc"]` from producing the same context.
pub(crate) fn push_length_prefixed(buf: &mut Vec<u8>, s: &[u8]) {
	buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
	buf.extend_from_slice(s);
}

/// Build the KDF context for a purpose chain.
pub(crate) fn purpose_context(purposes: &[String]) -> Vec<u8> {
	let mut context = b"purposes::".to_vec();
	context.extend_from_slice(&(purposes.len() as u32).to_be_bytes());

	for p in purposes {
		push_length_prefixed(&mut context, p.as_bytes());
	}

	context
}

/// Derive `len` bytes of subkey from `master` for the given `context`.
#[tracing::instrument(level = "trace", skip(master, context))]
pub(crate) fn derive_key(
	master: &ProtectedSecret,
	context: &[u8],
	len: usize,
) -> Result<ProtectedSecret, Error> {
	let mut output = Zeroizing::new(vec![0u8; len]);

	master.use_secret(|ikm| {
		Hkdf::<Sha512>::new(None, ikm)
			.expand(context, &mut output[..])
			.map_err(|_| Error::insanity(format!("cannot derive {len} byte subkey")))
	})?;

	Ok(output.into())
}
