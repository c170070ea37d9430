//! XChaCha20-Poly1305 sealing of cache entries and the key-material cookie codec.
//!
//! Each write draws a fresh 24-byte random nonce, so nonces never repeat under one key.
//! The storage key is bound as associated data, which stops an envelope from being
//! replayed under a different key.

// crates.io
use base64::{
	Engine as _,
	engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use chacha20poly1305::{
	Key, XChaCha20Poly1305, XNonce,
	aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;
use zeroize::Zeroizing;
// self
use crate::_prelude::*;

/// Key length in bytes.
pub const KEY_LEN: usize = 32;
/// Nonce length in bytes.
pub const NONCE_LEN: usize = 24;

const KEY_ID_LEN: usize = 16;

/// Errors raised while sealing or opening entries.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CryptoError {
	/// The key-material cookie could not be decoded.
	#[error("Encryption cookie is malformed.")]
	InvalidCookie,
	/// The stored value is not a well-formed envelope.
	#[error("Stored value is not a valid envelope.")]
	InvalidEnvelope,
	/// The envelope was sealed under a different key.
	#[error("Envelope was sealed under key {found}, expected {expected}.")]
	KeyMismatch {
		/// Key identifier of the current key.
		expected: String,
		/// Key identifier recorded in the envelope.
		found: String,
	},
	/// Sealing failed.
	#[error("Encryption failed.")]
	Encrypt,
	/// Authentication or decryption failed.
	#[error("Decryption failed.")]
	Decrypt,
}

/// Persisted ciphertext envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
	/// Identifier of the key that sealed the entry.
	pub id: String,
	/// Base64 ciphertext with the authentication tag.
	pub data: String,
	/// Base64 nonce, unique per write.
	pub nonce: String,
}
impl Envelope {
	/// Parses a stored value.
	pub fn parse(raw: &str) -> Result<Self, CryptoError> {
		serde_json::from_str(raw).map_err(|_| CryptoError::InvalidEnvelope)
	}

	/// Renders the stored value.
	pub fn to_json(&self) -> Result<String, CryptoError> {
		serde_json::to_string(self).map_err(|_| CryptoError::InvalidEnvelope)
	}
}

#[derive(Deserialize)]
struct CookiePayload {
	id: String,
	key: String,
}

/// Symmetric key plus the identifier stored alongside each envelope.
#[derive(Clone)]
pub struct EncryptionKey {
	id: String,
	material: Zeroizing<[u8; KEY_LEN]>,
}
impl EncryptionKey {
	/// Draws fresh key material and a fresh identifier.
	pub fn generate() -> Self {
		let mut rng = rand::rng();
		let mut material = Zeroizing::new([0_u8; KEY_LEN]);
		let mut id = [0_u8; KEY_ID_LEN];

		rng.fill_bytes(&mut material[..]);
		rng.fill_bytes(&mut id);

		Self { id: URL_SAFE_NO_PAD.encode(id), material }
	}

	/// Key identifier.
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Encodes the key for the scoped cookie.
	pub fn to_cookie_value(&self) -> String {
		let json = Zeroizing::new(
			serde_json::json!({ "id": self.id, "key": STANDARD.encode(&self.material[..]) })
				.to_string(),
		);

		STANDARD.encode(json.as_bytes())
	}

	/// Decodes a cookie produced by [`Self::to_cookie_value`].
	pub fn from_cookie_value(value: &str) -> Result<Self, CryptoError> {
		let json = Zeroizing::new(STANDARD.decode(value.trim()).map_err(|_| CryptoError::InvalidCookie)?);
		let payload: CookiePayload =
			serde_json::from_slice(&json).map_err(|_| CryptoError::InvalidCookie)?;
		let bytes =
			Zeroizing::new(STANDARD.decode(&payload.key).map_err(|_| CryptoError::InvalidCookie)?);

		if bytes.len() != KEY_LEN || payload.id.is_empty() {
			return Err(CryptoError::InvalidCookie);
		}

		let mut material = Zeroizing::new([0_u8; KEY_LEN]);

		material.copy_from_slice(&bytes);

		Ok(Self { id: payload.id, material })
	}

	/// Seals `plaintext` stored under `storage_key`.
	pub fn seal(&self, storage_key: &str, plaintext: &str) -> Result<Envelope, CryptoError> {
		let mut nonce = [0_u8; NONCE_LEN];

		rand::rng().fill_bytes(&mut nonce);

		let data = self
			.cipher()
			.encrypt(
				XNonce::from_slice(&nonce),
				Payload { msg: plaintext.as_bytes(), aad: storage_key.as_bytes() },
			)
			.map_err(|_| CryptoError::Encrypt)?;

		Ok(Envelope { id: self.id.clone(), data: STANDARD.encode(data), nonce: STANDARD.encode(nonce) })
	}

	/// Opens an envelope stored under `storage_key`.
	pub fn open(&self, storage_key: &str, envelope: &Envelope) -> Result<String, CryptoError> {
		if envelope.id != self.id {
			return Err(CryptoError::KeyMismatch {
				expected: self.id.clone(),
				found: envelope.id.clone(),
			});
		}

		let nonce = STANDARD.decode(&envelope.nonce).map_err(|_| CryptoError::InvalidEnvelope)?;

		if nonce.len() != NONCE_LEN {
			return Err(CryptoError::InvalidEnvelope);
		}

		let data = STANDARD.decode(&envelope.data).map_err(|_| CryptoError::InvalidEnvelope)?;
		let plaintext = self
			.cipher()
			.decrypt(XNonce::from_slice(&nonce), Payload { msg: &data, aad: storage_key.as_bytes() })
			.map_err(|_| CryptoError::Decrypt)?;

		String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
	}

	fn cipher(&self) -> XChaCha20Poly1305 {
		XChaCha20Poly1305::new(Key::from_slice(&self.material[..]))
	}
}
impl Debug for EncryptionKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EncryptionKey").field("id", &self.id).field("material", &"<redacted>").finish()
	}
}
