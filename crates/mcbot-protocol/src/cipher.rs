//! AES-128-CFB8 stream encryption.
//!
//! After the encryption handshake both directions are encrypted with
//! AES-128 in CFB8 mode, using the 16-byte shared secret as both key and
//! IV. The cipher state runs continuously across packets, so each
//! direction owns one long-lived instance. Read and write are separate
//! instances because their keystreams advance independently.

use aes::Aes128;
use cfb8::cipher::generic_array::GenericArray;
use cfb8::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cfb8::{Decryptor, Encryptor};

use crate::ProtocolError;

/// Length of the shared secret.
pub const SHARED_SECRET_LEN: usize = 16;

/// Encrypts outgoing bytes.
pub struct EncryptStream {
    cipher: Encryptor<Aes128>,
}

impl EncryptStream {
    /// Creates an encryptor keyed by `shared_secret`.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidKeyLength`] unless the secret is 16 bytes.
    pub fn new(shared_secret: &[u8]) -> Result<Self, ProtocolError> {
        let cipher = Encryptor::<Aes128>::new_from_slices(shared_secret, shared_secret)
            .map_err(|_| ProtocolError::InvalidKeyLength(shared_secret.len()))?;
        Ok(Self { cipher })
    }

    /// Encrypts `data` in place.
    pub fn apply(&mut self, data: &mut [u8]) {
        // CFB8 has a one-byte block; going byte by byte keeps the
        // feedback register continuous across calls.
        for byte in data.iter_mut() {
            let mut block = GenericArray::clone_from_slice(std::slice::from_ref(byte));
            self.cipher.encrypt_block_mut(&mut block);
            *byte = block[0];
        }
    }
}

/// Decrypts incoming bytes.
pub struct DecryptStream {
    cipher: Decryptor<Aes128>,
}

impl DecryptStream {
    /// Creates a decryptor keyed by `shared_secret`.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidKeyLength`] unless the secret is 16 bytes.
    pub fn new(shared_secret: &[u8]) -> Result<Self, ProtocolError> {
        let cipher = Decryptor::<Aes128>::new_from_slices(shared_secret, shared_secret)
            .map_err(|_| ProtocolError::InvalidKeyLength(shared_secret.len()))?;
        Ok(Self { cipher })
    }

    /// Decrypts `data` in place.
    pub fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            let mut block = GenericArray::clone_from_slice(std::slice::from_ref(byte));
            self.cipher.decrypt_block_mut(&mut block);
            *byte = block[0];
        }
    }
}

impl std::fmt::Debug for EncryptStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptStream(aes-128-cfb8)")
    }
}

impl std::fmt::Debug for DecryptStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DecryptStream(aes-128-cfb8)")
    }
}
