//! Blob framing for encrypted files
//!
//! Stored files are laid out as `iv (12 bytes) || ciphertext`, where the
//! ciphertext already carries the GCM tag. There is no version byte and no
//! length prefix; the ciphertext runs to the end of the buffer. Files
//! uploaded by existing clients use exactly this layout.
//!
//! Unpacking only checks the length. Integrity is left to GCM tag
//! verification during decryption.

use crate::{
    keys::{Iv, IV_SIZE},
    CryptoError, Result,
};
use bytes::{BufMut, Bytes, BytesMut};

/// An IV paired with the ciphertext it encrypted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedBlob {
    /// IV used for this ciphertext
    pub iv: Iv,
    /// Ciphertext including the trailing authentication tag
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    /// Create a new blob
    pub fn new(iv: Iv, ciphertext: Vec<u8>) -> Self {
        Self { iv, ciphertext }
    }

    /// Serialize as `iv || ciphertext`
    pub fn to_bytes(&self) -> Bytes {
        pack(&self.iv, &self.ciphertext)
    }

    /// Parse a framed buffer
    pub fn from_bytes(blob: &[u8]) -> Result<Self> {
        let (iv, ciphertext) = unpack(blob)?;
        Ok(Self {
            iv,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Total framed length
    pub fn framed_len(&self) -> usize {
        IV_SIZE + self.ciphertext.len()
    }
}

/// Concatenate an IV and ciphertext into one buffer
pub fn pack(iv: &Iv, ciphertext: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(IV_SIZE + ciphertext.len());
    buf.put_slice(iv.as_bytes());
    buf.put_slice(ciphertext);
    buf.freeze()
}

/// Split a framed buffer at the IV boundary
pub fn unpack(blob: &[u8]) -> Result<(Iv, &[u8])> {
    if blob.len() < IV_SIZE {
        return Err(CryptoError::MalformedBlob {
            len: blob.len(),
            min: IV_SIZE,
        });
    }
    let (iv, ciphertext) = blob.split_at(IV_SIZE);
    Ok((Iv::from_bytes(iv)?, ciphertext))
}
