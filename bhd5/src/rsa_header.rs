//! RSA header decryptor.
//!
//! The target games' header envelope uses a legacy, non-standard scheme:
//! the *public* key runs the raw RSA primitive in "decrypt" mode, block by
//! block, and a short result is left-padded with zero bytes rather than
//! unpadded per PKCS#1. This is preserved for file-format compatibility;
//! it must not be silently swapped for a private-key decrypt.

use std::io::Cursor;

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;

use crate::{Error, Result};

/// Decrypt `encrypted` using the legacy public-key raw-RSA block scheme,
/// returning an in-memory stream positioned at 0.
///
/// The games ship their keys as PKCS#1 `-----BEGIN RSA PUBLIC KEY-----`
/// blocks (see the `.pem` prefix probe in `guess::ext`), not the PKCS#8
/// `-----BEGIN PUBLIC KEY-----` form; try PKCS#1 first and fall back to
/// PKCS#8 for keys re-exported in that shape.
pub fn decrypt_header(encrypted: &[u8], public_key_pem: &str) -> Result<Cursor<Vec<u8>>> {
    let key = RsaPublicKey::from_pkcs1_pem(public_key_pem)
        .or_else(|_| RsaPublicKey::from_public_key_pem(public_key_pem))
        .map_err(|_| Error::CryptoFailure)?;

    let output_block_size = key.size();
    let input_block_size = output_block_size;

    if encrypted.is_empty() || encrypted.len() % input_block_size != 0 {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "RSA header stream length {} is not a multiple of the key's block size {}",
                encrypted.len(),
                input_block_size
            ),
        )));
    }

    let mut out = Vec::with_capacity(encrypted.len());
    for block in encrypted.chunks(input_block_size) {
        let decrypted = raw_public_decrypt(&key, block)?;
        let mut padded = vec![0u8; output_block_size];
        let start = output_block_size.saturating_sub(decrypted.len());
        padded[start..].copy_from_slice(&decrypted);
        out.extend_from_slice(&padded);
    }

    Ok(Cursor::new(out))
}

/// Run the raw RSA primitive (`c^e mod n`) against a public key, used here
/// as a decrypt primitive per the legacy scheme rather than standard
/// encrypt-with-public-key usage.
fn raw_public_decrypt(key: &RsaPublicKey, block: &[u8]) -> Result<Vec<u8>> {
    use num_bigint_dig::BigUint;

    let c = BigUint::from_bytes_be(block);
    let n = key.n();
    let e = key.e();
    if &c >= n {
        return Err(Error::CryptoFailure);
    }
    let m = c.modpow(e, n);
    Ok(m.to_bytes_be())
}

#[cfg(test)]
mod test {
    // RSA header decryption is exercised at the integration-test level
    // (round-tripped against a freshly generated throwaway key); a
    // deterministic known-good fixture for the legacy games' production key
    // isn't available here, so it isn't asserted against in this module.
}
