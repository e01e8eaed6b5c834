use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::structs::{BLOCK_LEN, HMAC_LEN};
use super::TelemetryError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

pub const ENC_KEY_LEN: usize = 16;
pub const MAC_KEY_LEN: usize = 32;

/// Encrypt whole blocks in place.
pub fn encrypt(key: &[u8; ENC_KEY_LEN], iv: &[u8; BLOCK_LEN], data: &mut [u8]) -> Result<(), TelemetryError> {
    let len = data.len();
    Aes128CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(data, len)
        .map_err(|_| TelemetryError::Cipher)?;
    Ok(())
}

/// Decrypt whole blocks in place.
pub fn decrypt(key: &[u8; ENC_KEY_LEN], iv: &[u8; BLOCK_LEN], data: &mut [u8]) -> Result<(), TelemetryError> {
    Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|_| TelemetryError::Cipher)?;
    Ok(())
}

pub fn sign(key: &[u8; MAC_KEY_LEN], data: &[u8]) -> Result<[u8; HMAC_LEN], TelemetryError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| TelemetryError::Cipher)?;
    mac.update(data);

    let mut result = [0u8; HMAC_LEN];
    result.copy_from_slice(&mac.finalize().into_bytes());
    return Ok(result);
}

/// Constant time comparison of `tag` against the HMAC of `data`.
pub fn verify(key: &[u8; MAC_KEY_LEN], data: &[u8], tag: &[u8]) -> Result<(), TelemetryError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| TelemetryError::Cipher)?;
    mac.update(data);
    mac.verify_slice(tag).map_err(|_| TelemetryError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; ENC_KEY_LEN] = [0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f, 0x3c];
    const IV: [u8; BLOCK_LEN] = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f];

    #[test]
    fn test_cbc_known_answer() {
        /* NIST SP 800-38A F.2.1 */
        let mut data = hex::decode("6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51").unwrap();
        encrypt(&KEY, &IV, &mut data).unwrap();
        assert_eq!(hex::encode(&data), "7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2");

        decrypt(&KEY, &IV, &mut data).unwrap();
        assert_eq!(hex::encode(&data), "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51");
    }

    #[test]
    fn test_zero_iv_only_affects_first_block() {
        let plain = [0x5Au8; 48];
        let mut data = plain;
        encrypt(&KEY, &IV, &mut data).unwrap();
        decrypt(&KEY, &[0u8; BLOCK_LEN], &mut data).unwrap();

        assert_ne!(&data[..16], &plain[..16]);
        assert_eq!(&data[16..], &plain[16..]);
    }

    #[test]
    fn test_partial_block_rejected() {
        let mut data = [0u8; 20];
        assert!(matches!(encrypt(&KEY, &IV, &mut data), Err(TelemetryError::Cipher)));
        assert!(matches!(decrypt(&KEY, &IV, &mut data), Err(TelemetryError::Cipher)));
    }

    #[test]
    fn test_hmac() {
        let key = [0x0bu8; MAC_KEY_LEN];
        let tag = sign(&key, b"Hi There").unwrap();

        assert!(verify(&key, b"Hi There", &tag).is_ok());
        assert!(matches!(verify(&key, b"Hi there", &tag), Err(TelemetryError::Authentication)));
        assert!(matches!(verify(&key, b"Hi There", &tag[..31]), Err(TelemetryError::Authentication)));
    }
}
