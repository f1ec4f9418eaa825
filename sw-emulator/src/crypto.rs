/*++

Licensed under the Apache-2.0 license.

File Name:

    crypto.rs

Abstract:

    Reference AES primitives used by the engine model: single block
    encryption, CMAC subkey derivation and one-shot GCM.

--*/

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::AeadInPlace;
use aes_gcm::AesGcm;

pub const AES_BLOCK_SIZE: usize = 16;
pub const GCM_IV_SIZE: usize = 12;
pub const GCM_TAG_SIZE: usize = 16;

/// Encrypt one block in place. `key` must be 16, 24 or 32 bytes.
pub fn aes_encrypt_block(key: &[u8], block: &mut [u8; AES_BLOCK_SIZE]) -> Option<()> {
    let block = GenericArray::from_mut_slice(block);
    match key.len() {
        16 => Aes128::new_from_slice(key).ok()?.encrypt_block(block),
        24 => Aes192::new_from_slice(key).ok()?.encrypt_block(block),
        32 => Aes256::new_from_slice(key).ok()?.encrypt_block(block),
        _ => return None,
    }
    Some(())
}

/// Doubling in GF(2^128) as used for CMAC subkeys.
fn dbl(block: &[u8; AES_BLOCK_SIZE]) -> [u8; AES_BLOCK_SIZE] {
    let mut out = [0u8; AES_BLOCK_SIZE];
    let mut carry = 0u8;
    for i in (0..AES_BLOCK_SIZE).rev() {
        out[i] = (block[i] << 1) | carry;
        carry = block[i] >> 7;
    }
    if carry != 0 {
        out[AES_BLOCK_SIZE - 1] ^= 0x87;
    }
    out
}

/// CMAC subkey K1 for complete final blocks.
pub fn cmac_subkey1(key: &[u8]) -> Option<[u8; AES_BLOCK_SIZE]> {
    let mut l = [0u8; AES_BLOCK_SIZE];
    aes_encrypt_block(key, &mut l)?;
    Some(dbl(&l))
}

/// One-shot GCM encryption. Returns the tag, `buf` is encrypted in place.
pub fn gcm_encrypt(
    key: &[u8],
    iv: &[u8; GCM_IV_SIZE],
    aad: &[u8],
    buf: &mut [u8],
) -> Option<[u8; GCM_TAG_SIZE]> {
    let tag = match key.len() {
        16 => AesGcm::<Aes128, U12>::new_from_slice(key)
            .ok()?
            .encrypt_in_place_detached(iv.into(), aad, buf)
            .ok()?,
        24 => AesGcm::<Aes192, U12>::new_from_slice(key)
            .ok()?
            .encrypt_in_place_detached(iv.into(), aad, buf)
            .ok()?,
        32 => AesGcm::<Aes256, U12>::new_from_slice(key)
            .ok()?
            .encrypt_in_place_detached(iv.into(), aad, buf)
            .ok()?,
        _ => return None,
    };
    Some(tag.into())
}

/// One-shot GCM decryption. `buf` is decrypted in place only when the tag
/// verifies.
pub fn gcm_decrypt(
    key: &[u8],
    iv: &[u8; GCM_IV_SIZE],
    aad: &[u8],
    buf: &mut [u8],
    tag: &[u8; GCM_TAG_SIZE],
) -> Option<()> {
    match key.len() {
        16 => AesGcm::<Aes128, U12>::new_from_slice(key)
            .ok()?
            .decrypt_in_place_detached(iv.into(), aad, buf, tag.into())
            .ok(),
        24 => AesGcm::<Aes192, U12>::new_from_slice(key)
            .ok()?
            .decrypt_in_place_detached(iv.into(), aad, buf, tag.into())
            .ok(),
        32 => AesGcm::<Aes256, U12>::new_from_slice(key)
            .ok()?
            .decrypt_in_place_detached(iv.into(), aad, buf, tag.into())
            .ok(),
        _ => None,
    }
}
