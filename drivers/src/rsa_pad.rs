/*++

Licensed under the Apache-2.0 license.

File Name:

    rsa_pad.rs

Abstract:

    File contains the RSA encryption paddings: EME-PKCS1-v1_5 and EME-OAEP
    with MGF1. Decoding always walks the whole block so that the work done
    does not depend on where a check fails.

--*/

use crate::{SeError, SeResult};
use arrayvec::ArrayVec;
use core::ops::Range;
use sha2::Digest;
use zeroize::Zeroize;

/// Largest supported digest, SHA-512.
pub const MAX_DIGEST_SIZE: usize = 64;

const PKCS1_MIN_PS_LEN: usize = 8;

pub type LabelHash = ArrayVec<u8, MAX_DIGEST_SIZE>;

pub fn label_hash<D: Digest>(label: &[u8]) -> LabelHash {
    D::digest(label).iter().copied().collect()
}

/// XOR `out` with MGF1(seed).
fn mgf1_xor<D: Digest>(seed: &[u8], out: &mut [u8]) {
    for (counter, chunk) in out.chunks_mut(<D as Digest>::output_size()).enumerate() {
        let mut hasher = D::new();
        hasher.update(seed);
        hasher.update((counter as u32).to_be_bytes());
        let mask = hasher.finalize();
        for (o, m) in chunk.iter_mut().zip(mask.iter()) {
            *o ^= *m;
        }
    }
}

/// EME-PKCS1-v1_5 encoding of `msg` into the whole of `em`.
pub fn pkcs1v15_encode(
    em: &mut [u8],
    msg: &[u8],
    rng: &mut dyn FnMut(&mut [u8]) -> SeResult<()>,
) -> SeResult<()> {
    let k = em.len();
    if msg.len() + 3 + PKCS1_MIN_PS_LEN > k {
        Err(SeError::DRIVER_ACIPHER_INPUT_TOO_BIG)?;
    }
    let ps_end = k - msg.len() - 1;
    em[0] = 0;
    em[1] = 2;
    let ps = &mut em[2..ps_end];
    rng(ps)?;
    for b in ps.iter_mut() {
        while *b == 0 {
            rng(core::slice::from_mut(b))?;
        }
    }
    em[ps_end] = 0;
    em[ps_end + 1..].copy_from_slice(msg);
    Ok(())
}

/// Check an EME-PKCS1-v1_5 block. Returns where the message sits in `em`.
pub fn pkcs1v15_decode(em: &[u8]) -> SeResult<Range<usize>> {
    if em.len() < 3 + PKCS1_MIN_PS_LEN {
        Err(SeError::DRIVER_ACIPHER_DECODING_FAILED)?;
    }
    let mut bad = (em[0] != 0) | (em[1] != 2);
    let mut found = false;
    let mut sep = 0;
    for (i, b) in em.iter().enumerate().skip(2) {
        let hit = (*b == 0) & !found;
        sep |= if hit { i } else { 0 };
        found |= hit;
    }
    bad |= !found | (sep < 2 + PKCS1_MIN_PS_LEN);
    if bad {
        Err(SeError::DRIVER_ACIPHER_DECODING_FAILED)?;
    }
    Ok(sep + 1..em.len())
}

/// EME-OAEP encoding of `msg` into the whole of `em`.
pub fn oaep_encode<D: Digest>(
    em: &mut [u8],
    msg: &[u8],
    l_hash: &[u8],
    rng: &mut dyn FnMut(&mut [u8]) -> SeResult<()>,
) -> SeResult<()> {
    let h_len = <D as Digest>::output_size();
    let k = em.len();
    if l_hash.len() != h_len || k < 2 * h_len + 2 {
        Err(SeError::DRIVER_ACIPHER_INVALID_INPUT)?;
    }
    if msg.len() > k - 2 * h_len - 2 {
        Err(SeError::DRIVER_ACIPHER_INPUT_TOO_BIG)?;
    }

    em[0] = 0;
    let (seed, db) = em[1..].split_at_mut(h_len);
    db.fill(0);
    db[..h_len].copy_from_slice(l_hash);
    let one = db.len() - msg.len() - 1;
    db[one] = 1;
    db[one + 1..].copy_from_slice(msg);

    rng(seed)?;
    mgf1_xor::<D>(seed, db);
    mgf1_xor::<D>(db, seed);
    Ok(())
}

/// Unmask an EME-OAEP block in place. Returns where the message sits in
/// `em`.
pub fn oaep_decode<D: Digest>(em: &mut [u8], l_hash: &[u8]) -> SeResult<Range<usize>> {
    let h_len = <D as Digest>::output_size();
    let k = em.len();
    if l_hash.len() != h_len || k < 2 * h_len + 2 {
        Err(SeError::DRIVER_ACIPHER_DECODING_FAILED)?;
    }

    let first = em[0];
    let (seed, db) = em[1..].split_at_mut(h_len);
    mgf1_xor::<D>(db, seed);
    mgf1_xor::<D>(seed, db);
    seed.zeroize();

    let mut bad = first != 0;
    for (a, b) in db[..h_len].iter().zip(l_hash) {
        bad |= a != b;
    }
    let mut found = false;
    let mut sep = 0;
    for (i, b) in db.iter().enumerate().skip(h_len) {
        let hit = (*b == 1) & !found;
        bad |= !found & (*b != 0) & (*b != 1);
        sep |= if hit { i } else { 0 };
        found |= hit;
    }
    bad |= !found;
    if bad {
        em.zeroize();
        Err(SeError::DRIVER_ACIPHER_DECODING_FAILED)?;
    }
    Ok(1 + h_len + sep + 1..k)
}
