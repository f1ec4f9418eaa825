/*++

Licensed under the Apache-2.0 license.

File Name:

    acipher.rs

Abstract:

    File contains the asymmetric cipher life cycle: RSA encrypt and decrypt
    with optional padding, and Diffie-Hellman derivation, on the PKA engine.

--*/

use crate::cmem::{Cmem, CmemSlice, CmemTag, CMEM_ALIGN};
use crate::keyslot::KeyslotLease;
use crate::pka::{load_modexp_key, modexp};
use crate::pka_keyslot::{RsaKeySize, RSA_MAX_BYTES};
use crate::rsa_pad::{self, LabelHash};
use crate::se::Se;
use crate::{first_err, SeError, SeResult};
use core::ops::Range;
use se_registers::{EngineId, SeHal};
use sha2::{Sha224, Sha256, Sha384, Sha512};
use zeroize::Zeroize;

/// PKA keyslot used for the transform. It never stays loaded between calls.
pub const ACIPHER_PKA_SLOT: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OaepDigest {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcipherAlgorithm {
    /// Raw modular exponentiation.
    RsaNoPad,
    RsaPkcs1V15,
    RsaOaep(OaepDigest),
    Dh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcipherMode {
    Encrypt,
    Decrypt,
    Derive,
}

/// Key material in big-endian byte order.
#[derive(Debug, Clone, Copy)]
pub enum AcipherKey<'k> {
    RsaPublic {
        modulus: &'k [u8],
        exponent: &'k [u8],
    },
    RsaPrivate {
        modulus: &'k [u8],
        exponent: &'k [u8],
    },
    DhPrivate {
        prime: &'k [u8],
        private: &'k [u8],
    },
}

impl AcipherKey<'_> {
    fn parts(&self) -> (&[u8], &[u8]) {
        match *self {
            Self::RsaPublic { modulus, exponent } | Self::RsaPrivate { modulus, exponent } => {
                (modulus, exponent)
            }
            Self::DhPrivate { prime, private } => (prime, private),
        }
    }
}

fn check_mode(algorithm: AcipherAlgorithm, mode: AcipherMode) -> SeResult<()> {
    match (algorithm, mode) {
        (AcipherAlgorithm::RsaOaep(OaepDigest::Sha1), _) => {
            Err(SeError::DRIVER_ACIPHER_NOT_SUPPORTED)
        }
        (AcipherAlgorithm::Dh, AcipherMode::Derive) => Ok(()),
        (AcipherAlgorithm::Dh, _) | (_, AcipherMode::Derive) => {
            Err(SeError::DRIVER_ACIPHER_NOT_SUPPORTED)
        }
        _ => Ok(()),
    }
}

fn check_key_type(algorithm: AcipherAlgorithm, mode: AcipherMode, key: &AcipherKey) -> SeResult<()> {
    let matches = match (algorithm, key) {
        (AcipherAlgorithm::Dh, AcipherKey::DhPrivate { .. }) => true,
        (AcipherAlgorithm::Dh, _) => false,
        (_, AcipherKey::RsaPublic { .. }) => mode == AcipherMode::Encrypt,
        (_, AcipherKey::RsaPrivate { .. }) => mode == AcipherMode::Decrypt,
        (_, AcipherKey::DhPrivate { .. }) => false,
    };
    if !matches {
        Err(SeError::DRIVER_ACIPHER_INVALID_KEY_TYPE)?;
    }
    Ok(())
}

fn digest_label(digest: OaepDigest, label: &[u8]) -> SeResult<LabelHash> {
    Ok(match digest {
        OaepDigest::Sha1 => Err(SeError::DRIVER_ACIPHER_NOT_SUPPORTED)?,
        OaepDigest::Sha224 => rsa_pad::label_hash::<Sha224>(label),
        OaepDigest::Sha256 => rsa_pad::label_hash::<Sha256>(label),
        OaepDigest::Sha384 => rsa_pad::label_hash::<Sha384>(label),
        OaepDigest::Sha512 => rsa_pad::label_hash::<Sha512>(label),
    })
}

fn oaep_encode(
    digest: OaepDigest,
    em: &mut [u8],
    msg: &[u8],
    l_hash: &[u8],
    rng: &mut dyn FnMut(&mut [u8]) -> SeResult<()>,
) -> SeResult<()> {
    match digest {
        OaepDigest::Sha1 => Err(SeError::DRIVER_ACIPHER_NOT_SUPPORTED),
        OaepDigest::Sha224 => rsa_pad::oaep_encode::<Sha224>(em, msg, l_hash, rng),
        OaepDigest::Sha256 => rsa_pad::oaep_encode::<Sha256>(em, msg, l_hash, rng),
        OaepDigest::Sha384 => rsa_pad::oaep_encode::<Sha384>(em, msg, l_hash, rng),
        OaepDigest::Sha512 => rsa_pad::oaep_encode::<Sha512>(em, msg, l_hash, rng),
    }
}

fn oaep_decode(digest: OaepDigest, em: &mut [u8], l_hash: &[u8]) -> SeResult<Range<usize>> {
    match digest {
        OaepDigest::Sha1 => Err(SeError::DRIVER_ACIPHER_NOT_SUPPORTED),
        OaepDigest::Sha224 => rsa_pad::oaep_decode::<Sha224>(em, l_hash),
        OaepDigest::Sha256 => rsa_pad::oaep_decode::<Sha256>(em, l_hash),
        OaepDigest::Sha384 => rsa_pad::oaep_decode::<Sha384>(em, l_hash),
        OaepDigest::Sha512 => rsa_pad::oaep_decode::<Sha512>(em, l_hash),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initialized,
    KeySet,
    Finalized,
}

/// Key copied into context memory: modulus followed by exponent.
#[derive(Debug, Clone, Copy)]
struct StoredKey {
    material: CmemSlice,
    modulus_len: usize,
    size: RsaKeySize,
}

/// Asymmetric cipher state held by an API context between calls.
#[derive(Debug)]
pub struct AcipherState {
    algorithm: AcipherAlgorithm,
    mode: AcipherMode,
    phase: Phase,
    /// Label digest, present only for OAEP with a non-empty label.
    label: Option<CmemSlice>,
    key: Option<StoredKey>,
}

impl AcipherState {
    pub fn init(
        cmem: &mut Cmem,
        algorithm: AcipherAlgorithm,
        mode: AcipherMode,
        label: &[u8],
    ) -> SeResult<Self> {
        check_mode(algorithm, mode)?;
        let label = match algorithm {
            AcipherAlgorithm::RsaOaep(digest) if !label.is_empty() => {
                let mut hash = digest_label(digest, label)?;
                let slice = cmem.allocate(CmemTag::ApiState, CMEM_ALIGN, hash.len())?;
                let stored = cmem.slice_mut(&slice).map(|buf| buf.copy_from_slice(&hash));
                hash.as_mut_slice().zeroize();
                if let Err(e) = stored {
                    cmem.release(CmemTag::ApiState, slice);
                    Err(e)?;
                }
                Some(slice)
            }
            AcipherAlgorithm::RsaOaep(_) => None,
            _ if !label.is_empty() => Err(SeError::DRIVER_ACIPHER_INVALID_INPUT)?,
            _ => None,
        };
        Ok(Self {
            algorithm,
            mode,
            phase: Phase::Initialized,
            label,
            key: None,
        })
    }

    pub fn algorithm(&self) -> AcipherAlgorithm {
        self.algorithm
    }

    pub fn mode(&self) -> AcipherMode {
        self.mode
    }

    /// True for decrypt and derive, which use the private exponent.
    pub fn uses_private_key(&self) -> bool {
        self.mode != AcipherMode::Encrypt
    }

    pub fn is_key_set(&self) -> bool {
        self.key.is_some()
    }

    pub fn is_finalized(&self) -> bool {
        self.phase == Phase::Finalized
    }

    /// Modulus length in bytes once a key is set.
    pub fn key_len(&self) -> Option<usize> {
        self.key.map(|k| k.size.bytes())
    }

    /// Copy `key` into context memory. A previously set key is replaced.
    pub fn set_key(&mut self, cmem: &mut Cmem, key: &AcipherKey) -> SeResult<()> {
        if self.phase == Phase::Finalized {
            Err(SeError::DRIVER_ACIPHER_INVALID_STATE)?;
        }
        check_key_type(self.algorithm, self.mode, key)?;
        let (modulus, exponent) = key.parts();
        let size = RsaKeySize::from_modulus_len(modulus.len())
            .map_err(|_| SeError::DRIVER_ACIPHER_INVALID_KEY_SIZE)?;
        if modulus[0] == 0 || exponent.is_empty() || exponent.len() > modulus.len() {
            Err(SeError::DRIVER_ACIPHER_INVALID_KEY_SIZE)?;
        }

        if let Some(old) = self.key.take() {
            cmem.release(CmemTag::Key, old.material);
        }
        let material = cmem.allocate(CmemTag::Key, CMEM_ALIGN, modulus.len() + exponent.len())?;
        match cmem.slice_mut(&material) {
            Ok(buf) => {
                let (m, e) = buf.split_at_mut(modulus.len());
                m.copy_from_slice(modulus);
                e.copy_from_slice(exponent);
            }
            Err(e) => {
                cmem.release(CmemTag::Key, material);
                Err(e)?;
            }
        }
        self.key = Some(StoredKey {
            material,
            modulus_len: modulus.len(),
            size,
        });
        self.phase = Phase::KeySet;
        Ok(())
    }

    /// Run the transform over `input` and return the number of bytes
    /// written to `output`.
    pub fn do_final<H: SeHal>(
        &mut self,
        se: &mut Se<H>,
        cmem: &Cmem,
        input: &[u8],
        output: &mut [u8],
    ) -> SeResult<usize> {
        let key = match (self.phase, self.key) {
            (Phase::Finalized, _) => Err(SeError::DRIVER_ACIPHER_INVALID_STATE)?,
            (_, None) => Err(SeError::DRIVER_ACIPHER_KEY_NOT_SET)?,
            (_, Some(key)) => key,
        };
        let mut block = [0u8; RSA_MAX_BYTES];
        let result = self.transform(se, cmem, &key, input, output, &mut block[..key.size.bytes()]);
        block.zeroize();
        if result.is_ok() {
            self.phase = Phase::Finalized;
        }
        result
    }

    fn transform<H: SeHal>(
        &self,
        se: &mut Se<H>,
        cmem: &Cmem,
        key: &StoredKey,
        input: &[u8],
        output: &mut [u8],
        em: &mut [u8],
    ) -> SeResult<usize> {
        let k = em.len();
        match self.mode {
            AcipherMode::Encrypt => {
                if output.len() < k {
                    Err(SeError::DRIVER_ACIPHER_OUTPUT_TOO_SMALL)?;
                }
                self.encode(se, cmem, input, em)?;
                run_modexp(se, cmem, key, em, &mut output[..k])?;
                Ok(k)
            }
            AcipherMode::Decrypt => {
                if input.len() != k {
                    Err(SeError::DRIVER_ACIPHER_INVALID_INPUT)?;
                }
                run_modexp(se, cmem, key, input, em)?;
                let range = self.decode(cmem, em)?;
                let len = range.len();
                if output.len() < len {
                    Err(SeError::DRIVER_ACIPHER_OUTPUT_TOO_SMALL)?;
                }
                output[..len].copy_from_slice(&em[range]);
                Ok(len)
            }
            AcipherMode::Derive => {
                if input.is_empty() || input.len() > k {
                    Err(SeError::DRIVER_ACIPHER_INVALID_INPUT)?;
                }
                if output.len() < k {
                    Err(SeError::DRIVER_ACIPHER_OUTPUT_TOO_SMALL)?;
                }
                run_modexp(se, cmem, key, input, &mut output[..k])?;
                Ok(k)
            }
        }
    }

    fn encode<H: SeHal>(
        &self,
        se: &mut Se<H>,
        cmem: &Cmem,
        msg: &[u8],
        em: &mut [u8],
    ) -> SeResult<()> {
        let mut rng = |buf: &mut [u8]| se.random(buf);
        match self.algorithm {
            AcipherAlgorithm::RsaNoPad => {
                if msg.len() > em.len() {
                    Err(SeError::DRIVER_ACIPHER_INPUT_TOO_BIG)?;
                }
                let pad = em.len() - msg.len();
                em[pad..].copy_from_slice(msg);
                Ok(())
            }
            AcipherAlgorithm::RsaPkcs1V15 => rsa_pad::pkcs1v15_encode(em, msg, &mut rng),
            AcipherAlgorithm::RsaOaep(digest) => {
                let mut l_hash = self.label_hash(cmem, digest)?;
                let result = oaep_encode(digest, em, msg, &l_hash, &mut rng);
                l_hash.as_mut_slice().zeroize();
                result
            }
            AcipherAlgorithm::Dh => Err(SeError::DRIVER_ACIPHER_NOT_SUPPORTED),
        }
    }

    fn decode(&self, cmem: &Cmem, em: &mut [u8]) -> SeResult<Range<usize>> {
        match self.algorithm {
            AcipherAlgorithm::RsaNoPad => Ok(0..em.len()),
            AcipherAlgorithm::RsaPkcs1V15 => rsa_pad::pkcs1v15_decode(em),
            AcipherAlgorithm::RsaOaep(digest) => {
                let l_hash = self.label_hash(cmem, digest)?;
                oaep_decode(digest, em, &l_hash)
            }
            AcipherAlgorithm::Dh => Err(SeError::DRIVER_ACIPHER_NOT_SUPPORTED),
        }
    }

    fn label_hash(&self, cmem: &Cmem, digest: OaepDigest) -> SeResult<LabelHash> {
        match self.label {
            Some(slice) => Ok(cmem.slice(&slice)?.iter().copied().collect()),
            None => digest_label(digest, &[]),
        }
    }

    /// Give back every slice this state holds. The released memory is zeroed.
    pub fn release(&mut self, cmem: &mut Cmem) {
        if let Some(label) = self.label.take() {
            cmem.release(CmemTag::ApiState, label);
        }
        if let Some(key) = self.key.take() {
            cmem.release(CmemTag::Key, key.material);
        }
        self.phase = Phase::Initialized;
    }
}

/// Load the stored key into the PKA keyslot and exponentiate. The keyslot is
/// cleared on every path.
fn run_modexp<H: SeHal>(
    se: &mut Se<H>,
    cmem: &Cmem,
    key: &StoredKey,
    input: &[u8],
    output: &mut [u8],
) -> SeResult<usize> {
    let material = cmem.slice(&key.material)?;
    let (modulus, exponent) = material.split_at(key.modulus_len);
    let mut engine = se.lock(EngineId::Pka)?;
    let mut lease = KeyslotLease::adopt(&mut engine, ACIPHER_PKA_SLOT);
    let result = load_modexp_key(&mut lease, ACIPHER_PKA_SLOT, modulus, exponent)
        .and_then(|size| modexp(&mut lease, ACIPHER_PKA_SLOT, size, input, output));
    first_err(result, lease.finish(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drng::DrngConfig;
    use crate::memory_layout::ACIPHER_CMEM_LAYOUT;
    use crate::SeErrorKind;
    use rsa::traits::{PrivateKeyParts, PublicKeyParts};
    use rsa::RsaPrivateKey;
    use se_emu::SeEmulator;

    #[repr(C, align(64))]
    struct Buf([u8; 2048]);

    struct KeyBytes {
        n: Vec<u8>,
        e: Vec<u8>,
        d: Vec<u8>,
    }

    fn rsa_1024() -> KeyBytes {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        KeyBytes {
            n: key.n().to_bytes_be(),
            e: key.e().to_bytes_be(),
            d: key.d().to_bytes_be(),
        }
    }

    fn se() -> Se<SeEmulator> {
        Se::new(SeEmulator::new(), DrngConfig::default())
    }

    #[test]
    fn test_mode_validation() {
        let mut buf = Buf([0; 2048]);
        let mut cmem = Cmem::get_init(&mut buf.0, &ACIPHER_CMEM_LAYOUT).unwrap();
        for (alg, mode) in [
            (AcipherAlgorithm::Dh, AcipherMode::Encrypt),
            (AcipherAlgorithm::RsaNoPad, AcipherMode::Derive),
            (AcipherAlgorithm::RsaOaep(OaepDigest::Sha1), AcipherMode::Encrypt),
        ] {
            let err = AcipherState::init(&mut cmem, alg, mode, &[]).unwrap_err();
            assert_eq!(err.kind(), SeErrorKind::NotSupported);
        }
        assert_eq!(
            AcipherState::init(&mut cmem, AcipherAlgorithm::RsaPkcs1V15, AcipherMode::Encrypt, b"l")
                .unwrap_err(),
            SeError::DRIVER_ACIPHER_INVALID_INPUT
        );
        assert_eq!(cmem.entries(), 0);
    }

    #[test]
    fn test_label_digest_kept_in_cmem() {
        let mut buf = Buf([0; 2048]);
        let mut cmem = Cmem::get_init(&mut buf.0, &ACIPHER_CMEM_LAYOUT).unwrap();
        let alg = AcipherAlgorithm::RsaOaep(OaepDigest::Sha256);
        let mut state = AcipherState::init(&mut cmem, alg, AcipherMode::Encrypt, &[]).unwrap();
        assert_eq!(cmem.entries(), 0);
        state.release(&mut cmem);

        let mut state = AcipherState::init(&mut cmem, alg, AcipherMode::Encrypt, b"label").unwrap();
        assert_eq!(cmem.entries(), 1);
        let expected = rsa_pad::label_hash::<Sha256>(b"label");
        assert_eq!(state.label_hash(&cmem, OaepDigest::Sha256).unwrap(), expected);
        state.release(&mut cmem);
        assert_eq!(cmem.entries(), 0);
        cmem.destroy().unwrap();
    }

    #[test]
    fn test_key_checks() {
        let mut buf = Buf([0; 2048]);
        let mut cmem = Cmem::get_init(&mut buf.0, &ACIPHER_CMEM_LAYOUT).unwrap();
        let mut state =
            AcipherState::init(&mut cmem, AcipherAlgorithm::RsaNoPad, AcipherMode::Encrypt, &[])
                .unwrap();
        let modulus = [0xc5u8; 128];
        let private = AcipherKey::RsaPrivate {
            modulus: &modulus,
            exponent: &[3],
        };
        assert_eq!(
            state.set_key(&mut cmem, &private),
            Err(SeError::DRIVER_ACIPHER_INVALID_KEY_TYPE)
        );
        let dh = AcipherKey::DhPrivate {
            prime: &modulus,
            private: &[3],
        };
        assert_eq!(
            state.set_key(&mut cmem, &dh).unwrap_err().kind(),
            SeErrorKind::InvalidArgs
        );
        let short = AcipherKey::RsaPublic {
            modulus: &modulus[..100],
            exponent: &[3],
        };
        assert_eq!(
            state.set_key(&mut cmem, &short),
            Err(SeError::DRIVER_ACIPHER_INVALID_KEY_SIZE)
        );
        let no_exp = AcipherKey::RsaPublic {
            modulus: &modulus,
            exponent: &[],
        };
        assert_eq!(
            state.set_key(&mut cmem, &no_exp),
            Err(SeError::DRIVER_ACIPHER_INVALID_KEY_SIZE)
        );
        assert!(!state.is_key_set());

        let public = AcipherKey::RsaPublic {
            modulus: &modulus,
            exponent: &[1, 0, 1],
        };
        state.set_key(&mut cmem, &public).unwrap();
        state.set_key(&mut cmem, &public).unwrap();
        assert_eq!(cmem.entries(), 1);
        assert_eq!(state.key_len(), Some(128));
        state.release(&mut cmem);
        assert_eq!(cmem.entries(), 0);
    }

    #[test]
    fn test_do_final_before_set_key() {
        let mut se = se();
        let mut buf = Buf([0; 2048]);
        let mut cmem = Cmem::get_init(&mut buf.0, &ACIPHER_CMEM_LAYOUT).unwrap();
        let mut state =
            AcipherState::init(&mut cmem, AcipherAlgorithm::RsaNoPad, AcipherMode::Encrypt, &[])
                .unwrap();
        let mut out = [0u8; 128];
        let err = state.do_final(&mut se, &cmem, &[1], &mut out).unwrap_err();
        assert_eq!(err, SeError::DRIVER_ACIPHER_KEY_NOT_SET);
        assert_eq!(err.kind(), SeErrorKind::BadState);
        assert_eq!(se.hal().starts(EngineId::Pka), 0);
    }

    #[test]
    fn test_nopad_roundtrip() {
        let key = rsa_1024();
        let mut se = se();
        let mut buf = Buf([0; 2048]);
        let mut cmem = Cmem::get_init(&mut buf.0, &ACIPHER_CMEM_LAYOUT).unwrap();

        let mut enc =
            AcipherState::init(&mut cmem, AcipherAlgorithm::RsaNoPad, AcipherMode::Encrypt, &[])
                .unwrap();
        enc.set_key(
            &mut cmem,
            &AcipherKey::RsaPublic {
                modulus: &key.n,
                exponent: &key.e,
            },
        )
        .unwrap();
        let msg = [0x42u8; 20];
        let mut ct = [0u8; 128];
        assert_eq!(enc.do_final(&mut se, &cmem, &msg, &mut ct), Ok(128));
        assert!(enc.is_finalized());
        assert_eq!(
            enc.do_final(&mut se, &cmem, &msg, &mut ct),
            Err(SeError::DRIVER_ACIPHER_INVALID_STATE)
        );
        assert!(se.hal().pka_keyslot(ACIPHER_PKA_SLOT).unwrap().is_clear());
        assert!(!se.hal().is_locked(EngineId::Pka));
        enc.release(&mut cmem);

        let mut dec =
            AcipherState::init(&mut cmem, AcipherAlgorithm::RsaNoPad, AcipherMode::Decrypt, &[])
                .unwrap();
        dec.set_key(
            &mut cmem,
            &AcipherKey::RsaPrivate {
                modulus: &key.n,
                exponent: &key.d,
            },
        )
        .unwrap();
        let mut pt = [0u8; 128];
        assert_eq!(dec.do_final(&mut se, &cmem, &ct, &mut pt), Ok(128));
        assert!(pt[..108].iter().all(|b| *b == 0));
        assert_eq!(pt[108..], msg);
        assert!(se.hal().pka_keyslot(ACIPHER_PKA_SLOT).unwrap().is_clear());
        dec.release(&mut cmem);
        cmem.destroy().unwrap();
    }

    #[test]
    fn test_pkcs1_roundtrip() {
        let key = rsa_1024();
        let mut se = se();
        let mut buf = Buf([0; 2048]);
        let mut cmem = Cmem::get_init(&mut buf.0, &ACIPHER_CMEM_LAYOUT).unwrap();
        let alg = AcipherAlgorithm::RsaPkcs1V15;

        let mut enc = AcipherState::init(&mut cmem, alg, AcipherMode::Encrypt, &[]).unwrap();
        enc.set_key(
            &mut cmem,
            &AcipherKey::RsaPublic {
                modulus: &key.n,
                exponent: &key.e,
            },
        )
        .unwrap();
        let mut ct = [0u8; 128];
        enc.do_final(&mut se, &cmem, b"attack at dawn", &mut ct).unwrap();
        enc.release(&mut cmem);

        let mut dec = AcipherState::init(&mut cmem, alg, AcipherMode::Decrypt, &[]).unwrap();
        dec.set_key(
            &mut cmem,
            &AcipherKey::RsaPrivate {
                modulus: &key.n,
                exponent: &key.d,
            },
        )
        .unwrap();
        let mut small = [0u8; 4];
        assert_eq!(
            dec.do_final(&mut se, &cmem, &ct, &mut small),
            Err(SeError::DRIVER_ACIPHER_OUTPUT_TOO_SMALL)
        );
        let mut pt = [0u8; 128];
        assert_eq!(dec.do_final(&mut se, &cmem, &ct, &mut pt), Ok(14));
        assert_eq!(&pt[..14], b"attack at dawn");
        dec.release(&mut cmem);
    }

    #[test]
    fn test_dh_derive() {
        let mut se = se();
        let mut buf = Buf([0; 2048]);
        let mut cmem = Cmem::get_init(&mut buf.0, &ACIPHER_CMEM_LAYOUT).unwrap();
        let mut prime = [0u8; 128];
        prime[0] = 0x80;
        prime[127] = 0x83;
        let mut state =
            AcipherState::init(&mut cmem, AcipherAlgorithm::Dh, AcipherMode::Derive, &[]).unwrap();
        assert!(state.uses_private_key());
        state
            .set_key(
                &mut cmem,
                &AcipherKey::DhPrivate {
                    prime: &prime,
                    private: &[3],
                },
            )
            .unwrap();
        let mut out = [0u8; 128];
        assert_eq!(state.do_final(&mut se, &cmem, &[2], &mut out), Ok(128));
        assert_eq!(out[127], 8);
        assert!(out[..127].iter().all(|b| *b == 0));
        state.release(&mut cmem);
    }
}
