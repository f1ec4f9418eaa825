/*++

Licensed under the Apache-2.0 license.

File Name:

    aes_kwuw.rs

Abstract:

    File contains the AES key wrap (KW) and key unwrap (KUW) driver.

    The engine wraps the content of a target keyslot with AES-GCM under a
    key encryption key (KEK) held in another slot. The blob is a 16 byte
    manifest (authenticated, not encrypted), the 32 byte wrapped key and the
    16 byte tag. Keys above 128 bits unwrap in two halves.

--*/

use crate::cmem::{Cmem, CmemSlice, CmemTag, CMEM_ALIGN};
use crate::engine::{AesOpConfig, Engine, OpConfig, StartFlags};
use crate::keyslot::{AesKeySize, AsyncOpContext, KeySource, KeyslotLease};
use crate::{first_err, SeError, SeResult};
use bitfield::bitfield;
use se_registers::aes::{
    self, Config, CryptoConfig, KacTarget, AES_BLOCK_SIZE, AES_KEYSLOT_COUNT, KAC_GCM_COUNTER0,
    KAC_KEY_WRAP_BLOB_LEN, KAC_MANIFEST_LEN, KAC_TAG_LEN, KAC_WRAPPED_KEY_LEN,
};
use se_registers::{MemDomain, SeHal};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
use zeroize::Zeroize;

/// GCM nonce length.
pub const KWUW_IV_SIZE: usize = 12;

/// Bounce buffer: manifest or blob in the first half, blob out in the second.
pub const KWUW_BOUNCE_SIZE: usize = 2 * KAC_KEY_WRAP_BLOB_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesAlgorithm {
    EcbNoPad,
    CbcNoPad,
    EcbPkcs7,
    CbcPkcs7,
    Ctr,
    Ofb,
    Kw,
    Kuw,
    Kwuw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesMode {
    Encrypt,
    Decrypt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KwuwOp {
    Wrap,
    Unwrap,
}

/// Select wrap or unwrap for an algorithm and mode pair.
pub fn resolve_kwuw(alg: AesAlgorithm, mode: AesMode) -> SeResult<KwuwOp> {
    match (alg, mode) {
        (AesAlgorithm::Kw, _) => Ok(KwuwOp::Wrap),
        (AesAlgorithm::Kuw, _) => Ok(KwuwOp::Unwrap),
        (AesAlgorithm::EcbPkcs7 | AesAlgorithm::CbcPkcs7, _) => {
            Err(SeError::DRIVER_KWUW_NOT_SUPPORTED)
        }
        (_, AesMode::Encrypt) => Ok(KwuwOp::Wrap),
        (_, AesMode::Decrypt) => Ok(KwuwOp::Unwrap),
    }
}

bitfield! {
    /// Attribute word of a wrapped key manifest
    #[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
    pub struct KacManifest(u32);

    /// Key purpose
    pub purpose, set_purpose: 4, 0;

    /// Owner of the key
    pub user, set_user: 7, 5;

    /// Key size code: 0 = 128, 1 = 192, 2 = 256 bits
    pub key_size, set_key_size: 9, 8;

    /// Flag indicating if the key may be wrapped again after unwrap
    pub exportable, set_exportable: 10;
}

impl KacManifest {
    pub fn aes_key_size(&self) -> Option<AesKeySize> {
        AesKeySize::from_code(self.key_size())
    }
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Zeroize)]
pub struct ManifestHeader {
    pub attributes: u32,
    pub sw: u32,
    pub reserved: [u32; 2],
}

impl ManifestHeader {
    pub fn new(attributes: KacManifest, sw: u32) -> Self {
        Self {
            attributes: attributes.0,
            sw,
            reserved: [0; 2],
        }
    }

    pub fn manifest(&self) -> KacManifest {
        KacManifest(self.attributes)
    }
}

/// Opaque wrapped key as produced by the engine.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Zeroize)]
pub struct WrappedKeyBlob {
    pub header: ManifestHeader,
    pub wrapped_key: [u8; KAC_WRAPPED_KEY_LEN],
    pub tag: [u8; KAC_TAG_LEN],
}

impl WrappedKeyBlob {
    pub fn parse(bytes: &[u8]) -> SeResult<Self> {
        let blob = Self::read_from_bytes(bytes).map_err(|_| SeError::DRIVER_KWUW_INVALID_BLOB)?;
        blob.key_size()?;
        Ok(blob)
    }

    pub fn key_size(&self) -> SeResult<AesKeySize> {
        self.header
            .manifest()
            .aes_key_size()
            .ok_or(SeError::DRIVER_KWUW_INVALID_BLOB)
    }
}

pub struct KwArgs<'k> {
    pub kek: KeySource<'k>,
    pub kek_slot: u32,
    pub leave_kek_resident: bool,
    /// Slot holding the key to wrap.
    pub target_slot: u32,
    pub target_size: AesKeySize,
    pub iv: [u8; KWUW_IV_SIZE],
    /// Manifest to bind. Its key size field is set from `target_size`.
    pub header: ManifestHeader,
}

pub struct KuwArgs<'k, 'b> {
    pub kek: KeySource<'k>,
    pub kek_slot: u32,
    pub leave_kek_resident: bool,
    /// Slot receiving the unwrapped key.
    pub target_slot: u32,
    pub iv: [u8; KWUW_IV_SIZE],
    pub blob: &'b WrappedKeyBlob,
}

pub(crate) fn check_slots(kek_slot: u32, target_slot: u32) -> SeResult<()> {
    if kek_slot >= AES_KEYSLOT_COUNT || target_slot >= AES_KEYSLOT_COUNT {
        Err(SeError::DRIVER_KEYSLOT_INVALID_INDEX)?;
    }
    if kek_slot == target_slot {
        Err(SeError::DRIVER_KWUW_INVALID_SLOTS)?;
    }
    Ok(())
}

/// Build the initial GCM counter block. The nonce is loaded as three little
/// endian words; the last word carries Counter0 big-endian in memory order.
fn counter_words(iv: &[u8; KWUW_IV_SIZE], words: &mut [u32; 4]) {
    for (word, bytes) in words.iter_mut().zip(iv.chunks_exact(4)) {
        *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }
    words[3] = u32::from_le_bytes(KAC_GCM_COUNTER0.to_be_bytes());
}

fn write_counter<H: SeHal>(engine: &mut Engine<'_, H>, words: &[u32; 4]) {
    for (i, word) in words.iter().enumerate() {
        engine.write_reg(aes::LINEAR_CTR + 4 * i as u32, *word);
    }
}

fn scrub_counter<H: SeHal>(engine: &mut Engine<'_, H>) {
    write_counter(engine, &[0; 4]);
}

/// Run `f` with a bounce slice, releasing it on every path.
fn with_bounce<T>(
    cmem: &mut Cmem,
    f: impl FnOnce(&mut Cmem, &CmemSlice) -> SeResult<T>,
) -> SeResult<T> {
    let bounce = cmem.allocate(CmemTag::DmaBuf, CMEM_ALIGN, KWUW_BOUNCE_SIZE)?;
    let result = f(cmem, &bounce);
    cmem.release(CmemTag::DmaBuf, bounce);
    result
}

/// Wrap the key in `args.target_slot` into `dst`. Returns the blob length.
pub fn key_wrap<H: SeHal>(
    engine: &mut Engine<'_, H>,
    cmem: &mut Cmem,
    args: &KwArgs,
    dst: &mut [u8],
) -> SeResult<usize> {
    check_slots(args.kek_slot, args.target_slot)?;
    if dst.len() < KAC_KEY_WRAP_BLOB_LEN {
        Err(SeError::DRIVER_KWUW_INVALID_DST)?;
    }
    let mut header = args.header;
    let mut attributes = header.manifest();
    attributes.set_key_size(args.target_size.code());
    header.attributes = attributes.0;

    with_bounce(cmem, |cmem, bounce| {
        let buf = cmem.slice_mut(bounce)?;
        let (input, output) = buf.split_at_mut(KAC_KEY_WRAP_BLOB_LEN);
        let input = &mut input[..KAC_MANIFEST_LEN];
        let output = &mut output[..KAC_KEY_WRAP_BLOB_LEN];
        input.copy_from_slice(header.as_bytes());

        let mut ctx = AsyncOpContext::new(&args.kek, args.leave_kek_resident);
        let mut lease = KeyslotLease::acquire(engine, args.kek_slot, &args.kek)?;
        ctx.started = true;

        counter_words(&args.iv, &mut ctx.scratch.counter);
        write_counter(&mut lease, &ctx.scratch.counter);
        let target = KacTarget::SLOT.val(args.target_slot)
            + KacTarget::KEY_SIZE.val(args.target_size.code());
        lease.write_reg(aes::KAC_TARGET, target.value);

        let mut cfg = AesOpConfig::new(
            Config::ALG::KEY_WRAP + Config::DST::MEMORY + args.kek.size().config(),
            CryptoConfig::MODE::GCM + CryptoConfig::KEY_INDEX.val(args.kek_slot),
        );
        cfg.input = Some(lease.map_input(input, MemDomain::Kernel)?);
        let out_region = lease.map_output(output, MemDomain::Kernel)?;
        cfg.output = Some(out_region);
        cfg.last_block = (KAC_MANIFEST_LEN / AES_BLOCK_SIZE - 1) as u32;

        let result = lease.execute(&OpConfig::Aes(cfg), StartFlags::INIT);
        lease.complete_output(&out_region);
        scrub_counter(&mut lease);
        result?;

        dst[..KAC_KEY_WRAP_BLOB_LEN].copy_from_slice(output);
        lease.finish(ctx.leave_key_resident)?;
        Ok(KAC_KEY_WRAP_BLOB_LEN)
    })
}

/// Unwrap `args.blob` into `args.target_slot`. No data bytes are produced.
pub fn key_unwrap<H: SeHal>(
    engine: &mut Engine<'_, H>,
    cmem: &mut Cmem,
    args: &KuwArgs,
) -> SeResult<usize> {
    check_slots(args.kek_slot, args.target_slot)?;
    let key_size = args.blob.key_size()?;

    with_bounce(cmem, |cmem, bounce| {
        let buf = cmem.slice_mut(bounce)?;
        let input = &mut buf[..KAC_KEY_WRAP_BLOB_LEN];
        input.copy_from_slice(args.blob.as_bytes());

        let mut ctx = AsyncOpContext::new(&args.kek, args.leave_kek_resident);
        let mut lease = KeyslotLease::acquire(engine, args.kek_slot, &args.kek)?;
        counter_words(&args.iv, &mut ctx.scratch.counter);
        ctx.scratch.tag.copy_from_slice(&args.blob.tag);

        let input = lease.map_input(input, MemDomain::Kernel)?;
        let result = lease.clear_keyslot(args.target_slot, true).and_then(|_| {
            // The KEK stays resident across both halves; the lease settles
            // residency once after the last one.
            let halves: &[bool] = match key_size {
                AesKeySize::Aes128 => &[false],
                _ => &[false, true],
            };
            halves.iter().try_for_each(|&upper| {
                let flags = if ctx.started {
                    StartFlags::empty()
                } else {
                    StartFlags::INIT
                };
                ctx.started = true;
                write_counter(&mut lease, &ctx.scratch.counter);
                let target = KacTarget::SLOT.val(args.target_slot)
                    + KacTarget::KEY_SIZE.val(key_size.code());
                lease.write_reg(aes::KAC_TARGET, target.value);

                let mut crypto_config =
                    CryptoConfig::MODE::GCM + CryptoConfig::KEY_INDEX.val(args.kek_slot);
                if upper {
                    crypto_config += CryptoConfig::UPPER_QUAD::SET;
                }
                let mut cfg = AesOpConfig::new(
                    Config::ALG::KEY_UNWRAP + Config::DST::KEYTABLE + args.kek.size().config(),
                    crypto_config,
                );
                cfg.input = Some(input);
                cfg.last_block = (KAC_KEY_WRAP_BLOB_LEN / AES_BLOCK_SIZE - 1) as u32;
                lease.execute(&OpConfig::Aes(cfg), flags)
            })
        });
        scrub_counter(&mut lease);

        match result {
            Ok(()) => {
                lease.finish(ctx.leave_key_resident)?;
                Ok(0)
            }
            Err(err) => {
                let cleanup = lease.clear_keyslot(args.target_slot, true);
                first_err(Err(err), cleanup)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_layout::KWUW_CMEM_LAYOUT;
    use se_emu::SeEmulator;
    use se_registers::aes::{KAC_MANIFEST_KEY_SIZE_MASK, KAC_MANIFEST_KEY_SIZE_SHIFT};
    use se_registers::EngineId;

    #[repr(C, align(64))]
    struct Backing([u8; 1024]);

    const KEK: [u8; 32] = [0x42; 32];
    const IV: [u8; 12] = [0x0c; 12];

    #[test]
    fn test_resolve() {
        assert_eq!(resolve_kwuw(AesAlgorithm::Kw, AesMode::Decrypt), Ok(KwuwOp::Wrap));
        assert_eq!(resolve_kwuw(AesAlgorithm::Kwuw, AesMode::Decrypt), Ok(KwuwOp::Unwrap));
        assert_eq!(resolve_kwuw(AesAlgorithm::Ctr, AesMode::Encrypt), Ok(KwuwOp::Wrap));
        assert_eq!(
            resolve_kwuw(AesAlgorithm::CbcPkcs7, AesMode::Encrypt),
            Err(SeError::DRIVER_KWUW_NOT_SUPPORTED)
        );
    }

    #[test]
    fn test_manifest_matches_register_layout() {
        let mut manifest = KacManifest::default();
        manifest.set_key_size(2);
        manifest.set_exportable(true);
        assert_eq!(
            (manifest.0 >> KAC_MANIFEST_KEY_SIZE_SHIFT) & KAC_MANIFEST_KEY_SIZE_MASK,
            2
        );
        assert_eq!(manifest.0, 0x600);
        assert_eq!(core::mem::size_of::<WrappedKeyBlob>(), KAC_KEY_WRAP_BLOB_LEN);
    }

    #[test]
    fn test_counter_block() {
        let mut words = [0u32; 4];
        counter_words(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12], &mut words);
        assert_eq!(words[0], 0x0403_0201);
        assert_eq!(words[3].to_le_bytes(), [0, 0, 0, 1]);
    }

    #[test]
    fn test_parse_rejects_bad_blob() {
        assert_eq!(
            WrappedKeyBlob::parse(&[0u8; 63]).err(),
            Some(SeError::DRIVER_KWUW_INVALID_BLOB)
        );
        let mut bytes = [0u8; 64];
        bytes[1] = 0x03;
        assert_eq!(
            WrappedKeyBlob::parse(&bytes).err(),
            Some(SeError::DRIVER_KWUW_INVALID_BLOB)
        );
    }

    #[test]
    fn test_same_slot_rejected() {
        let mut emu = SeEmulator::new();
        let mut backing = Backing([0; 1024]);
        let mut cmem = Cmem::get_init(&mut backing.0, &KWUW_CMEM_LAYOUT).unwrap();
        let mut engine = Engine::lock(&mut emu, EngineId::Aes0).unwrap();
        let args = KwArgs {
            kek: KeySource::Raw {
                size: AesKeySize::Aes256,
                key: &KEK,
            },
            kek_slot: 1,
            leave_kek_resident: false,
            target_slot: 1,
            target_size: AesKeySize::Aes256,
            iv: IV,
            header: ManifestHeader::default(),
        };
        let mut blob = [0u8; 64];
        assert_eq!(
            key_wrap(&mut engine, &mut cmem, &args, &mut blob),
            Err(SeError::DRIVER_KWUW_INVALID_SLOTS)
        );
        let mut short = [0u8; 32];
        let args = KwArgs {
            target_slot: 2,
            ..args
        };
        assert_eq!(
            key_wrap(&mut engine, &mut cmem, &args, &mut short),
            Err(SeError::DRIVER_KWUW_INVALID_DST)
        );
    }

    #[test]
    fn test_roundtrip_256() {
        let mut emu = SeEmulator::new();
        let key: [u8; 32] = core::array::from_fn(|i| i as u8 + 1);
        emu.set_aes_key(EngineId::Aes1, 3, &key);
        let mut backing = Backing([0; 1024]);
        let mut blob = [0u8; 64];
        {
            let mut cmem = Cmem::get_init(&mut backing.0, &KWUW_CMEM_LAYOUT).unwrap();
            let mut engine = Engine::lock(&mut emu, EngineId::Aes1).unwrap();
            let kek = KeySource::Raw {
                size: AesKeySize::Aes256,
                key: &KEK,
            };
            let wrap = KwArgs {
                kek,
                kek_slot: 0,
                leave_kek_resident: false,
                target_slot: 3,
                target_size: AesKeySize::Aes256,
                iv: IV,
                header: ManifestHeader::new(KacManifest(0x3), 0x1234),
            };
            assert_eq!(key_wrap(&mut engine, &mut cmem, &wrap, &mut blob), Ok(64));
            assert_eq!(cmem.entries(), 0);

            let parsed = WrappedKeyBlob::parse(&blob).unwrap();
            assert_eq!(parsed.key_size(), Ok(AesKeySize::Aes256));
            assert_eq!(parsed.header.sw, 0x1234);
            let unwrap = KuwArgs {
                kek,
                kek_slot: 0,
                leave_kek_resident: false,
                target_slot: 9,
                iv: IV,
                blob: &parsed,
            };
            assert_eq!(key_unwrap(&mut engine, &mut cmem, &unwrap), Ok(0));
        }
        assert_eq!(emu.aes_keyslot(EngineId::Aes1, 9).unwrap().key_bytes(), key);
        assert!(emu.aes_keyslot(EngineId::Aes1, 0).unwrap().is_clear());
    }

    #[test]
    fn test_roundtrip_192() {
        let mut emu = SeEmulator::new();
        let mut key = [0xeeu8; 32];
        for (i, b) in key[..24].iter_mut().enumerate() {
            *b = 0x30 + i as u8;
        }
        emu.set_aes_key(EngineId::Aes0, 4, &key);
        // Stale content in the destination must not survive the unwrap.
        emu.set_aes_key(EngineId::Aes0, 11, &[0xab; 32]);
        let mut backing = Backing([0; 1024]);
        let mut blob = [0u8; 64];
        {
            let mut cmem = Cmem::get_init(&mut backing.0, &KWUW_CMEM_LAYOUT).unwrap();
            let mut engine = Engine::lock(&mut emu, EngineId::Aes0).unwrap();
            let kek = KeySource::Raw {
                size: AesKeySize::Aes256,
                key: &KEK,
            };
            let wrap = KwArgs {
                kek,
                kek_slot: 2,
                leave_kek_resident: false,
                target_slot: 4,
                target_size: AesKeySize::Aes192,
                iv: IV,
                header: ManifestHeader::default(),
            };
            assert_eq!(key_wrap(&mut engine, &mut cmem, &wrap, &mut blob), Ok(64));
            let parsed = WrappedKeyBlob::parse(&blob).unwrap();
            assert_eq!(parsed.key_size(), Ok(AesKeySize::Aes192));
            let unwrap = KuwArgs {
                kek,
                kek_slot: 2,
                leave_kek_resident: false,
                target_slot: 11,
                iv: IV,
                blob: &parsed,
            };
            assert_eq!(key_unwrap(&mut engine, &mut cmem, &unwrap), Ok(0));
        }
        let restored = emu.aes_keyslot(EngineId::Aes0, 11).unwrap().key_bytes();
        assert_eq!(restored[..24], key[..24]);
        assert_eq!(restored[24..], [0u8; 8]);
        assert!(emu.aes_keyslot(EngineId::Aes0, 2).unwrap().is_clear());
    }

    #[test]
    fn test_tampered_blob_clears_target() {
        let mut emu = SeEmulator::new();
        let key = [0x77u8; 32];
        emu.set_aes_key(EngineId::Aes0, 3, &key);
        emu.set_aes_key(EngineId::Aes0, 5, &key);
        let mut backing = Backing([0; 1024]);
        let mut blob = [0u8; 64];
        {
            let mut cmem = Cmem::get_init(&mut backing.0, &KWUW_CMEM_LAYOUT).unwrap();
            let mut engine = Engine::lock(&mut emu, EngineId::Aes0).unwrap();
            let kek = KeySource::Raw {
                size: AesKeySize::Aes128,
                key: &KEK[..16],
            };
            let wrap = KwArgs {
                kek,
                kek_slot: 0,
                leave_kek_resident: false,
                target_slot: 3,
                target_size: AesKeySize::Aes128,
                iv: IV,
                header: ManifestHeader::default(),
            };
            key_wrap(&mut engine, &mut cmem, &wrap, &mut blob).unwrap();
            blob[20] ^= 1;
            let parsed = WrappedKeyBlob::parse(&blob).unwrap();
            let unwrap = KuwArgs {
                kek,
                kek_slot: 0,
                leave_kek_resident: false,
                target_slot: 5,
                iv: IV,
                blob: &parsed,
            };
            assert_eq!(
                key_unwrap(&mut engine, &mut cmem, &unwrap),
                Err(SeError::DRIVER_AES0_ENGINE_ERROR)
            );
        }
        assert!(emu.aes_keyslot(EngineId::Aes0, 5).unwrap().is_clear());
        assert!(emu.aes_keyslot(EngineId::Aes0, 0).unwrap().is_clear());
    }
}
