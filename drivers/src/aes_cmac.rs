/*++

Licensed under the Apache-2.0 license.

File Name:

    aes_cmac.rs

Abstract:

    File contains the AES-CMAC (OMAC1) accumulator.

    The engine has no native CMAC update mode. A message is processed one
    chunk of whole blocks per hardware task, and the running MAC is carried
    into the next task through the keyslot's updated IV. The last chunk sets
    CMAC_FINAL so the engine folds in subkey K1. Chunks never hold a partial
    block, so K2 is never used.

--*/

use crate::engine::{AesOpConfig, Engine, OpConfig, StartFlags};
use crate::keyslot::{AesKeySize, AsyncOpContext, IvSelect, KeySource, KeyslotLease};
use crate::{SeError, SeResult};
use se_registers::aes::{self, Config, CryptoConfig, AES_BLOCK_SIZE};
use se_registers::{EngineId, MemDomain, SeHal};
use zeroize::Zeroize;

pub const CMAC_TAG_SIZE: usize = 16;

/// Largest chunk one hardware task accepts.
pub const CMAC_MAX_CHUNK: usize = (1 << 24) - AES_BLOCK_SIZE;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CmacFlags {
    /// Zero the result registers after each task.
    pub clear_result: bool,
    /// Clear a preset key once the MAC is complete.
    pub clear_key_after_use: bool,
    /// Leave a caller supplied key in the keyslot after the final chunk.
    pub leave_key_resident: bool,
}

pub struct AesCmac {
    engine: EngineId,
    slot: u32,
    key_size: AesKeySize,
    flags: CmacFlags,
    ctx: AsyncOpContext,
    done: bool,
}

impl AesCmac {
    pub fn new(
        engine: EngineId,
        slot: u32,
        key_size: AesKeySize,
        flags: CmacFlags,
    ) -> SeResult<Self> {
        if !engine.is_aes() {
            Err(SeError::DRIVER_ENGINE_CONFIG_MISMATCH)?;
        }
        if slot >= aes::AES_KEYSLOT_COUNT {
            Err(SeError::DRIVER_KEYSLOT_INVALID_INDEX)?;
        }
        Ok(Self {
            engine,
            slot,
            key_size,
            flags,
            ctx: AsyncOpContext::default(),
            done: false,
        })
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn engine(&self) -> EngineId {
        self.engine
    }

    /// Feed a chunk that is not the end of the message.
    pub fn update<H: SeHal>(
        &mut self,
        engine: &mut Engine<'_, H>,
        key: Option<&[u8]>,
        chunk: &[u8],
    ) -> SeResult<()> {
        self.process(engine, key, chunk, false)
    }

    /// Feed the last chunk and write the tag into `dst`.
    pub fn finalize<H: SeHal>(
        &mut self,
        engine: &mut Engine<'_, H>,
        key: Option<&[u8]>,
        chunk: &[u8],
        dst: &mut [u8],
    ) -> SeResult<usize> {
        if self.done {
            Err(SeError::DRIVER_CMAC_INVALID_STATE)?;
        }
        if dst.len() < CMAC_TAG_SIZE {
            Err(SeError::DRIVER_CMAC_INVALID_DST)?;
        }
        self.process(engine, key, chunk, true)?;
        dst[..CMAC_TAG_SIZE].copy_from_slice(&self.ctx.scratch.tag);
        self.ctx.scratch.tag.zeroize();
        Ok(CMAC_TAG_SIZE)
    }

    /// Feed `buf` as the last chunk and write the tag over its head.
    pub fn finalize_in_place<H: SeHal>(
        &mut self,
        engine: &mut Engine<'_, H>,
        key: Option<&[u8]>,
        buf: &mut [u8],
    ) -> SeResult<usize> {
        self.process(engine, key, buf, true)?;
        buf[..CMAC_TAG_SIZE].copy_from_slice(&self.ctx.scratch.tag);
        self.ctx.scratch.tag.zeroize();
        Ok(CMAC_TAG_SIZE)
    }

    fn check_chunk(chunk: &[u8]) -> SeResult<()> {
        if chunk.is_empty() || chunk.len() % AES_BLOCK_SIZE != 0 {
            Err(SeError::DRIVER_CMAC_INVALID_CHUNK)?;
        }
        if chunk.len() > CMAC_MAX_CHUNK {
            Err(SeError::DRIVER_CMAC_CHUNK_TOO_BIG)?;
        }
        Ok(())
    }

    fn process<H: SeHal>(
        &mut self,
        engine: &mut Engine<'_, H>,
        key: Option<&[u8]>,
        chunk: &[u8],
        last: bool,
    ) -> SeResult<()> {
        if self.done {
            Err(SeError::DRIVER_CMAC_INVALID_STATE)?;
        }
        Self::check_chunk(chunk)?;
        if engine.id() != self.engine {
            Err(SeError::DRIVER_ENGINE_CONFIG_MISMATCH)?;
        }
        // A raw key is cleared after every chunk, so every chunk of a raw
        // key message must bring it again.
        if self.ctx.started && key.is_none() != self.ctx.use_preset_key {
            Err(SeError::DRIVER_CMAC_INVALID_KEY)?;
        }
        let source = match key {
            Some(key) => KeySource::Raw {
                size: self.key_size,
                key,
            },
            None => KeySource::Preset {
                size: self.key_size,
                clear_after_use: self.flags.clear_key_after_use,
            },
        };

        let result = self.run_chunk(engine, &source, chunk, last);
        if result.is_err() {
            self.done = true;
            self.ctx.zeroize();
        }
        result
    }

    fn run_chunk<H: SeHal>(
        &mut self,
        engine: &mut Engine<'_, H>,
        source: &KeySource,
        chunk: &[u8],
        last: bool,
    ) -> SeResult<()> {
        let slot = self.slot;
        let mut lease = KeyslotLease::acquire(engine, slot, source)?;

        let iv_select = if self.ctx.started {
            lease.write_iv(slot, IvSelect::Updated, Some(&self.ctx.scratch.tag))?;
            CryptoConfig::IV_SELECT::UPDATED
        } else {
            self.ctx.use_preset_key = source.is_preset();
            lease.write_iv(slot, IvSelect::Original, None)?;
            CryptoConfig::IV_SELECT::ORIGINAL
        };

        let mut crypto_config =
            CryptoConfig::MODE::CMAC + CryptoConfig::KEY_INDEX.val(slot) + iv_select;
        if last {
            crypto_config += CryptoConfig::CMAC_FINAL::SET;
        }
        let mut cfg = AesOpConfig::new(
            Config::ALG::CMAC + Config::DST::CMAC_REG + self.key_size.config(),
            crypto_config,
        );
        cfg.input = Some(lease.map_input(chunk, MemDomain::Client)?);
        cfg.last_block = (chunk.len() / AES_BLOCK_SIZE - 1) as u32;

        lease.execute(&OpConfig::Aes(cfg), StartFlags::empty())?;

        for (i, bytes) in self.ctx.scratch.tag.chunks_exact_mut(4).enumerate() {
            let offset = aes::CMAC_RESULT + 4 * i as u32;
            bytes.copy_from_slice(&lease.read_reg(offset).to_le_bytes());
            if self.flags.clear_result {
                lease.write_reg(offset, 0);
            }
        }
        self.ctx.started = true;

        let leave_resident = if last {
            self.done = true;
            self.flags.leave_key_resident
        } else {
            self.ctx.use_preset_key
        };
        if !lease.is_armed() || leave_resident {
            // The chaining value must not outlive the task in a slot that
            // is not being cleared.
            lease.write_iv(slot, IvSelect::Original, None)?;
            lease.write_iv(slot, IvSelect::Updated, None)?;
        }
        lease.finish(leave_resident)
    }
}

/// One-shot CMAC of `msg` under `source`, split at the hardware chunk limit.
pub fn aes_cmac<H: SeHal>(
    engine: &mut Engine<'_, H>,
    slot: u32,
    source: KeySource,
    msg: &[u8],
) -> SeResult<[u8; CMAC_TAG_SIZE]> {
    if msg.is_empty() || msg.len() % AES_BLOCK_SIZE != 0 {
        Err(SeError::DRIVER_CMAC_INVALID_CHUNK)?;
    }
    let (key, flags) = match source {
        KeySource::Raw { key, .. } => (Some(key), CmacFlags::default()),
        KeySource::Preset {
            clear_after_use, ..
        } => (
            None,
            CmacFlags {
                clear_key_after_use: clear_after_use,
                ..Default::default()
            },
        ),
    };
    let flags = CmacFlags {
        clear_result: true,
        ..flags
    };
    let mut cmac = AesCmac::new(engine.id(), slot, source.size(), flags)?;
    let mut chunks = msg.chunks(CMAC_MAX_CHUNK).peekable();
    let mut tag = [0u8; CMAC_TAG_SIZE];
    while let Some(chunk) = chunks.next() {
        if chunks.peek().is_some() {
            cmac.update(engine, key, chunk)?;
        } else {
            cmac.finalize(engine, key, chunk, &mut tag)?;
        }
    }
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use se_emu::SeEmulator;

    const KEY: [u8; 16] = hex!("2b7e151628aed2a6abf7158809cf4f3c");
    const MSG: [u8; 16] = hex!("6bc1bee22e409f96e93d7e117393172a");
    const TAG: [u8; 16] = hex!("070a16b46b4d4144f79bdd9dd04a287c");

    fn raw(key: &[u8]) -> KeySource {
        KeySource::Raw {
            size: AesKeySize::Aes128,
            key,
        }
    }

    #[test]
    fn test_one_block() {
        let mut emu = SeEmulator::new();
        {
            let mut engine = Engine::lock(&mut emu, EngineId::Aes0).unwrap();
            assert_eq!(aes_cmac(&mut engine, 4, raw(&KEY), &MSG).unwrap(), TAG);
        }
        assert!(emu.aes_keyslot(EngineId::Aes0, 4).unwrap().is_clear());
        assert_eq!(emu.cmac_result(EngineId::Aes0), Some([0; 4]));
    }

    #[test]
    fn test_bad_chunks() {
        let mut emu = SeEmulator::new();
        let mut engine = Engine::lock(&mut emu, EngineId::Aes0).unwrap();
        let mut cmac =
            AesCmac::new(EngineId::Aes0, 0, AesKeySize::Aes128, CmacFlags::default()).unwrap();
        assert_eq!(
            cmac.update(&mut engine, Some(&KEY), &[]),
            Err(SeError::DRIVER_CMAC_INVALID_CHUNK)
        );
        assert_eq!(
            cmac.update(&mut engine, Some(&KEY), &MSG[..15]),
            Err(SeError::DRIVER_CMAC_INVALID_CHUNK)
        );
        let mut short = [0u8; 8];
        assert_eq!(
            cmac.finalize(&mut engine, Some(&KEY), &MSG, &mut short),
            Err(SeError::DRIVER_CMAC_INVALID_DST)
        );
    }

    #[test]
    fn test_call_after_final() {
        let mut emu = SeEmulator::new();
        let mut engine = Engine::lock(&mut emu, EngineId::Aes1).unwrap();
        let mut cmac =
            AesCmac::new(EngineId::Aes1, 1, AesKeySize::Aes128, CmacFlags::default()).unwrap();
        let mut tag = [0u8; 16];
        cmac.finalize(&mut engine, Some(&KEY), &MSG, &mut tag).unwrap();
        assert_eq!(tag, TAG);
        assert!(cmac.is_done());
        assert_eq!(
            cmac.update(&mut engine, Some(&KEY), &MSG),
            Err(SeError::DRIVER_CMAC_INVALID_STATE)
        );
    }

    #[test]
    fn test_in_place() {
        let mut emu = SeEmulator::new();
        let mut engine = Engine::lock(&mut emu, EngineId::Aes0).unwrap();
        let mut cmac =
            AesCmac::new(EngineId::Aes0, 2, AesKeySize::Aes128, CmacFlags::default()).unwrap();
        let mut buf = MSG;
        assert_eq!(
            cmac.finalize_in_place(&mut engine, Some(&KEY), &mut buf),
            Ok(CMAC_TAG_SIZE)
        );
        assert_eq!(buf, TAG);
    }

    #[test]
    fn test_key_source_must_not_change() {
        let mut emu = SeEmulator::new();
        let mut engine = Engine::lock(&mut emu, EngineId::Aes0).unwrap();
        let mut cmac =
            AesCmac::new(EngineId::Aes0, 2, AesKeySize::Aes128, CmacFlags::default()).unwrap();
        cmac.update(&mut engine, Some(&KEY), &MSG).unwrap();
        assert_eq!(
            cmac.update(&mut engine, None, &MSG),
            Err(SeError::DRIVER_CMAC_INVALID_KEY)
        );
    }

    #[test]
    fn test_wrong_engine() {
        assert_eq!(
            AesCmac::new(EngineId::Pka, 0, AesKeySize::Aes128, CmacFlags::default()).err(),
            Some(SeError::DRIVER_ENGINE_CONFIG_MISMATCH)
        );
    }

    #[test]
    fn test_preset_key_left_resident() {
        let mut emu = SeEmulator::new();
        let mut key = [0u8; 32];
        key[..16].copy_from_slice(&KEY);
        emu.set_aes_key(EngineId::Aes0, 6, &key);
        {
            let mut engine = Engine::lock(&mut emu, EngineId::Aes0).unwrap();
            let source = KeySource::Preset {
                size: AesKeySize::Aes128,
                clear_after_use: false,
            };
            assert_eq!(aes_cmac(&mut engine, 6, source, &MSG).unwrap(), TAG);
        }
        let slot = emu.aes_keyslot(EngineId::Aes0, 6).unwrap();
        assert_eq!(slot.key_bytes(), key);
        assert_eq!(slot.updated_iv_bytes(), [0u8; 16]);
    }
}
