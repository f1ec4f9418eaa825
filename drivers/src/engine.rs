/*++

Licensed under the Apache-2.0 license.

File Name:

    engine.rs

Abstract:

    File contains the engine lock guard and the operation sequencer shared by
    every algorithm: program registers, start, poll until idle, check the
    error status.

--*/

use crate::{cwarn, wait, SeError, SeResult};
use se_registers::aes::{self, AddrHi, AES_DMA_MAX_SIZE};
use se_registers::pka;
use se_registers::tock_registers::fields::FieldValue;
use se_registers::tock_registers::LocalRegisterCopy;
use se_registers::{common, EngineId, MemDomain, Operation, SeHal, Status};

/// Poll ceiling of `wait_until_free`.
pub const SE_MAX_POLL_COUNT: u32 = 0x0010_0000;

/// Widest physical address the DMA address registers encode.
const SE_DMA_REG_ADDR_BITS: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqState {
    Idle,
    Configured,
    Started,
    Error,
}

bitflags::bitflags! {
    /// Extra bits for the start command. Last-buffer is always set.
    pub struct StartFlags: u32 {
        /// First buffer of a new hardware task.
        const INIT = Operation::INIT::SET.value;
    }
}

/// A buffer translated, range checked and flushed for engine DMA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRegion {
    phys: u64,
    len: u32,
    host: usize,
}

impl DmaRegion {
    pub fn phys(&self) -> u64 {
        self.phys
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn lo(&self) -> u32 {
        self.phys as u32
    }

    fn hi(&self) -> u32 {
        (AddrHi::MSB.val((self.phys >> 32) as u32) + AddrHi::SZ.val(self.len)).value
    }
}

pub struct AesOpConfig {
    pub config: LocalRegisterCopy<u32, aes::Config::Register>,
    pub crypto_config: LocalRegisterCopy<u32, aes::CryptoConfig::Register>,
    pub input: Option<DmaRegion>,
    pub output: Option<DmaRegion>,
    /// Index of the last 16-byte block of the task.
    pub last_block: u32,
}

impl AesOpConfig {
    pub fn new(
        config: FieldValue<u32, aes::Config::Register>,
        crypto_config: FieldValue<u32, aes::CryptoConfig::Register>,
    ) -> Self {
        Self {
            config: LocalRegisterCopy::new(config.value),
            crypto_config: LocalRegisterCopy::new(crypto_config.value),
            input: None,
            output: None,
            last_block: 0,
        }
    }
}

pub struct PkaOpConfig {
    pub ctrl: LocalRegisterCopy<u32, pka::Ctrl::Register>,
}

pub enum OpConfig {
    Aes(AesOpConfig),
    Pka(PkaOpConfig),
}

/// Exclusive ownership of one engine.
///
/// The external mutex is held from `lock` until drop. Sequencer and keyslot
/// operations are only reachable through this guard.
pub struct Engine<'a, H: SeHal> {
    hal: &'a mut H,
    id: EngineId,
    state: SeqState,
}

impl<'a, H: SeHal> Engine<'a, H> {
    pub fn lock(hal: &'a mut H, id: EngineId) -> SeResult<Self> {
        if !hal.acquire(id) {
            Err(SeError::DRIVER_ENGINE_LOCK_FAILED)?;
        }
        Ok(Self {
            hal,
            id,
            state: SeqState::Idle,
        })
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn state(&self) -> SeqState {
        self.state
    }

    pub(crate) fn read_reg(&mut self, offset: u32) -> u32 {
        self.hal.get_reg(self.id, offset)
    }

    pub(crate) fn write_reg(&mut self, offset: u32, val: u32) {
        self.hal.set_reg(self.id, offset, val)
    }

    fn engine_error(&self) -> SeError {
        match self.id {
            EngineId::Aes0 => SeError::DRIVER_AES0_ENGINE_ERROR,
            EngineId::Aes1 => SeError::DRIVER_AES1_ENGINE_ERROR,
            EngineId::Pka => SeError::DRIVER_PKA_ENGINE_ERROR,
        }
    }

    /// Map a buffer the engine will read.
    pub fn map_input(&mut self, buf: &[u8], domain: MemDomain) -> SeResult<DmaRegion> {
        self.map(buf.as_ptr() as usize, buf.len(), domain)
    }

    /// Map a buffer the engine will write. Call `complete_output` once the
    /// operation has finished.
    pub fn map_output(&mut self, buf: &mut [u8], domain: MemDomain) -> SeResult<DmaRegion> {
        self.map(buf.as_mut_ptr() as usize, buf.len(), domain)
    }

    fn map(&mut self, addr: usize, len: usize, domain: MemDomain) -> SeResult<DmaRegion> {
        if len > AES_DMA_MAX_SIZE as usize {
            Err(SeError::DRIVER_ENGINE_DMA_TOO_BIG)?;
        }
        let phys = self
            .hal
            .to_phys(domain, addr, len)
            .ok_or(SeError::DRIVER_ENGINE_DMA_TRANSLATION)?;
        let bits = self.hal.dma_addr_bits().min(SE_DMA_REG_ADDR_BITS);
        let end = phys
            .checked_add(len as u64)
            .ok_or(SeError::DRIVER_ENGINE_DMA_OUT_OF_RANGE)?;
        if end > (1u64 << bits) {
            Err(SeError::DRIVER_ENGINE_DMA_OUT_OF_RANGE)?;
        }
        self.hal.flush(addr, len);
        Ok(DmaRegion {
            phys,
            len: len as u32,
            host: addr,
        })
    }

    pub fn complete_output(&mut self, region: &DmaRegion) {
        self.hal.invalidate(region.host, region.len());
    }

    /// Program the mode, algorithm and DMA registers of the next task.
    pub fn configure(&mut self, cfg: &OpConfig) -> SeResult<()> {
        if self.state == SeqState::Started {
            Err(SeError::DRIVER_ENGINE_INVALID_STATE)?;
        }
        match cfg {
            OpConfig::Aes(c) if self.id.is_aes() => {
                self.write_reg(aes::CONFIG, c.config.get());
                self.write_reg(aes::CRYPTO_CONFIG, c.crypto_config.get());
                let (lo, hi) = c.input.map(|r| (r.lo(), r.hi())).unwrap_or((0, 0));
                self.write_reg(aes::IN_ADDR, lo);
                self.write_reg(aes::IN_ADDR_HI, hi);
                let (lo, hi) = c.output.map(|r| (r.lo(), r.hi())).unwrap_or((0, 0));
                self.write_reg(aes::OUT_ADDR, lo);
                self.write_reg(aes::OUT_ADDR_HI, hi);
                self.write_reg(aes::LAST_BLOCK, c.last_block);
            }
            OpConfig::Pka(c) if self.id == EngineId::Pka => {
                self.write_reg(pka::CTRL, c.ctrl.get());
            }
            _ => Err(SeError::DRIVER_ENGINE_CONFIG_MISMATCH)?,
        }
        self.state = SeqState::Configured;
        Ok(())
    }

    /// Issue the start command. Each call is one complete hardware task, so
    /// last-buffer is always set.
    pub fn start(&mut self, flags: StartFlags) -> SeResult<()> {
        if self.state != SeqState::Configured {
            Err(SeError::DRIVER_ENGINE_INVALID_STATE)?;
        }
        let op = Operation::OP::START + Operation::LASTBUF::SET;
        self.write_reg(common::OPERATION, op.value | flags.bits());
        self.state = SeqState::Started;
        Ok(())
    }

    pub fn wait_until_free(&mut self) -> SeResult<()> {
        if self.state != SeqState::Started {
            Err(SeError::DRIVER_ENGINE_INVALID_STATE)?;
        }
        let id = self.id;
        let hal = &mut *self.hal;
        let idle = wait::until_or_ceiling(SE_MAX_POLL_COUNT, || {
            LocalRegisterCopy::<u32, Status::Register>::new(hal.get_reg(id, common::STATUS))
                .matches_all(Status::STATE::IDLE)
        });
        if !idle {
            self.state = SeqState::Error;
            cwarn!("[se] {:?} still busy after {} polls", id, SE_MAX_POLL_COUNT);
            Err(SeError::DRIVER_ENGINE_TIMEOUT)?;
        }
        Ok(())
    }

    /// Surface a nonzero error status as the engine's error. `prior` is
    /// returned unchanged when it already failed.
    pub fn check_error_status(&mut self, prior: SeResult<()>) -> SeResult<()> {
        let status = self.read_reg(common::ERR_STATUS);
        if status != 0 {
            self.write_reg(common::ERR_STATUS, status);
            cwarn!("[se] {:?} error status {:#010x}", self.id, status);
            self.state = SeqState::Error;
            return prior.and(Err(self.engine_error()));
        }
        self.state = if prior.is_ok() {
            SeqState::Idle
        } else {
            SeqState::Error
        };
        prior
    }

    /// configure, start, wait and check in one call.
    pub fn execute(&mut self, cfg: &OpConfig, flags: StartFlags) -> SeResult<()> {
        self.configure(cfg)?;
        self.start(flags)?;
        let waited = self.wait_until_free();
        self.check_error_status(waited)
    }
}

impl<H: SeHal> Drop for Engine<'_, H> {
    fn drop(&mut self) {
        self.hal.release(self.id);
    }
}
