/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Software model of the Security Engine. Implements the register,
    engine mutex and DMA platform interfaces so the drivers can run
    unmodified on a host.

--*/

mod aes;
mod crypto;
mod key_table;
mod pka;

pub use aes::AesEngine;
pub use key_table::{AesKeyTable, AesKeyslot};
pub use pka::{PkaEngine, PkaKeyslot};

use se_registers::{
    common, EngineId, ErrStatus, MemDomain, Operation, SeDmaDomain, SeEngineMutex, SeMmio,
    Status,
};
use tock_registers::LocalRegisterCopy;

/// Host memory as seen by the engine's DMA.
///
/// Physical addresses are host addresses plus `phys_offset`. Only buffers
/// the driver mapped for the running operation are ever accessed.
pub struct DmaMemory {
    phys_offset: u64,
}

impl DmaMemory {
    fn host_addr(&self, phys: u64) -> Option<usize> {
        let host = phys.checked_sub(self.phys_offset)?;
        if host == 0 {
            return None;
        }
        usize::try_from(host).ok()
    }

    pub fn read(&self, phys: u64, len: usize) -> Option<Vec<u8>> {
        let host = self.host_addr(phys)?;
        // SAFETY: the driver keeps the mapped buffer borrowed for the whole
        // operation and the model executes synchronously within it.
        let data = unsafe { core::slice::from_raw_parts(host as *const u8, len) };
        Some(data.to_vec())
    }

    pub fn write(&self, phys: u64, data: &[u8]) -> bool {
        let Some(host) = self.host_addr(phys) else {
            return false;
        };
        // SAFETY: see `read`; the driver mapped this range as an output.
        unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), host as *mut u8, data.len()) };
        true
    }
}

#[derive(Default)]
struct EngineCtl {
    locked: bool,
    lock_count: u32,
    busy_polls: u32,
    stuck: bool,
    pending_fault: u32,
    err_status: u32,
    last_operation: u32,
    starts: u32,
}

/// Emulated Security Engine: two AES engines and one PKA.
pub struct SeEmulator {
    aes: [AesEngine; 2],
    pka: PkaEngine,
    ctl: [EngineCtl; 3],
    mem: DmaMemory,
    latency: u32,
    dma_addr_bits: u32,
    flushes: u32,
    invalidates: u32,
}

impl Default for SeEmulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SeEmulator {
    pub fn new() -> Self {
        Self {
            aes: [AesEngine::new(), AesEngine::new()],
            pka: PkaEngine::new(),
            ctl: Default::default(),
            mem: DmaMemory { phys_offset: 0 },
            latency: 2,
            dma_addr_bits: se_registers::SE_DEFAULT_DMA_ADDR_BITS,
            flushes: 0,
            invalidates: 0,
        }
    }

    fn aes_engine(&self, engine: EngineId) -> Option<&AesEngine> {
        match engine {
            EngineId::Aes0 => Some(&self.aes[0]),
            EngineId::Aes1 => Some(&self.aes[1]),
            EngineId::Pka => None,
        }
    }

    /// Emulator backdoor: AES keyslot contents, including the write-only key.
    pub fn aes_keyslot(&self, engine: EngineId, slot: u32) -> Option<AesKeyslot> {
        self.aes_engine(engine)?.keytable().slot(slot).cloned()
    }

    /// Emulator backdoor: install a key without going through the driver.
    pub fn set_aes_key(&mut self, engine: EngineId, slot: u32, key: &[u8; 32]) {
        let idx = match engine {
            EngineId::Aes0 => 0,
            EngineId::Aes1 => 1,
            EngineId::Pka => return,
        };
        if let Some(s) = self.aes[idx].keytable_mut().slot_mut(slot) {
            s.set_key_bytes(key);
        }
    }

    pub fn pka_keyslot(&self, slot: u32) -> Option<&PkaKeyslot> {
        self.pka.keyslot(slot)
    }

    pub fn pka_banks_clear(&self) -> bool {
        self.pka.banks_clear()
    }

    pub fn cmac_result(&self, engine: EngineId) -> Option<[u32; 4]> {
        Some(self.aes_engine(engine)?.cmac_result())
    }

    /// RNG_CONFIG and RNG_SRC_CONFIG as last programmed.
    pub fn rng_config(&self, engine: EngineId) -> Option<(u32, u32)> {
        Some(self.aes_engine(engine)?.rng_config())
    }

    pub fn rng_ops(&self, engine: EngineId) -> u32 {
        self.aes_engine(engine).map(|a| a.rng_ops()).unwrap_or(0)
    }

    /// Keep the engine busy forever after the next start.
    pub fn set_stuck(&mut self, engine: EngineId, stuck: bool) {
        self.ctl[engine.index()].stuck = stuck;
    }

    /// Report `bits` in the error status of the next operation.
    pub fn inject_fault(&mut self, engine: EngineId, bits: u32) {
        self.ctl[engine.index()].pending_fault = bits;
    }

    pub fn set_phys_offset(&mut self, offset: u64) {
        self.mem.phys_offset = offset;
    }

    pub fn set_dma_addr_bits(&mut self, bits: u32) {
        self.dma_addr_bits = bits;
    }

    pub fn is_locked(&self, engine: EngineId) -> bool {
        self.ctl[engine.index()].locked
    }

    pub fn lock_count(&self, engine: EngineId) -> u32 {
        self.ctl[engine.index()].lock_count
    }

    pub fn last_operation(&self, engine: EngineId) -> u32 {
        self.ctl[engine.index()].last_operation
    }

    pub fn starts(&self, engine: EngineId) -> u32 {
        self.ctl[engine.index()].starts
    }

    pub fn cache_ops(&self) -> (u32, u32) {
        (self.flushes, self.invalidates)
    }

    fn start(&mut self, engine: EngineId) {
        let err = match engine {
            EngineId::Aes0 => self.aes[0].execute(&self.mem),
            EngineId::Aes1 => self.aes[1].execute(&self.mem),
            EngineId::Pka => self.pka.execute(),
        };
        let ctl = &mut self.ctl[engine.index()];
        ctl.err_status = err | core::mem::take(&mut ctl.pending_fault);
        ctl.busy_polls = self.latency;
        ctl.starts += 1;
    }
}

impl SeMmio for SeEmulator {
    fn get_reg(&mut self, engine: EngineId, offset: u32) -> u32 {
        match offset {
            common::STATUS => {
                let ctl = &mut self.ctl[engine.index()];
                if ctl.stuck && ctl.starts > 0 {
                    Status::STATE::BUSY.value
                } else if ctl.busy_polls > 0 {
                    ctl.busy_polls -= 1;
                    Status::STATE::BUSY.value
                } else {
                    Status::STATE::IDLE.value
                }
            }
            common::ERR_STATUS => self.ctl[engine.index()].err_status,
            common::OPERATION => self.ctl[engine.index()].last_operation,
            _ => match engine {
                EngineId::Aes0 => self.aes[0].read(offset),
                EngineId::Aes1 => self.aes[1].read(offset),
                EngineId::Pka => self.pka.read(offset),
            },
        }
    }

    fn set_reg(&mut self, engine: EngineId, offset: u32, val: u32) {
        match offset {
            common::OPERATION => {
                let ctl = &mut self.ctl[engine.index()];
                ctl.last_operation = val;
                let op = LocalRegisterCopy::<u32, Operation::Register>::new(val);
                if !op.matches_all(Operation::OP::START) {
                    return;
                }
                if ctl.busy_polls > 0 || (ctl.stuck && ctl.starts > 0) {
                    ctl.err_status |= ErrStatus::BUSY_VIOLATION::SET.value;
                    return;
                }
                self.start(engine);
            }
            // Write one to clear.
            common::ERR_STATUS => self.ctl[engine.index()].err_status &= !val,
            _ => match engine {
                EngineId::Aes0 => self.aes[0].write(offset, val),
                EngineId::Aes1 => self.aes[1].write(offset, val),
                EngineId::Pka => self.pka.write(offset, val),
            },
        }
    }
}

impl SeEngineMutex for SeEmulator {
    fn acquire(&mut self, engine: EngineId) -> bool {
        let ctl = &mut self.ctl[engine.index()];
        if ctl.locked {
            return false;
        }
        ctl.locked = true;
        ctl.lock_count += 1;
        true
    }

    fn release(&mut self, engine: EngineId) {
        self.ctl[engine.index()].locked = false;
    }
}

impl SeDmaDomain for SeEmulator {
    fn to_phys(&self, _domain: MemDomain, addr: usize, _len: usize) -> Option<u64> {
        (addr as u64).checked_add(self.mem.phys_offset)
    }

    fn flush(&mut self, _addr: usize, _len: usize) {
        self.flushes += 1;
    }

    fn invalidate(&mut self, _addr: usize, _len: usize) {
        self.invalidates += 1;
    }

    fn dma_addr_bits(&self) -> u32 {
        self.dma_addr_bits
    }
}
