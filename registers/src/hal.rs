// Licensed under the Apache-2.0 license

use crate::EngineId;

/// DMA address width assumed when the platform does not say otherwise.
pub const SE_DEFAULT_DMA_ADDR_BITS: u32 = 40;

/// Memory domain a DMA buffer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemDomain {
    /// Driver-owned memory (context memory, scratch buffers).
    Kernel,
    /// Memory supplied by the caller of the driver.
    Client,
}

/// Engine register interface.
///
/// Reads take `&mut self` because several data registers auto-increment
/// their address on access.
pub trait SeMmio {
    fn get_reg(&mut self, engine: EngineId, offset: u32) -> u32;
    fn set_reg(&mut self, engine: EngineId, offset: u32, val: u32);
}

/// Engine ownership. Exactly one operation may hold an engine at a time.
pub trait SeEngineMutex {
    /// Returns `false` if the engine could not be acquired.
    fn acquire(&mut self, engine: EngineId) -> bool;
    fn release(&mut self, engine: EngineId);
}

/// Physical address translation and cache maintenance for DMA buffers.
pub trait SeDmaDomain {
    fn to_phys(&self, domain: MemDomain, addr: usize, len: usize) -> Option<u64>;

    /// Write back a range the engine is about to read.
    fn flush(&mut self, addr: usize, len: usize);

    /// Discard cached lines of a range the engine has written.
    fn invalidate(&mut self, addr: usize, len: usize);

    fn dma_addr_bits(&self) -> u32 {
        SE_DEFAULT_DMA_ADDR_BITS
    }
}

/// Everything the drivers need from the platform.
pub trait SeHal: SeMmio + SeEngineMutex + SeDmaDomain {}

impl<T: SeMmio + SeEngineMutex + SeDmaDomain> SeHal for T {}
