/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Security Engine register map and the hardware abstraction the drivers
    are built on.

--*/
#![no_std]

pub mod aes;
mod hal;
pub mod pka;

pub use tock_registers;

pub use hal::{MemDomain, SeDmaDomain, SeEngineMutex, SeHal, SeMmio, SE_DEFAULT_DMA_ADDR_BITS};

/// A physical crypto unit of the Security Engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineId {
    Aes0 = 0,
    Aes1 = 1,
    Pka = 2,
}

impl EngineId {
    pub const ALL: [EngineId; 3] = [EngineId::Aes0, EngineId::Aes1, EngineId::Pka];

    pub fn is_aes(self) -> bool {
        matches!(self, EngineId::Aes0 | EngineId::Aes1)
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Register offsets shared by every engine's control block.
///
/// Each engine exposes its operation, status and error status registers at
/// the same offsets so the sequencer can drive any of them.
pub mod common {
    pub const OPERATION: u32 = 0x008;
    pub const STATUS: u32 = 0x00c;
    pub const ERR_STATUS: u32 = 0x010;
}

tock_registers::register_bitfields! [
    u32,

    /// Operation register, identical layout on all engines
    pub Operation [
        OP OFFSET(0) NUMBITS(2) [
            NOP = 0,
            START = 1,
            ABORT = 2,
        ],
        INIT OFFSET(4) NUMBITS(1) [],
        LASTBUF OFFSET(5) NUMBITS(1) [],
    ],

    /// Status register, identical layout on all engines
    pub Status [
        STATE OFFSET(0) NUMBITS(2) [
            IDLE = 0,
            BUSY = 1,
        ],
    ],

    /// Error status register, identical layout on all engines
    pub ErrStatus [
        CONFIG OFFSET(0) NUMBITS(1) [],
        DMA OFFSET(1) NUMBITS(1) [],
        KEYSLOT OFFSET(2) NUMBITS(1) [],
        TAG_MISMATCH OFFSET(3) NUMBITS(1) [],
        OPERAND OFFSET(4) NUMBITS(1) [],
        BUSY_VIOLATION OFFSET(5) NUMBITS(1) [],
        FAULT OFFSET(31) NUMBITS(1) [],
    ],
];
