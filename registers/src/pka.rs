// Licensed under the Apache-2.0 license

//! PKA engine register block.

pub const CTRL: u32 = 0x000;
pub const KEYSLOT_ADDR: u32 = 0x014;
pub const KEYSLOT_DATA: u32 = 0x018;
/// Operand bank A, `PKA_MAX_WORDS` words.
pub const BANK_A: u32 = 0x100;
/// Result bank D, `PKA_MAX_WORDS` words.
pub const BANK_D: u32 = 0x400;

pub const PKA_KEYSLOT_COUNT: u32 = 4;
/// Widest operand, 4096 bits.
pub const PKA_MAX_WORDS: u32 = 128;

tock_registers::register_bitfields! [
    u32,

    pub Ctrl [
        OP OFFSET(0) NUMBITS(4) [
            NOP = 0,
            MODEXP = 1,
            MONT_PRECOMP = 2,
        ],
        SLOT OFFSET(4) NUMBITS(2) [],
        SIZE_WORDS OFFSET(8) NUMBITS(8) [],
    ],

    pub KeyslotAddr [
        WORD OFFSET(0) NUMBITS(8) [],
        FIELD OFFSET(8) NUMBITS(3) [
            EXPONENT = 0,
            MODULUS = 1,
            M_PRIME = 2,
            R_SQUARE = 3,
            X = 4,
            Y = 5,
        ],
        SLOT OFFSET(12) NUMBITS(2) [],
        AUTO_INC OFFSET(16) NUMBITS(1) [],
    ],
];

/// Number of fields in a PKA keyslot.
pub const PKA_KEYSLOT_FIELDS: u32 = 6;
