// Licensed under the Apache-2.0 license

//! AES engine register block. AES0 and AES1 share this layout.

pub const CONFIG: u32 = 0x000;
pub const CRYPTO_CONFIG: u32 = 0x004;
pub const IN_ADDR: u32 = 0x014;
pub const IN_ADDR_HI: u32 = 0x018;
pub const OUT_ADDR: u32 = 0x01c;
pub const OUT_ADDR_HI: u32 = 0x020;
pub const LAST_BLOCK: u32 = 0x024;
/// Four words, GCM counter block.
pub const LINEAR_CTR: u32 = 0x028;
pub const KEYTABLE_ADDR: u32 = 0x040;
pub const KEYTABLE_DATA: u32 = 0x044;
/// Four words, CMAC result.
pub const CMAC_RESULT: u32 = 0x048;
pub const RNG_CONFIG: u32 = 0x058;
pub const RNG_SRC_CONFIG: u32 = 0x05c;
pub const KAC_TARGET: u32 = 0x060;

pub const AES_KEYSLOT_COUNT: u32 = 16;
pub const AES_KEY_WORDS: u32 = 8;
pub const AES_IV_WORDS: u32 = 4;
pub const AES_BLOCK_SIZE: usize = 16;

/// Largest byte count the 24-bit DMA size field holds.
pub const AES_DMA_MAX_SIZE: u32 = (1 << 24) - 1;

tock_registers::register_bitfields! [
    u32,

    pub Config [
        ALG OFFSET(0) NUMBITS(4) [
            NOP = 0,
            AES_ENC = 1,
            AES_DEC = 2,
            RNG = 3,
            CMAC = 4,
            KEY_WRAP = 5,
            KEY_UNWRAP = 6,
        ],
        DST OFFSET(4) NUMBITS(2) [
            MEMORY = 0,
            KEYTABLE = 1,
            CMAC_REG = 2,
        ],
        KEY_SIZE OFFSET(8) NUMBITS(2) [
            KEY128 = 0,
            KEY192 = 1,
            KEY256 = 2,
        ],
    ],

    pub CryptoConfig [
        MODE OFFSET(0) NUMBITS(3) [
            ECB = 0,
            CBC = 1,
            CTR = 2,
            OFB = 3,
            GCM = 4,
            CMAC = 5,
        ],
        KEY_INDEX OFFSET(4) NUMBITS(4) [],
        IV_SELECT OFFSET(8) NUMBITS(1) [
            ORIGINAL = 0,
            UPDATED = 1,
        ],
        CMAC_FINAL OFFSET(9) NUMBITS(1) [],
        UPPER_QUAD OFFSET(10) NUMBITS(1) [],
    ],

    pub AddrHi [
        MSB OFFSET(0) NUMBITS(8) [],
        SZ OFFSET(8) NUMBITS(24) [],
    ],

    pub KeytableAddr [
        WORD OFFSET(0) NUMBITS(4) [],
        FIELD OFFSET(4) NUMBITS(2) [
            KEY = 0,
            ORIGINAL_IV = 1,
            UPDATED_IV = 2,
        ],
        SLOT OFFSET(8) NUMBITS(4) [],
    ],

    pub RngConfig [
        SRC OFFSET(0) NUMBITS(2) [
            NONE = 0,
            ENTROPY = 1,
            LFSR = 2,
        ],
        MODE OFFSET(2) NUMBITS(2) [
            NORMAL = 0,
            FORCE_INSTANTIATION = 1,
            FORCE_RESEED = 2,
        ],
    ],

    pub RngSrcConfig [
        RO_ENTROPY_SOURCE OFFSET(0) NUMBITS(1) [],
        HW_DISABLE_CYA OFFSET(1) NUMBITS(1) [],
    ],

    pub KacTarget [
        SLOT OFFSET(0) NUMBITS(4) [],
        KEY_SIZE OFFSET(4) NUMBITS(2) [
            KEY128 = 0,
            KEY192 = 1,
            KEY256 = 2,
        ],
    ],
];

/// Wrapped key blob produced by KEY_WRAP: manifest, ciphertext, tag.
pub const KAC_MANIFEST_LEN: usize = 16;
pub const KAC_WRAPPED_KEY_LEN: usize = 32;
pub const KAC_TAG_LEN: usize = 16;
pub const KAC_KEY_WRAP_BLOB_LEN: usize = KAC_MANIFEST_LEN + KAC_WRAPPED_KEY_LEN + KAC_TAG_LEN;

/// Key size field of the first manifest word, encoded like `KacTarget::KEY_SIZE`.
pub const KAC_MANIFEST_KEY_SIZE_SHIFT: u32 = 8;
pub const KAC_MANIFEST_KEY_SIZE_MASK: u32 = 0x3;

/// Initial GCM block counter used by KEY_WRAP and KEY_UNWRAP.
pub const KAC_GCM_COUNTER0: u32 = 1;
