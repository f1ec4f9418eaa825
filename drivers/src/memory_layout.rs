/*++
Licensed under the Apache-2.0 license.

File Name:

    memory_layout.rs

Abstract:

    The file contains the context memory layouts of each algorithm family.
    A layout declares the minimum generic, key and DMA space the family
    allocates from its context memory.

--*/

use crate::cmem::{round_up, CMEM_ALIGN, CMEM_HEADER_SIZE, CMEM_MAX_SIZE};
use crate::pka_keyslot::RSA_MAX_BYTES;
use se_registers::aes::KAC_KEY_WRAP_BLOB_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmemLayout {
    /// API state and scratch.
    pub generic: usize,
    /// Key material.
    pub key: usize,
    /// DMA bounce buffers.
    pub dma: usize,
}

impl CmemLayout {
    /// Smallest context memory capacity satisfying this layout.
    pub const fn required_size(&self) -> usize {
        CMEM_HEADER_SIZE
            + round_up(self.generic, CMEM_ALIGN)
            + round_up(self.key, CMEM_ALIGN)
            + round_up(self.dma, CMEM_ALIGN)
    }
}

//
// Family layouts
//
pub const CMAC_CMEM_LAYOUT: CmemLayout = CmemLayout {
    generic: 0,
    key: 32,
    dma: 0,
};

pub const KWUW_CMEM_LAYOUT: CmemLayout = CmemLayout {
    generic: 0,
    key: 32,
    dma: 2 * KAC_KEY_WRAP_BLOB_LEN,
};

pub const ACIPHER_CMEM_LAYOUT: CmemLayout = CmemLayout {
    generic: 64,
    key: 2 * RSA_MAX_BYTES,
    dma: 0,
};

#[test]
#[allow(clippy::assertions_on_constants)]
fn mem_layout_test_fits() {
    assert!(CMAC_CMEM_LAYOUT.required_size() <= CMEM_MAX_SIZE);
    assert!(KWUW_CMEM_LAYOUT.required_size() <= CMEM_MAX_SIZE);
    assert!(ACIPHER_CMEM_LAYOUT.required_size() <= CMEM_MAX_SIZE);
    assert_eq!(KWUW_CMEM_LAYOUT.required_size(), CMEM_HEADER_SIZE + 64 + 128);
}
