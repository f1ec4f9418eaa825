/*++

Licensed under the Apache-2.0 license.

File Name:

    cmac_kat.rs

Abstract:

    File contains the Known Answer Test (KAT) for AES-CMAC.

--*/

// NIST SP 800-38B, D.1 AES-128, Example 2
// K   = 2b7e1516 28aed2a6 abf71588 09cf4f3c
// M   = 6bc1bee2 2e409f96 e93d7e11 7393172a
// Tag = 070a16b4 6b4d4144 f79bdd9d d04a287c

use crate::aes_cmac::aes_cmac;
use crate::engine::Engine;
use crate::keyslot::{AesKeySize, KeySource};
use crate::printer::HexBytes;
use crate::{cprintln, cwarn, LEArray4x4, SeError, SeResult};
use se_registers::SeHal;

const KEY: LEArray4x4 = LEArray4x4::new([0x16157e2b, 0xa6d2ae28, 0x8815f7ab, 0x3c4fcf09]);

const MSG: [u8; 16] = [
    0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93, 0x17, 0x2a,
];

const EXPECTED_TAG: LEArray4x4 =
    LEArray4x4::new([0xb4160a07, 0x44414d6b, 0x9ddd9bf7, 0x7c284ad0]);

/// Execute the AES-CMAC Known Answer Test in `slot` of an AES engine.
///
/// The key is cleared from the slot afterwards.
pub fn execute_cmac_kat<H: SeHal>(engine: &mut Engine<'_, H>, slot: u32) -> SeResult<()> {
    cprintln!("[kat] AES-CMAC");
    let key = KEY.to_le_bytes();
    let source = KeySource::Raw {
        size: AesKeySize::Aes128,
        key: &key,
    };
    let tag = aes_cmac(engine, slot, source, &MSG)?;

    if LEArray4x4::from(tag) != EXPECTED_TAG {
        cwarn!("[kat] AES-CMAC mismatch: {}", HexBytes(&tag));
        Err(SeError::KAT_CMAC_FAILURE)?;
    }

    Ok(())
}
