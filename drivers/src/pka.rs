/*++

Licensed under the Apache-2.0 license.

File Name:

    pka.rs

Abstract:

    File contains modular exponentiation on the PKA engine. The key lives in
    a PKA keyslot; the operand goes through bank A and the result comes back
    through bank D.

--*/

use crate::engine::{Engine, OpConfig, PkaOpConfig, StartFlags};
use crate::pka_keyslot::{Endianness, PkaField, RsaKeySize, RSA_MAX_BYTES};
use crate::{SeError, SeResult};
use se_registers::pka::{self, Ctrl, PKA_MAX_WORDS};
use se_registers::tock_registers::fields::FieldValue;
use se_registers::tock_registers::LocalRegisterCopy;
use se_registers::SeHal;
use zeroize::Zeroize;

fn pka_op(op: FieldValue<u32, Ctrl::Register>, slot: u32, size: RsaKeySize) -> OpConfig {
    let ctrl = op + Ctrl::SLOT.val(slot) + Ctrl::SIZE_WORDS.val(size.words() as u32);
    OpConfig::Pka(PkaOpConfig {
        ctrl: LocalRegisterCopy::new(ctrl.value),
    })
}

/// Load an RSA modulus and exponent (big-endian) into `slot` and have the
/// engine derive the Montgomery constants.
pub fn load_modexp_key<H: SeHal>(
    engine: &mut Engine<'_, H>,
    slot: u32,
    modulus_be: &[u8],
    exponent_be: &[u8],
) -> SeResult<RsaKeySize> {
    engine.check_pka_slot(slot)?;
    let size = RsaKeySize::from_modulus_len(modulus_be.len())?;
    if exponent_be.is_empty() || exponent_be.len() > size.bytes() {
        Err(SeError::DRIVER_PKA_INVALID_FIELD_LEN)?;
    }
    let len = size.bytes();
    engine.pka_write_value(slot, PkaField::Modulus, modulus_be, len, Endianness::Big)?;
    engine.pka_write_value(slot, PkaField::Exponent, exponent_be, len, Endianness::Big)?;
    engine.execute(&pka_op(Ctrl::OP::MONT_PRECOMP, slot, size), StartFlags::INIT)?;
    Ok(size)
}

fn write_bank<H: SeHal>(engine: &mut Engine<'_, H>, base: u32, le: &[u8]) {
    for (i, chunk) in le.chunks(4).enumerate() {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        engine.write_reg(base + 4 * i as u32, u32::from_le_bytes(word));
    }
}

fn clear_banks<H: SeHal>(engine: &mut Engine<'_, H>) {
    for i in 0..PKA_MAX_WORDS {
        engine.write_reg(pka::BANK_A + 4 * i, 0);
        engine.write_reg(pka::BANK_D + 4 * i, 0);
    }
}

/// `output = input ^ e mod n` with the key loaded in `slot`.
///
/// `input` is big-endian and at most the modulus length. The result is
/// written big-endian over the first `size.bytes()` bytes of `output`.
pub fn modexp<H: SeHal>(
    engine: &mut Engine<'_, H>,
    slot: u32,
    size: RsaKeySize,
    input: &[u8],
    output: &mut [u8],
) -> SeResult<usize> {
    engine.check_pka_slot(slot)?;
    let len = size.bytes();
    if input.len() > len {
        Err(SeError::DRIVER_PKA_INVALID_OPERAND)?;
    }
    if output.len() < len {
        Err(SeError::DRIVER_PKA_INVALID_FIELD_LEN)?;
    }

    let mut buf = [0u8; RSA_MAX_BYTES];
    buf[..input.len()].copy_from_slice(input);
    buf[..input.len()].reverse();
    write_bank(engine, pka::BANK_A, &buf[..len]);

    let result = engine.execute(&pka_op(Ctrl::OP::MODEXP, slot, size), StartFlags::INIT);
    if result.is_ok() {
        for (i, chunk) in buf[..len].chunks_exact_mut(4).enumerate() {
            chunk.copy_from_slice(&engine.read_reg(pka::BANK_D + 4 * i as u32).to_le_bytes());
        }
        buf[..len].reverse();
        output[..len].copy_from_slice(&buf[..len]);
    }
    buf.zeroize();
    clear_banks(engine);
    result.map(|_| len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use se_emu::SeEmulator;
    use se_registers::EngineId;

    // Odd 1024-bit modulus.
    fn modulus() -> [u8; 128] {
        let mut n = [0u8; 128];
        n[0] = 0x80;
        n[126] = 0x04;
        n[127] = 0x83;
        n
    }

    #[test]
    fn test_square() {
        let mut emu = SeEmulator::new();
        let mut out = [0u8; 128];
        {
            let mut engine = Engine::lock(&mut emu, EngineId::Pka).unwrap();
            let size = load_modexp_key(&mut engine, 0, &modulus(), &[2]).unwrap();
            assert_eq!(size, RsaKeySize::Rsa1024);
            assert_eq!(modexp(&mut engine, 0, size, &[0x03], &mut out), Ok(128));
        }
        assert_eq!(out[127], 9);
        assert!(out[..127].iter().all(|b| *b == 0));
        assert!(emu.pka_banks_clear());
    }

    #[test]
    fn test_operand_too_large() {
        let mut emu = SeEmulator::new();
        let mut engine = Engine::lock(&mut emu, EngineId::Pka).unwrap();
        let size = load_modexp_key(&mut engine, 1, &modulus(), &[3]).unwrap();
        let mut out = [0u8; 128];
        assert_eq!(
            modexp(&mut engine, 1, size, &[0xff; 128], &mut out),
            Err(SeError::DRIVER_PKA_ENGINE_ERROR)
        );
        assert_eq!(
            modexp(&mut engine, 1, size, &[0xff; 129], &mut out),
            Err(SeError::DRIVER_PKA_INVALID_OPERAND)
        );
    }

    #[test]
    fn test_bad_modulus_len() {
        let mut emu = SeEmulator::new();
        let mut engine = Engine::lock(&mut emu, EngineId::Pka).unwrap();
        assert_eq!(
            load_modexp_key(&mut engine, 0, &[0xc3; 100], &[3]),
            Err(SeError::DRIVER_PKA_INVALID_RSA_SIZE)
        );
    }
}
