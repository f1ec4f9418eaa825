/*++

Licensed under the Apache-2.0 license.

File Name:

    pka.rs

Abstract:

    File contains the PKA engine model: keyslot field storage, Montgomery
    precomputation and modular exponentiation.

--*/

use rsa::BigUint;
use se_registers::pka::*;
use se_registers::ErrStatus;
use tock_registers::LocalRegisterCopy;
use zeroize::Zeroize;

const MAX_WORDS: usize = PKA_MAX_WORDS as usize;

pub type PkaField = [u32; MAX_WORDS];

/// One PKA keyslot, indexed by `KeyslotAddr::FIELD`.
#[derive(Clone)]
pub struct PkaKeyslot {
    pub fields: [PkaField; PKA_KEYSLOT_FIELDS as usize],
}

impl Default for PkaKeyslot {
    fn default() -> Self {
        Self {
            fields: [[0; MAX_WORDS]; PKA_KEYSLOT_FIELDS as usize],
        }
    }
}

impl PkaKeyslot {
    pub fn is_clear(&self) -> bool {
        self.fields.iter().all(|f| f.iter().all(|w| *w == 0))
    }
}

pub struct PkaEngine {
    ctrl: LocalRegisterCopy<u32, Ctrl::Register>,
    keyslot_addr: LocalRegisterCopy<u32, KeyslotAddr::Register>,
    keyslots: [PkaKeyslot; PKA_KEYSLOT_COUNT as usize],
    bank_a: PkaField,
    bank_d: PkaField,
}

impl Default for PkaEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn to_biguint(words: &[u32]) -> BigUint {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    BigUint::from_bytes_le(&bytes)
}

fn from_biguint(val: &BigUint, out: &mut [u32]) {
    out.fill(0);
    for (i, b) in val.to_bytes_le().iter().enumerate() {
        if let Some(word) = out.get_mut(i / 4) {
            *word |= (*b as u32) << ((i % 4) * 8);
        }
    }
}

fn operand_error() -> u32 {
    ErrStatus::OPERAND::SET.value
}

impl PkaEngine {
    pub fn new() -> Self {
        Self {
            ctrl: LocalRegisterCopy::new(0),
            keyslot_addr: LocalRegisterCopy::new(0),
            keyslots: Default::default(),
            bank_a: [0; MAX_WORDS],
            bank_d: [0; MAX_WORDS],
        }
    }

    pub fn keyslot(&self, slot: u32) -> Option<&PkaKeyslot> {
        self.keyslots.get(slot as usize)
    }

    pub fn banks_clear(&self) -> bool {
        self.bank_a.iter().chain(self.bank_d.iter()).all(|w| *w == 0)
    }

    fn bank_index(offset: u32, base: u32) -> Option<usize> {
        let end = base + PKA_MAX_WORDS * 4;
        (base..end)
            .contains(&offset)
            .then(|| ((offset - base) / 4) as usize)
    }

    fn data_cell(&mut self) -> Option<&mut u32> {
        let slot = self.keyslot_addr.read(KeyslotAddr::SLOT) as usize;
        let field = self.keyslot_addr.read(KeyslotAddr::FIELD) as usize;
        let word = self.keyslot_addr.read(KeyslotAddr::WORD) as usize;
        self.keyslots.get_mut(slot)?.fields.get_mut(field)?.get_mut(word)
    }

    fn advance(&mut self) {
        if self.keyslot_addr.is_set(KeyslotAddr::AUTO_INC) {
            let word = self.keyslot_addr.read(KeyslotAddr::WORD);
            self.keyslot_addr
                .modify(KeyslotAddr::WORD.val((word + 1) % PKA_MAX_WORDS));
        }
    }

    pub fn read(&mut self, offset: u32) -> u32 {
        match offset {
            CTRL => self.ctrl.get(),
            KEYSLOT_ADDR => self.keyslot_addr.get(),
            KEYSLOT_DATA => {
                let val = self.data_cell().map(|c| *c).unwrap_or(0);
                self.advance();
                val
            }
            o => {
                if let Some(i) = Self::bank_index(o, BANK_A) {
                    self.bank_a[i]
                } else if let Some(i) = Self::bank_index(o, BANK_D) {
                    self.bank_d[i]
                } else {
                    0
                }
            }
        }
    }

    pub fn write(&mut self, offset: u32, val: u32) {
        match offset {
            CTRL => self.ctrl.set(val),
            KEYSLOT_ADDR => self.keyslot_addr.set(val),
            KEYSLOT_DATA => {
                if let Some(cell) = self.data_cell() {
                    *cell = val;
                }
                self.advance();
            }
            o => {
                if let Some(i) = Self::bank_index(o, BANK_A) {
                    self.bank_a[i] = val;
                } else if let Some(i) = Self::bank_index(o, BANK_D) {
                    self.bank_d[i] = val;
                }
            }
        }
    }

    /// Run the configured operation. Returns the error status bits.
    pub fn execute(&mut self) -> u32 {
        let words = self.ctrl.read(Ctrl::SIZE_WORDS) as usize;
        let slot = self.ctrl.read(Ctrl::SLOT) as usize;
        if words == 0 || words > MAX_WORDS || slot >= self.keyslots.len() {
            return ErrStatus::CONFIG::SET.value;
        }
        match self.ctrl.read_as_enum(Ctrl::OP) {
            Some(Ctrl::OP::Value::MODEXP) => self.modexp(slot, words),
            Some(Ctrl::OP::Value::MONT_PRECOMP) => self.mont_precompute(slot, words),
            _ => ErrStatus::CONFIG::SET.value,
        }
    }

    fn modexp(&mut self, slot: usize, words: usize) -> u32 {
        let fields = &self.keyslots[slot].fields;
        let modulus = to_biguint(&fields[1][..words]);
        let exponent = to_biguint(&fields[0][..words]);
        let base = to_biguint(&self.bank_a[..words]);
        if modulus == BigUint::from(0u32) || base >= modulus {
            return operand_error();
        }
        let result = base.modpow(&exponent, &modulus);
        from_biguint(&result, &mut self.bank_d);
        0
    }

    fn mont_precompute(&mut self, slot: usize, words: usize) -> u32 {
        let mut modulus_words = self.keyslots[slot].fields[1];
        if modulus_words[0] & 1 == 0 {
            return operand_error();
        }
        let modulus = to_biguint(&modulus_words[..words]);
        modulus_words.zeroize();

        let r = BigUint::from(1u32) << (32 * words);
        let r_square = (&r * &r) % &modulus;

        // Newton iteration for N^-1 mod R, doubling correct bits each round.
        let two = BigUint::from(2u32);
        let mut inv = BigUint::from(1u32);
        for _ in 0..13 {
            let t = (&modulus * &inv) % &r;
            let correction = (&r + &two - t) % &r;
            inv = (&inv * correction) % &r;
        }
        let m_prime = (&r - &inv) % &r;

        let fields = &mut self.keyslots[slot].fields;
        from_biguint(&m_prime, &mut fields[2][..words]);
        from_biguint(&r_square, &mut fields[3][..words]);
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_field(pka: &mut PkaEngine, slot: u32, field: u32, vals: &[u32]) {
        pka.write(
            KEYSLOT_ADDR,
            (KeyslotAddr::SLOT.val(slot)
                + KeyslotAddr::FIELD.val(field)
                + KeyslotAddr::AUTO_INC::SET)
                .value,
        );
        for v in vals {
            pka.write(KEYSLOT_DATA, *v);
        }
    }

    #[test]
    fn test_modexp_small() {
        let mut pka = PkaEngine::new();
        // 16 words with modulus 0xfffffffb (prime) in the low word.
        let mut modulus = [0u32; 16];
        modulus[0] = 0xffff_fffb;
        let mut exponent = [0u32; 16];
        exponent[0] = 65537;
        write_field(&mut pka, 1, 1, &modulus);
        write_field(&mut pka, 1, 0, &exponent);
        pka.write(BANK_A, 2);
        pka.write(
            CTRL,
            (Ctrl::OP::MODEXP + Ctrl::SLOT.val(1) + Ctrl::SIZE_WORDS.val(16)).value,
        );
        assert_eq!(pka.execute(), 0);
        let expected = BigUint::from(2u32).modpow(
            &BigUint::from(65537u32),
            &BigUint::from(0xffff_fffbu32),
        );
        assert_eq!(to_biguint(&[pka.read(BANK_D)]), expected);
    }

    #[test]
    fn test_mont_precompute_inverse() {
        let mut pka = PkaEngine::new();
        let modulus: Vec<u32> = (0..16).map(|i| 0x9e37_79b9u32.wrapping_mul(i + 1) | 1).collect();
        write_field(&mut pka, 0, 1, &modulus);
        pka.write(
            CTRL,
            (Ctrl::OP::MONT_PRECOMP + Ctrl::SLOT.val(0) + Ctrl::SIZE_WORDS.val(16)).value,
        );
        assert_eq!(pka.execute(), 0);

        let n = to_biguint(&modulus);
        let r = BigUint::from(1u32) << 512;
        let m_prime = to_biguint(&pka.keyslot(0).unwrap().fields[2][..16]);
        // N * M' == -1 mod R
        assert_eq!((&n * &m_prime) % &r, &r - BigUint::from(1u32));
    }

    #[test]
    fn test_base_not_reduced() {
        let mut pka = PkaEngine::new();
        let mut modulus = [0u32; 16];
        modulus[0] = 7;
        write_field(&mut pka, 0, 1, &modulus);
        pka.write(BANK_A, 9);
        pka.write(
            CTRL,
            (Ctrl::OP::MODEXP + Ctrl::SIZE_WORDS.val(16)).value,
        );
        assert_eq!(pka.execute(), ErrStatus::OPERAND::SET.value);
    }
}
