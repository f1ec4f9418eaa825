/*++

Licensed under the Apache-2.0 license.

File Name:

    keyslot.rs

Abstract:

    File contains the keyslot manager: key and IV programming through the
    keytable data port, keyslot clearing, and the lease that bounds the
    residency of a key written for one operation.

--*/

use crate::engine::Engine;
use crate::{SeError, SeResult};
use core::ops::{Deref, DerefMut};
use se_registers::aes::{self, Config, KeytableAddr, AES_IV_WORDS, AES_KEYSLOT_COUNT, AES_KEY_WORDS};
use se_registers::pka::{self, KeyslotAddr, PKA_KEYSLOT_COUNT, PKA_KEYSLOT_FIELDS, PKA_MAX_WORDS};
use se_registers::tock_registers::fields::FieldValue;
use se_registers::{EngineId, SeHal};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const SE_AES_KEYSLOT_COUNT: u32 = AES_KEYSLOT_COUNT;
pub const SE_PKA_KEYSLOT_COUNT: u32 = PKA_KEYSLOT_COUNT;

pub const AES_IV_SIZE: usize = (AES_IV_WORDS * 4) as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesKeySize {
    Aes128,
    Aes192,
    Aes256,
}

impl AesKeySize {
    pub fn bits(self) -> u32 {
        match self {
            AesKeySize::Aes128 => 128,
            AesKeySize::Aes192 => 192,
            AesKeySize::Aes256 => 256,
        }
    }

    pub fn bytes(self) -> usize {
        (self.bits() / 8) as usize
    }

    /// Encoding shared by the config KEY_SIZE field, the KAC target and
    /// the wrapped key manifest.
    pub(crate) fn code(self) -> u32 {
        match self {
            AesKeySize::Aes128 => 0,
            AesKeySize::Aes192 => 1,
            AesKeySize::Aes256 => 2,
        }
    }

    pub(crate) fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(AesKeySize::Aes128),
            1 => Some(AesKeySize::Aes192),
            2 => Some(AesKeySize::Aes256),
            _ => None,
        }
    }

    pub(crate) fn config(self) -> FieldValue<u32, Config::Register> {
        Config::KEY_SIZE.val(self.code())
    }
}

impl TryFrom<u32> for AesKeySize {
    type Error = SeError;

    fn try_from(bits: u32) -> SeResult<Self> {
        match bits {
            128 => Ok(AesKeySize::Aes128),
            192 => Ok(AesKeySize::Aes192),
            256 => Ok(AesKeySize::Aes256),
            _ => Err(SeError::DRIVER_KEYSLOT_INVALID_KEY_SIZE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvSelect {
    Original,
    Updated,
}

impl IvSelect {
    fn field(self) -> FieldValue<u32, KeytableAddr::Register> {
        match self {
            IvSelect::Original => KeytableAddr::FIELD::ORIGINAL_IV,
            IvSelect::Updated => KeytableAddr::FIELD::UPDATED_IV,
        }
    }
}

/// Where the key of an AES operation comes from.
#[derive(Clone, Copy)]
pub enum KeySource<'k> {
    /// Key bytes written into the keyslot for this operation.
    Raw { size: AesKeySize, key: &'k [u8] },
    /// Key already resident in the keyslot.
    Preset {
        size: AesKeySize,
        clear_after_use: bool,
    },
}

impl KeySource<'_> {
    pub fn size(&self) -> AesKeySize {
        match self {
            KeySource::Raw { size, .. } | KeySource::Preset { size, .. } => *size,
        }
    }

    pub fn is_preset(&self) -> bool {
        matches!(self, KeySource::Preset { .. })
    }
}

impl<H: SeHal> Engine<'_, H> {
    fn check_aes_slot(&self, slot: u32) -> SeResult<()> {
        if !self.id().is_aes() {
            Err(SeError::DRIVER_KEYSLOT_IV_NOT_SUPPORTED)?;
        }
        if slot >= SE_AES_KEYSLOT_COUNT {
            Err(SeError::DRIVER_KEYSLOT_INVALID_INDEX)?;
        }
        Ok(())
    }

    fn select_keytable(&mut self, slot: u32, field: FieldValue<u32, KeytableAddr::Register>) {
        let addr = KeytableAddr::SLOT.val(slot) + field + KeytableAddr::WORD.val(0);
        self.write_reg(aes::KEYTABLE_ADDR, addr.value);
    }

    /// Program `key` into `slot`. The unused tail of the 256-bit key field
    /// is zero filled.
    pub fn write_key(&mut self, slot: u32, bits: u32, key: &[u8]) -> SeResult<()> {
        self.check_aes_slot(slot)?;
        let size = AesKeySize::try_from(bits)?;
        if key.len() != size.bytes() {
            Err(SeError::DRIVER_KEYSLOT_INVALID_KEY_LEN)?;
        }
        self.select_keytable(slot, KeytableAddr::FIELD::KEY);
        let mut chunks = key.chunks_exact(4);
        for _ in 0..AES_KEY_WORDS {
            let mut word = chunks
                .next()
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .unwrap_or(0);
            self.write_reg(aes::KEYTABLE_DATA, word);
            word.zeroize();
        }
        Ok(())
    }

    /// Program one IV of `slot`. `None` writes the all-zero start value.
    pub fn write_iv(
        &mut self,
        slot: u32,
        which: IvSelect,
        iv: Option<&[u8; AES_IV_SIZE]>,
    ) -> SeResult<()> {
        self.check_aes_slot(slot)?;
        self.select_keytable(slot, which.field());
        for i in 0..AES_IV_WORDS as usize {
            let word = iv
                .map(|iv| u32::from_le_bytes([iv[4 * i], iv[4 * i + 1], iv[4 * i + 2], iv[4 * i + 3]]))
                .unwrap_or(0);
            self.write_reg(aes::KEYTABLE_DATA, word);
        }
        Ok(())
    }

    pub fn read_iv(&mut self, slot: u32, which: IvSelect) -> SeResult<[u8; AES_IV_SIZE]> {
        self.check_aes_slot(slot)?;
        self.select_keytable(slot, which.field());
        let mut iv = [0u8; AES_IV_SIZE];
        for chunk in iv.chunks_exact_mut(4) {
            chunk.copy_from_slice(&self.read_reg(aes::KEYTABLE_DATA).to_le_bytes());
        }
        Ok(iv)
    }

    /// Zero the key of `slot`, and its IVs when `clear_iv` is set. On the
    /// PKA engine every field of the slot is cleared.
    pub fn clear_keyslot(&mut self, slot: u32, clear_iv: bool) -> SeResult<()> {
        if self.id() == EngineId::Pka {
            return self.clear_pka_keyslot(slot);
        }
        self.check_aes_slot(slot)?;
        self.select_keytable(slot, KeytableAddr::FIELD::KEY);
        for _ in 0..AES_KEY_WORDS {
            self.write_reg(aes::KEYTABLE_DATA, 0);
        }
        if clear_iv {
            self.write_iv(slot, IvSelect::Original, None)?;
            self.write_iv(slot, IvSelect::Updated, None)?;
        }
        Ok(())
    }

    fn clear_pka_keyslot(&mut self, slot: u32) -> SeResult<()> {
        if slot >= SE_PKA_KEYSLOT_COUNT {
            Err(SeError::DRIVER_PKA_KEYSLOT_INVALID_INDEX)?;
        }
        for field in 0..PKA_KEYSLOT_FIELDS {
            let addr = KeyslotAddr::SLOT.val(slot)
                + KeyslotAddr::FIELD.val(field)
                + KeyslotAddr::WORD.val(0)
                + KeyslotAddr::AUTO_INC::SET;
            self.write_reg(pka::KEYSLOT_ADDR, addr.value);
            for _ in 0..PKA_MAX_WORDS {
                self.write_reg(pka::KEYSLOT_DATA, 0);
            }
        }
        Ok(())
    }

    /// Scrub every keyslot of this engine.
    pub fn clear_all_keyslots(&mut self) -> SeResult<()> {
        let count = if self.id().is_aes() {
            SE_AES_KEYSLOT_COUNT
        } else {
            SE_PKA_KEYSLOT_COUNT
        };
        (0..count).try_for_each(|slot| self.clear_keyslot(slot, true))
    }
}

/// Residency of a key in one keyslot for the span of an operation.
///
/// An armed lease clears the key and IVs of its slot when dropped, so every
/// early return after a key was written leaves the slot empty. `finish`
/// settles the lease on the success path.
pub struct KeyslotLease<'e, 'a, H: SeHal> {
    engine: &'e mut Engine<'a, H>,
    slot: u32,
    armed: bool,
}

impl<'e, 'a, H: SeHal> KeyslotLease<'e, 'a, H> {
    /// Make the key of `source` resident in `slot`.
    pub fn acquire(
        engine: &'e mut Engine<'a, H>,
        slot: u32,
        source: &KeySource,
    ) -> SeResult<Self> {
        let armed = match *source {
            KeySource::Raw { size, key } => {
                engine.write_key(slot, size.bits(), key)?;
                true
            }
            KeySource::Preset {
                clear_after_use, ..
            } => {
                engine.check_aes_slot(slot)?;
                clear_after_use
            }
        };
        Ok(Self {
            engine,
            slot,
            armed,
        })
    }

    /// Take responsibility for a slot the caller has already programmed.
    pub fn adopt(engine: &'e mut Engine<'a, H>, slot: u32) -> Self {
        Self {
            engine,
            slot,
            armed: true,
        }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// End the lease. The slot is cleared unless `leave_resident` is set or
    /// the key was never ours to clear.
    pub fn finish(mut self, leave_resident: bool) -> SeResult<()> {
        let clear = self.armed && !leave_resident;
        self.armed = false;
        if clear {
            self.engine.clear_keyslot(self.slot, true)
        } else {
            Ok(())
        }
    }
}

impl<'a, H: SeHal> Deref for KeyslotLease<'_, 'a, H> {
    type Target = Engine<'a, H>;

    fn deref(&self) -> &Self::Target {
        self.engine
    }
}

impl<H: SeHal> DerefMut for KeyslotLease<'_, '_, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.engine
    }
}

impl<H: SeHal> Drop for KeyslotLease<'_, '_, H> {
    fn drop(&mut self) {
        if self.armed {
            // Failure path: the primary error is already on its way out.
            let _ = self.engine.clear_keyslot(self.slot, true);
        }
    }
}

/// Algorithm scratch carried between the start and finish of an operation.
#[derive(Default, Zeroize)]
pub struct AsyncScratch {
    pub counter: [u32; 4],
    pub tag: [u8; AES_IV_SIZE],
}

/// State of a multi step operation. Whether a freshly written key must be
/// cleared is held by the `KeyslotLease` of each step, not here.
#[derive(Default, Zeroize, ZeroizeOnDrop)]
pub struct AsyncOpContext {
    pub started: bool,
    pub use_preset_key: bool,
    pub leave_key_resident: bool,
    pub scratch: AsyncScratch,
}

impl AsyncOpContext {
    pub fn new(source: &KeySource, leave_key_resident: bool) -> Self {
        let mut ctx = Self::default();
        ctx.use_preset_key = source.is_preset();
        ctx.leave_key_resident = leave_key_resident;
        ctx
    }
}
