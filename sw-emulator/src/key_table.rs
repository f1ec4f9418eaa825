/*++

Licensed under the Apache-2.0 license.

File Name:

    key_table.rs

Abstract:

    File contains the AES keyslot table model: key and IV storage with an
    auto-incrementing address register.

--*/

use se_registers::aes::{KeytableAddr, AES_IV_WORDS, AES_KEYSLOT_COUNT, AES_KEY_WORDS};
use tock_registers::LocalRegisterCopy;
use zeroize::Zeroize;

pub const KEY_SIZE: usize = (AES_KEY_WORDS * 4) as usize;
pub const IV_SIZE: usize = (AES_IV_WORDS * 4) as usize;

#[derive(Clone, Default, Zeroize)]
pub struct AesKeyslot {
    pub key: [u32; AES_KEY_WORDS as usize],
    pub original_iv: [u32; AES_IV_WORDS as usize],
    pub updated_iv: [u32; AES_IV_WORDS as usize],
}

impl AesKeyslot {
    pub fn key_bytes(&self) -> [u8; KEY_SIZE] {
        words_to_bytes(&self.key)
    }

    pub fn set_key_bytes(&mut self, key: &[u8; KEY_SIZE]) {
        self.key = bytes_to_words(key);
    }

    pub fn original_iv_bytes(&self) -> [u8; IV_SIZE] {
        words_to_bytes(&self.original_iv)
    }

    pub fn updated_iv_bytes(&self) -> [u8; IV_SIZE] {
        words_to_bytes(&self.updated_iv)
    }

    pub fn is_clear(&self) -> bool {
        self.key.iter().all(|w| *w == 0)
            && self.original_iv.iter().all(|w| *w == 0)
            && self.updated_iv.iter().all(|w| *w == 0)
    }
}

/// Keyslot table of one AES engine.
pub struct AesKeyTable {
    slots: [AesKeyslot; AES_KEYSLOT_COUNT as usize],
    addr: LocalRegisterCopy<u32, KeytableAddr::Register>,
}

impl Default for AesKeyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AesKeyTable {
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
            addr: LocalRegisterCopy::new(0),
        }
    }

    pub fn slot(&self, slot: u32) -> Option<&AesKeyslot> {
        self.slots.get(slot as usize)
    }

    pub fn slot_mut(&mut self, slot: u32) -> Option<&mut AesKeyslot> {
        self.slots.get_mut(slot as usize)
    }

    pub fn addr(&self) -> u32 {
        self.addr.get()
    }

    pub fn set_addr(&mut self, val: u32) {
        self.addr.set(val);
    }

    /// Data port write. Stores one word and advances the word index.
    pub fn write_data(&mut self, val: u32) {
        let word = self.addr.read(KeytableAddr::WORD) as usize;
        if let Some(cell) = self.cell_mut(word) {
            *cell = val;
        }
        self.advance(word);
    }

    /// Data port read. Key words are write only and read back as zero.
    pub fn read_data(&mut self) -> u32 {
        let word = self.addr.read(KeytableAddr::WORD) as usize;
        let val = match self.addr.read_as_enum(KeytableAddr::FIELD) {
            Some(KeytableAddr::FIELD::Value::KEY) => 0,
            _ => self.cell_mut(word).map(|c| *c).unwrap_or(0),
        };
        self.advance(word);
        val
    }

    fn advance(&mut self, word: usize) {
        self.addr.modify(KeytableAddr::WORD.val((word as u32 + 1) & 0xf));
    }

    fn cell_mut(&mut self, word: usize) -> Option<&mut u32> {
        let field = self.addr.read_as_enum(KeytableAddr::FIELD)?;
        let slot = self.slots.get_mut(self.addr.read(KeytableAddr::SLOT) as usize)?;
        match field {
            KeytableAddr::FIELD::Value::KEY => slot.key.get_mut(word),
            KeytableAddr::FIELD::Value::ORIGINAL_IV => slot.original_iv.get_mut(word),
            KeytableAddr::FIELD::Value::UPDATED_IV => slot.updated_iv.get_mut(word),
        }
    }
}

pub fn words_to_bytes<const W: usize, const B: usize>(words: &[u32; W]) -> [u8; B] {
    let mut out = [0u8; B];
    for (chunk, word) in out.chunks_exact_mut(4).zip(words.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    out
}

pub fn bytes_to_words<const B: usize, const W: usize>(bytes: &[u8; B]) -> [u32; W] {
    let mut out = [0u32; W];
    for (word, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    out
}
