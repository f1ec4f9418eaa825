/*++

Licensed under the Apache-2.0 license.

File Name:

    aes.rs

Abstract:

    File contains the AES engine model: CMAC, RNG and the GCM based key
    wrap and unwrap operations.

--*/

use crate::crypto::{
    aes_encrypt_block, cmac_subkey1, gcm_decrypt, gcm_encrypt, AES_BLOCK_SIZE, GCM_IV_SIZE,
    GCM_TAG_SIZE,
};
use crate::key_table::{words_to_bytes, AesKeyTable, KEY_SIZE};
use crate::DmaMemory;
use rand::RngCore;
use se_registers::aes::*;
use se_registers::ErrStatus;
use tock_registers::LocalRegisterCopy;
use zeroize::Zeroize;

/// AES engine register state and keyslots.
pub struct AesEngine {
    config: LocalRegisterCopy<u32, Config::Register>,
    crypto_config: LocalRegisterCopy<u32, CryptoConfig::Register>,
    in_addr: u32,
    in_hi: LocalRegisterCopy<u32, AddrHi::Register>,
    out_addr: u32,
    out_hi: LocalRegisterCopy<u32, AddrHi::Register>,
    last_block: u32,
    linear_ctr: [u32; 4],
    cmac_result: [u32; 4],
    rng_config: LocalRegisterCopy<u32, RngConfig::Register>,
    rng_src_config: LocalRegisterCopy<u32, RngSrcConfig::Register>,
    kac_target: LocalRegisterCopy<u32, KacTarget::Register>,
    keytable: AesKeyTable,
    rng_ops: u32,
}

impl Default for AesEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn key_len(code: u32) -> Option<usize> {
    match code {
        0 => Some(16),
        1 => Some(24),
        2 => Some(32),
        _ => None,
    }
}

fn config_error() -> u32 {
    ErrStatus::CONFIG::SET.value
}

fn dma_error() -> u32 {
    ErrStatus::DMA::SET.value
}

impl AesEngine {
    pub fn new() -> Self {
        Self {
            config: LocalRegisterCopy::new(0),
            crypto_config: LocalRegisterCopy::new(0),
            in_addr: 0,
            in_hi: LocalRegisterCopy::new(0),
            out_addr: 0,
            out_hi: LocalRegisterCopy::new(0),
            last_block: 0,
            linear_ctr: [0; 4],
            cmac_result: [0; 4],
            rng_config: LocalRegisterCopy::new(0),
            rng_src_config: LocalRegisterCopy::new(0),
            kac_target: LocalRegisterCopy::new(0),
            keytable: AesKeyTable::new(),
            rng_ops: 0,
        }
    }

    pub fn keytable(&self) -> &AesKeyTable {
        &self.keytable
    }

    pub fn keytable_mut(&mut self) -> &mut AesKeyTable {
        &mut self.keytable
    }

    pub fn rng_config(&self) -> (u32, u32) {
        (self.rng_config.get(), self.rng_src_config.get())
    }

    pub fn rng_ops(&self) -> u32 {
        self.rng_ops
    }

    pub fn cmac_result(&self) -> [u32; 4] {
        self.cmac_result
    }

    pub fn read(&mut self, offset: u32) -> u32 {
        match offset {
            CONFIG => self.config.get(),
            CRYPTO_CONFIG => self.crypto_config.get(),
            IN_ADDR => self.in_addr,
            IN_ADDR_HI => self.in_hi.get(),
            OUT_ADDR => self.out_addr,
            OUT_ADDR_HI => self.out_hi.get(),
            LAST_BLOCK => self.last_block,
            KEYTABLE_ADDR => self.keytable.addr(),
            KEYTABLE_DATA => self.keytable.read_data(),
            RNG_CONFIG => self.rng_config.get(),
            RNG_SRC_CONFIG => self.rng_src_config.get(),
            KAC_TARGET => self.kac_target.get(),
            o if (LINEAR_CTR..LINEAR_CTR + 16).contains(&o) => {
                self.linear_ctr[((o - LINEAR_CTR) / 4) as usize]
            }
            o if (CMAC_RESULT..CMAC_RESULT + 16).contains(&o) => {
                self.cmac_result[((o - CMAC_RESULT) / 4) as usize]
            }
            _ => 0,
        }
    }

    pub fn write(&mut self, offset: u32, val: u32) {
        match offset {
            CONFIG => self.config.set(val),
            CRYPTO_CONFIG => self.crypto_config.set(val),
            IN_ADDR => self.in_addr = val,
            IN_ADDR_HI => self.in_hi.set(val),
            OUT_ADDR => self.out_addr = val,
            OUT_ADDR_HI => self.out_hi.set(val),
            LAST_BLOCK => self.last_block = val,
            KEYTABLE_ADDR => self.keytable.set_addr(val),
            KEYTABLE_DATA => self.keytable.write_data(val),
            RNG_CONFIG => self.rng_config.set(val),
            RNG_SRC_CONFIG => self.rng_src_config.set(val),
            KAC_TARGET => self.kac_target.set(val),
            o if (LINEAR_CTR..LINEAR_CTR + 16).contains(&o) => {
                self.linear_ctr[((o - LINEAR_CTR) / 4) as usize] = val
            }
            o if (CMAC_RESULT..CMAC_RESULT + 16).contains(&o) => {
                self.cmac_result[((o - CMAC_RESULT) / 4) as usize] = val
            }
            _ => {}
        }
    }

    /// Run the configured operation. Returns the error status bits.
    pub fn execute(&mut self, mem: &DmaMemory) -> u32 {
        match self.config.read_as_enum(Config::ALG) {
            Some(Config::ALG::Value::CMAC) => self.cmac(mem),
            Some(Config::ALG::Value::RNG) => self.rng(mem),
            Some(Config::ALG::Value::KEY_WRAP) => self.key_wrap(mem),
            Some(Config::ALG::Value::KEY_UNWRAP) => self.key_unwrap(mem),
            _ => Err(config_error()),
        }
        .unwrap_or_else(|err| err)
    }

    fn input_phys(&self) -> u64 {
        ((self.in_hi.read(AddrHi::MSB) as u64) << 32) | self.in_addr as u64
    }

    fn output_phys(&self) -> u64 {
        ((self.out_hi.read(AddrHi::MSB) as u64) << 32) | self.out_addr as u64
    }

    fn block_count_matches(&self, len: usize) -> bool {
        len != 0 && len % AES_BLOCK_SIZE == 0 && len / AES_BLOCK_SIZE == self.last_block as usize + 1
    }

    fn cipher_key(&self, slot: u32, size_code: u32) -> Result<([u8; KEY_SIZE], usize), u32> {
        let len = key_len(size_code).ok_or_else(config_error)?;
        let slot = self
            .keytable
            .slot(slot)
            .ok_or(ErrStatus::KEYSLOT::SET.value)?;
        Ok((slot.key_bytes(), len))
    }

    fn cmac(&mut self, mem: &DmaMemory) -> Result<u32, u32> {
        if !self.crypto_config.matches_all(CryptoConfig::MODE::CMAC)
            || !self.config.matches_all(Config::DST::CMAC_REG)
        {
            return Err(config_error());
        }
        let len = self.in_hi.read(AddrHi::SZ) as usize;
        if !self.block_count_matches(len) {
            return Err(config_error());
        }
        let data = mem.read(self.input_phys(), len).ok_or_else(dma_error)?;

        let slot_idx = self.crypto_config.read(CryptoConfig::KEY_INDEX);
        let (mut key, klen) = self.cipher_key(slot_idx, self.config.read(Config::KEY_SIZE))?;
        let key_ref = &key[..klen];
        let slot = self.keytable.slot(slot_idx).ok_or(ErrStatus::KEYSLOT::SET.value)?;
        let mut state: [u8; AES_BLOCK_SIZE] =
            if self.crypto_config.is_set(CryptoConfig::IV_SELECT) {
                slot.updated_iv_bytes()
            } else {
                slot.original_iv_bytes()
            };

        let k1 = cmac_subkey1(key_ref).ok_or_else(config_error)?;
        let blocks = len / AES_BLOCK_SIZE;
        for (i, block) in data.chunks_exact(AES_BLOCK_SIZE).enumerate() {
            for (s, b) in state.iter_mut().zip(block.iter()) {
                *s ^= *b;
            }
            if i + 1 == blocks && self.crypto_config.is_set(CryptoConfig::CMAC_FINAL) {
                for (s, k) in state.iter_mut().zip(k1.iter()) {
                    *s ^= *k;
                }
            }
            aes_encrypt_block(key_ref, &mut state).ok_or_else(config_error)?;
        }
        key.zeroize();

        for (word, chunk) in self.cmac_result.iter_mut().zip(state.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(0)
    }

    fn rng(&mut self, mem: &DmaMemory) -> Result<u32, u32> {
        if !self.config.matches_all(Config::DST::MEMORY)
            || self.rng_config.matches_all(RngConfig::SRC::NONE)
        {
            return Err(config_error());
        }
        let len = self.out_hi.read(AddrHi::SZ) as usize;
        if !self.block_count_matches(len) {
            return Err(config_error());
        }
        let mut buf = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut buf);
        if !mem.write(self.output_phys(), &buf) {
            return Err(dma_error());
        }
        self.rng_ops += 1;
        Ok(0)
    }

    /// GCM nonce from the linear counter, which must end in Counter0.
    fn gcm_nonce(&self) -> Result<[u8; GCM_IV_SIZE], u32> {
        let ctr: [u8; 16] = words_to_bytes(&self.linear_ctr);
        if ctr[12..] != KAC_GCM_COUNTER0.to_be_bytes() {
            return Err(config_error());
        }
        let mut nonce = [0u8; GCM_IV_SIZE];
        nonce.copy_from_slice(&ctr[..GCM_IV_SIZE]);
        Ok(nonce)
    }

    fn kac_check(&self) -> Result<(u32, u32), u32> {
        if !self.crypto_config.matches_all(CryptoConfig::MODE::GCM) {
            return Err(config_error());
        }
        let kek_slot = self.crypto_config.read(CryptoConfig::KEY_INDEX);
        let target_slot = self.kac_target.read(KacTarget::SLOT);
        if kek_slot == target_slot {
            return Err(ErrStatus::KEYSLOT::SET.value);
        }
        Ok((kek_slot, target_slot))
    }

    fn key_wrap(&mut self, mem: &DmaMemory) -> Result<u32, u32> {
        let (kek_slot, target_slot) = self.kac_check()?;
        let nonce = self.gcm_nonce()?;
        if self.in_hi.read(AddrHi::SZ) as usize != KAC_MANIFEST_LEN
            || (self.out_hi.read(AddrHi::SZ) as usize) < KAC_KEY_WRAP_BLOB_LEN
        {
            return Err(config_error());
        }
        let manifest = mem
            .read(self.input_phys(), KAC_MANIFEST_LEN)
            .ok_or_else(dma_error)?;
        let target_size = self.kac_target.read(KacTarget::KEY_SIZE);
        let manifest_size =
            (u32::from_le_bytes([manifest[0], manifest[1], manifest[2], manifest[3]])
                >> KAC_MANIFEST_KEY_SIZE_SHIFT)
                & KAC_MANIFEST_KEY_SIZE_MASK;
        if manifest_size != target_size {
            return Err(config_error());
        }

        let (mut kek, kek_len) = self.cipher_key(kek_slot, self.config.read(Config::KEY_SIZE))?;
        let (mut target, target_len) = self.cipher_key(target_slot, target_size)?;
        let mut blob = [0u8; KAC_KEY_WRAP_BLOB_LEN];
        blob[..KAC_MANIFEST_LEN].copy_from_slice(&manifest);
        let ct = &mut blob[KAC_MANIFEST_LEN..KAC_MANIFEST_LEN + KAC_WRAPPED_KEY_LEN];
        ct[..target_len].copy_from_slice(&target[..target_len]);
        let tag = gcm_encrypt(&kek[..kek_len], &nonce, &manifest, ct);
        kek.zeroize();
        target.zeroize();
        let tag = tag.ok_or_else(config_error)?;
        blob[KAC_MANIFEST_LEN + KAC_WRAPPED_KEY_LEN..].copy_from_slice(&tag);

        if !mem.write(self.output_phys(), &blob) {
            return Err(dma_error());
        }
        Ok(0)
    }

    fn key_unwrap(&mut self, mem: &DmaMemory) -> Result<u32, u32> {
        let (kek_slot, target_slot) = self.kac_check()?;
        let nonce = self.gcm_nonce()?;
        if self.in_hi.read(AddrHi::SZ) as usize != KAC_KEY_WRAP_BLOB_LEN {
            return Err(config_error());
        }
        let blob = mem
            .read(self.input_phys(), KAC_KEY_WRAP_BLOB_LEN)
            .ok_or_else(dma_error)?;
        let manifest = &blob[..KAC_MANIFEST_LEN];
        let mut key = [0u8; KAC_WRAPPED_KEY_LEN];
        key.copy_from_slice(&blob[KAC_MANIFEST_LEN..KAC_MANIFEST_LEN + KAC_WRAPPED_KEY_LEN]);
        let mut tag = [0u8; GCM_TAG_SIZE];
        tag.copy_from_slice(&blob[KAC_MANIFEST_LEN + KAC_WRAPPED_KEY_LEN..]);

        let (mut kek, kek_len) = self.cipher_key(kek_slot, self.config.read(Config::KEY_SIZE))?;
        let verified = gcm_decrypt(&kek[..kek_len], &nonce, manifest, &mut key, &tag);
        kek.zeroize();
        if verified.is_none() {
            return Err(ErrStatus::TAG_MISMATCH::SET.value);
        }

        let upper = self.crypto_config.is_set(CryptoConfig::UPPER_QUAD);
        let slot = self
            .keytable
            .slot_mut(target_slot)
            .ok_or(ErrStatus::KEYSLOT::SET.value)?;
        let mut current = slot.key_bytes();
        let half = KEY_SIZE / 2;
        if upper {
            current[half..].copy_from_slice(&key[half..]);
        } else {
            current[..half].copy_from_slice(&key[..half]);
        }
        slot.set_key_bytes(&current);
        current.zeroize();
        key.zeroize();
        Ok(0)
    }
}
