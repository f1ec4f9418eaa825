/*++

Licensed under the Apache-2.0 license.

File Name:

    drng.rs

Abstract:

    File contains the hardware random number generator driven through an AES
    engine in RNG mode, with an aligned scratch buffer for requests the
    engine cannot DMA into directly.

--*/

use crate::cmem::round_up;
use crate::engine::{AesOpConfig, Engine, OpConfig, StartFlags};
use crate::{SeError, SeResult};
use se_registers::aes::{self, Config, CryptoConfig, RngConfig, RngSrcConfig, AES_BLOCK_SIZE};
use se_registers::{EngineId, MemDomain, SeHal};
use zeroize::Zeroize;

/// Largest request served by one call.
pub const DRNG_MAX_BYTES: usize = 16 * 1024 * 1024;

/// DMA granularity of the engine's RNG output.
pub const DRNG_ALIGN: usize = 64;

const DRNG_SCRATCH_SIZE: usize = 256;

/// Largest aligned piece one hardware task produces.
const DRNG_MAX_CHUNK: usize = ((aes::AES_DMA_MAX_SIZE as usize) / DRNG_ALIGN) * DRNG_ALIGN;

/// Zero run length above which an output is reported as suspect.
const DRNG_MAX_ZERO_RUN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrngConfig {
    pub engine: EngineId,
    /// Keep leftover scratch bytes for later unaligned requests.
    pub use_cache: bool,
}

impl Default for DrngConfig {
    fn default() -> Self {
        Self {
            engine: EngineId::Aes0,
            use_cache: true,
        }
    }
}

#[repr(C, align(64))]
struct Scratch([u8; DRNG_SCRATCH_SIZE]);

/// RNG state owned by one driver instance.
pub struct Drng {
    config: DrngConfig,
    scratch: Scratch,
    pos: usize,
    avail: usize,
}

impl Drng {
    pub fn new(config: DrngConfig) -> Self {
        Self {
            config,
            scratch: Scratch([0; DRNG_SCRATCH_SIZE]),
            pos: 0,
            avail: 0,
        }
    }

    pub fn config(&self) -> DrngConfig {
        self.config
    }

    /// Random bytes held for later requests.
    pub fn cached(&self) -> usize {
        self.avail
    }

    /// Fill `out` with random bytes.
    ///
    /// Aligned requests are generated in place. Others are served from the
    /// scratch buffer, and every byte served from it is zeroed there. On
    /// failure `out` is zeroized.
    pub fn generate<H: SeHal>(&mut self, hal: &mut H, out: &mut [u8]) -> SeResult<()> {
        if out.is_empty() {
            Err(SeError::DRIVER_DRNG_INVALID_ARGS)?;
        }
        if out.len() > DRNG_MAX_BYTES {
            Err(SeError::DRIVER_DRNG_TOO_BIG)?;
        }

        let result = Engine::lock(hal, self.config.engine).and_then(|mut engine| {
            if !engine.id().is_aes() {
                Err(SeError::DRIVER_ENGINE_CONFIG_MISMATCH)?;
            }
            self.fill(&mut engine, out)
        });
        if result.is_err() {
            out.zeroize();
            self.flush_cache();
            return result;
        }
        if !self.config.use_cache {
            self.flush_cache();
        }

        #[cfg(any(debug_assertions, feature = "rng-selftest"))]
        if output_suspect(out) {
            crate::cwarn!("[drng] suspect output, {} bytes", out.len());
        }
        Ok(())
    }

    /// Drop any retained random bytes.
    pub fn flush_cache(&mut self) {
        self.scratch.0.zeroize();
        self.pos = 0;
        self.avail = 0;
    }

    fn fill<H: SeHal>(&mut self, engine: &mut Engine<'_, H>, out: &mut [u8]) -> SeResult<()> {
        select_source(engine);

        if out.as_ptr() as usize % DRNG_ALIGN == 0 && out.len() % DRNG_ALIGN == 0 {
            for chunk in out.chunks_mut(DRNG_MAX_CHUNK) {
                generate_dma(engine, chunk, MemDomain::Client)?;
            }
            return Ok(());
        }

        let mut done = 0;
        while done < out.len() {
            if self.avail == 0 {
                let want = round_up(out.len() - done, DRNG_ALIGN).min(DRNG_SCRATCH_SIZE);
                generate_dma(engine, &mut self.scratch.0[..want], MemDomain::Kernel)?;
                self.pos = 0;
                self.avail = want;
            }
            let n = self.avail.min(out.len() - done);
            let served = &mut self.scratch.0[self.pos..self.pos + n];
            out[done..done + n].copy_from_slice(served);
            served.zeroize();
            self.pos += n;
            self.avail -= n;
            done += n;
        }
        Ok(())
    }
}

impl Drop for Drng {
    fn drop(&mut self) {
        self.flush_cache();
    }
}

/// Entropy source, reseeding on every request.
fn select_source<H: SeHal>(engine: &mut Engine<'_, H>) {
    engine.write_reg(
        aes::RNG_CONFIG,
        (RngConfig::SRC::ENTROPY + RngConfig::MODE::FORCE_RESEED).value,
    );
    engine.write_reg(aes::RNG_SRC_CONFIG, RngSrcConfig::RO_ENTROPY_SOURCE::SET.value);
}

fn generate_dma<H: SeHal>(
    engine: &mut Engine<'_, H>,
    buf: &mut [u8],
    domain: MemDomain,
) -> SeResult<()> {
    let region = engine.map_output(buf, domain)?;
    let mut cfg = AesOpConfig::new(
        Config::ALG::RNG + Config::DST::MEMORY,
        CryptoConfig::MODE::ECB,
    );
    cfg.output = Some(region);
    cfg.last_block = (region.len() / AES_BLOCK_SIZE - 1) as u32;
    let result = engine.execute(&OpConfig::Aes(cfg), StartFlags::INIT);
    engine.complete_output(&region);
    result
}

/// Weak sanity check of generator output: a long run of zero bytes, or
/// mostly zero bytes in an output of at least one block.
pub fn output_suspect(out: &[u8]) -> bool {
    let mut run = 0;
    let mut zeros = 0;
    for b in out {
        if *b == 0 {
            run += 1;
            zeros += 1;
            if run > DRNG_MAX_ZERO_RUN {
                return true;
            }
        } else {
            run = 0;
        }
    }
    out.len() >= AES_BLOCK_SIZE && zeros * 2 > out.len()
}
