/*++

Licensed under the Apache-2.0 license.

File Name:

    api_context.rs

Abstract:

    File contains the per-call API context: the context memory and the one
    algorithm state that may be active in it.

--*/

use crate::acipher::{AcipherAlgorithm, AcipherKey, AcipherMode, AcipherState};
use crate::aes_cmac::{AesCmac, CmacFlags};
use crate::aes_kwuw::{
    check_slots, key_unwrap, key_wrap, resolve_kwuw, AesAlgorithm, AesMode, KuwArgs, KwArgs,
    KwuwOp, ManifestHeader, WrappedKeyBlob, KWUW_IV_SIZE,
};
use crate::cmem::{Cmem, CmemSlice, CmemTag, CMEM_ALIGN};
use crate::keyslot::{AesKeySize, KeySource};
use crate::memory_layout::{
    CmemLayout, ACIPHER_CMEM_LAYOUT, CMAC_CMEM_LAYOUT, KWUW_CMEM_LAYOUT,
};
use crate::se::Se;
use crate::{SeError, SeResult};
use se_registers::aes::KAC_KEY_WRAP_BLOB_LEN;
use se_registers::{EngineId, SeHal};
use zeroize::Zeroize;

const AES_MAX_KEY_SIZE: usize = 32;

/// Where a stored AES key lives between init and use.
#[derive(Debug, Clone, Copy)]
enum StoredSource {
    Raw(CmemSlice),
    Preset { clear_after_use: bool },
}

impl StoredSource {
    fn store(cmem: &mut Cmem, source: &KeySource) -> SeResult<Self> {
        match *source {
            KeySource::Raw { size, key } => {
                if key.len() != size.bytes() {
                    Err(SeError::DRIVER_KEYSLOT_INVALID_KEY_LEN)?;
                }
                let slice = cmem.allocate(CmemTag::Key, CMEM_ALIGN, key.len())?;
                match cmem.slice_mut(&slice) {
                    Ok(buf) => buf.copy_from_slice(key),
                    Err(e) => {
                        cmem.release(CmemTag::Key, slice);
                        Err(e)?;
                    }
                }
                Ok(Self::Raw(slice))
            }
            KeySource::Preset {
                clear_after_use, ..
            } => Ok(Self::Preset { clear_after_use }),
        }
    }

    /// Copy a raw key out of context memory into `buf`.
    fn load(&self, cmem: &Cmem, buf: &mut [u8; AES_MAX_KEY_SIZE]) -> SeResult<Option<usize>> {
        match self {
            Self::Raw(slice) => {
                let key = cmem.slice(slice)?;
                buf[..key.len()].copy_from_slice(key);
                Ok(Some(key.len()))
            }
            Self::Preset { .. } => Ok(None),
        }
    }

    fn release(&mut self, cmem: &mut Cmem) {
        if let Self::Raw(slice) = *self {
            cmem.release(CmemTag::Key, slice);
            *self = Self::Preset {
                clear_after_use: false,
            };
        }
    }
}

/// Arguments of a key wrap or unwrap request.
pub struct KwuwParams<'k> {
    pub algorithm: AesAlgorithm,
    pub mode: AesMode,
    pub engine: EngineId,
    pub kek: KeySource<'k>,
    pub kek_slot: u32,
    pub leave_kek_resident: bool,
    /// Wrap source or unwrap destination.
    pub target_slot: u32,
    /// Size of the key being wrapped. Unwrap takes it from the blob.
    pub target_size: AesKeySize,
    pub iv: [u8; KWUW_IV_SIZE],
    pub header: ManifestHeader,
}

#[derive(Debug)]
pub struct KwuwState {
    op: KwuwOp,
    engine: EngineId,
    kek: StoredSource,
    kek_size: AesKeySize,
    kek_slot: u32,
    leave_kek_resident: bool,
    target_slot: u32,
    target_size: AesKeySize,
    iv: [u8; KWUW_IV_SIZE],
    header: ManifestHeader,
    done: bool,
}

impl KwuwState {
    pub fn op(&self) -> KwuwOp {
        self.op
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

pub struct CmacState {
    cmac: AesCmac,
    key: StoredSource,
}

impl CmacState {
    pub fn is_done(&self) -> bool {
        self.cmac.is_done()
    }
}

/// The algorithm state active in a context.
pub enum RunState {
    None,
    Acipher(AcipherState),
    Kwuw(KwuwState),
    Cmac(CmacState),
}

/// API call context.
///
/// Holds at most one algorithm state. `reset` returns the context to
/// `RunState::None` whatever state it is in.
pub struct ApiContext<'a> {
    cmem: Cmem<'a>,
    state: RunState,
}

impl<'a> ApiContext<'a> {
    pub fn new(cmem: Cmem<'a>) -> Self {
        Self {
            cmem,
            state: RunState::None,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn cmem(&self) -> &Cmem<'a> {
        &self.cmem
    }

    fn begin(&self, layout: &CmemLayout) -> SeResult<()> {
        if !matches!(self.state, RunState::None) {
            Err(SeError::DRIVER_CONTEXT_BUSY)?;
        }
        if !self.cmem.satisfies(layout) {
            Err(SeError::DRIVER_CMEM_LAYOUT_UNSATISFIED)?;
        }
        Ok(())
    }

    //
    // Asymmetric cipher
    //
    pub fn acipher_init(
        &mut self,
        algorithm: AcipherAlgorithm,
        mode: AcipherMode,
        label: &[u8],
    ) -> SeResult<()> {
        if matches!(self.state, RunState::Acipher(_)) {
            Err(SeError::DRIVER_ACIPHER_ALREADY_INITIALIZED)?;
        }
        self.begin(&ACIPHER_CMEM_LAYOUT)?;
        let state = AcipherState::init(&mut self.cmem, algorithm, mode, label)?;
        self.state = RunState::Acipher(state);
        Ok(())
    }

    pub fn acipher_set_key(&mut self, key: &AcipherKey) -> SeResult<()> {
        match &mut self.state {
            RunState::Acipher(state) => state.set_key(&mut self.cmem, key),
            _ => Err(SeError::DRIVER_CONTEXT_BAD_STATE),
        }
    }

    /// Returns the number of bytes written to `output`.
    pub fn acipher_do_final<H: SeHal>(
        &mut self,
        se: &mut Se<H>,
        input: &[u8],
        output: &mut [u8],
    ) -> SeResult<usize> {
        match &mut self.state {
            RunState::Acipher(state) => state.do_final(se, &self.cmem, input, output),
            _ => Err(SeError::DRIVER_CONTEXT_BAD_STATE),
        }
    }

    //
    // Key wrap and unwrap
    //
    pub fn kwuw_init(&mut self, params: &KwuwParams) -> SeResult<()> {
        self.begin(&KWUW_CMEM_LAYOUT)?;
        let op = resolve_kwuw(params.algorithm, params.mode)?;
        if !params.engine.is_aes() {
            Err(SeError::DRIVER_ENGINE_CONFIG_MISMATCH)?;
        }
        let kek = StoredSource::store(&mut self.cmem, &params.kek)?;
        self.state = RunState::Kwuw(KwuwState {
            op,
            engine: params.engine,
            kek,
            kek_size: params.kek.size(),
            kek_slot: params.kek_slot,
            leave_kek_resident: params.leave_kek_resident,
            target_slot: params.target_slot,
            target_size: params.target_size,
            iv: params.iv,
            header: params.header,
            done: false,
        });
        Ok(())
    }

    /// Wrap writes the blob to `output` and ignores `input`. Unwrap parses
    /// the blob from `input` and writes nothing. Returns the bytes written.
    pub fn kwuw_do_final<H: SeHal>(
        &mut self,
        se: &mut Se<H>,
        input: &[u8],
        output: &mut [u8],
    ) -> SeResult<usize> {
        let RunState::Kwuw(state) = &mut self.state else {
            return Err(SeError::DRIVER_CONTEXT_BAD_STATE);
        };
        if state.done {
            Err(SeError::DRIVER_KWUW_INVALID_STATE)?;
        }

        // Argument errors leave the context ready for another attempt. Once
        // the engine has been driven the context is spent.
        check_slots(state.kek_slot, state.target_slot)?;
        let blob = match state.op {
            KwuwOp::Wrap => {
                if output.len() < KAC_KEY_WRAP_BLOB_LEN {
                    Err(SeError::DRIVER_KWUW_INVALID_DST)?;
                }
                None
            }
            KwuwOp::Unwrap => Some(WrappedKeyBlob::parse(input)?),
        };

        // The bounce buffer comes from the same context memory, so the raw
        // KEK is staged on the stack for the call.
        let mut kek_buf = [0u8; AES_MAX_KEY_SIZE];
        let mut engine_driven = false;
        let result = state.kek.load(&self.cmem, &mut kek_buf).and_then(|len| {
            let kek = match (len, state.kek) {
                (Some(len), _) => KeySource::Raw {
                    size: state.kek_size,
                    key: &kek_buf[..len],
                },
                (None, StoredSource::Preset { clear_after_use }) => KeySource::Preset {
                    size: state.kek_size,
                    clear_after_use,
                },
                (None, StoredSource::Raw(_)) => Err(SeError::DRIVER_CONTEXT_BAD_STATE)?,
            };
            let mut engine = se.lock(state.engine)?;
            engine_driven = true;
            match &blob {
                None => {
                    let args = KwArgs {
                        kek,
                        kek_slot: state.kek_slot,
                        leave_kek_resident: state.leave_kek_resident,
                        target_slot: state.target_slot,
                        target_size: state.target_size,
                        iv: state.iv,
                        header: state.header,
                    };
                    key_wrap(&mut engine, &mut self.cmem, &args, output)
                }
                Some(blob) => {
                    let args = KuwArgs {
                        kek,
                        kek_slot: state.kek_slot,
                        leave_kek_resident: state.leave_kek_resident,
                        target_slot: state.target_slot,
                        iv: state.iv,
                        blob,
                    };
                    key_unwrap(&mut engine, &mut self.cmem, &args)
                }
            }
        });
        kek_buf.zeroize();
        if engine_driven {
            state.done = true;
        }
        result
    }

    //
    // AES-CMAC
    //
    pub fn cmac_init(
        &mut self,
        engine: EngineId,
        slot: u32,
        source: &KeySource,
        flags: CmacFlags,
    ) -> SeResult<()> {
        self.begin(&CMAC_CMEM_LAYOUT)?;
        let flags = match *source {
            KeySource::Preset {
                clear_after_use, ..
            } => CmacFlags {
                clear_key_after_use: flags.clear_key_after_use || clear_after_use,
                ..flags
            },
            KeySource::Raw { .. } => flags,
        };
        let cmac = AesCmac::new(engine, slot, source.size(), flags)?;
        let key = StoredSource::store(&mut self.cmem, source)?;
        self.state = RunState::Cmac(CmacState { cmac, key });
        Ok(())
    }

    /// Feed a chunk of whole blocks that is not the end of the message.
    pub fn cmac_update<H: SeHal>(&mut self, se: &mut Se<H>, chunk: &[u8]) -> SeResult<()> {
        self.cmac_process(se, chunk, None)
    }

    /// Feed the last chunk and write the tag to `dst`. Returns the tag length.
    pub fn cmac_final<H: SeHal>(
        &mut self,
        se: &mut Se<H>,
        chunk: &[u8],
        dst: &mut [u8],
    ) -> SeResult<usize> {
        let mut written = 0;
        self.cmac_process(se, chunk, Some((dst, &mut written)))?;
        Ok(written)
    }

    fn cmac_process<H: SeHal>(
        &mut self,
        se: &mut Se<H>,
        chunk: &[u8],
        last: Option<(&mut [u8], &mut usize)>,
    ) -> SeResult<()> {
        let RunState::Cmac(state) = &mut self.state else {
            return Err(SeError::DRIVER_CONTEXT_BAD_STATE);
        };
        let mut key_buf = [0u8; AES_MAX_KEY_SIZE];
        let result = state.key.load(&self.cmem, &mut key_buf).and_then(|len| {
            let key = len.map(|len| &key_buf[..len]);
            let mut engine = se.lock(state.cmac.engine())?;
            match last {
                Some((dst, written)) => {
                    *written = state.cmac.finalize(&mut engine, key, chunk, dst)?;
                    Ok(())
                }
                None => state.cmac.update(&mut engine, key, chunk),
            }
        });
        key_buf.zeroize();
        result
    }

    /// Drop the active state. Its slices are released and zeroed.
    pub fn reset(&mut self) {
        match core::mem::replace(&mut self.state, RunState::None) {
            RunState::None => {}
            RunState::Acipher(mut state) => state.release(&mut self.cmem),
            RunState::Kwuw(mut state) => state.kek.release(&mut self.cmem),
            RunState::Cmac(mut state) => state.key.release(&mut self.cmem),
        }
    }

    /// Reset and tear down the context memory.
    pub fn destroy(mut self) -> SeResult<()> {
        self.reset();
        self.cmem.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aes_kwuw::KacManifest;
    use crate::drng::DrngConfig;
    use crate::SeErrorKind;
    use se_emu::SeEmulator;

    #[repr(C, align(64))]
    struct Buf([u8; 2048]);

    fn se() -> Se<SeEmulator> {
        Se::new(SeEmulator::new(), DrngConfig::default())
    }

    fn ctx(buf: &mut Buf) -> ApiContext<'_> {
        ApiContext::new(Cmem::get_init(&mut buf.0, &ACIPHER_CMEM_LAYOUT).unwrap())
    }

    #[test]
    fn test_do_final_before_set_key_then_reset() {
        let mut se = se();
        let mut buf = Buf([0; 2048]);
        let mut ctx = ctx(&mut buf);
        ctx.acipher_init(AcipherAlgorithm::RsaPkcs1V15, AcipherMode::Encrypt, &[])
            .unwrap();
        let mut out = [0u8; 256];
        let err = ctx.acipher_do_final(&mut se, b"msg", &mut out).unwrap_err();
        assert_eq!(err.kind(), SeErrorKind::BadState);

        ctx.reset();
        assert!(matches!(ctx.state(), RunState::None));
        ctx.acipher_init(AcipherAlgorithm::RsaNoPad, AcipherMode::Encrypt, &[])
            .unwrap();
        ctx.destroy().unwrap();
    }

    #[test]
    fn test_double_init() {
        let mut buf = Buf([0; 2048]);
        let mut ctx = ctx(&mut buf);
        ctx.acipher_init(AcipherAlgorithm::RsaNoPad, AcipherMode::Encrypt, &[])
            .unwrap();
        assert_eq!(
            ctx.acipher_init(AcipherAlgorithm::RsaNoPad, AcipherMode::Encrypt, &[]),
            Err(SeError::DRIVER_ACIPHER_ALREADY_INITIALIZED)
        );
        let flags = CmacFlags::default();
        let source = KeySource::Preset {
            size: AesKeySize::Aes128,
            clear_after_use: false,
        };
        let err = ctx.cmac_init(EngineId::Aes0, 0, &source, flags).unwrap_err();
        assert_eq!(err, SeError::DRIVER_CONTEXT_BUSY);
        assert_eq!(err.kind(), SeErrorKind::BadState);
    }

    #[test]
    fn test_wrong_variant() {
        let mut se = se();
        let mut buf = Buf([0; 2048]);
        let mut ctx = ctx(&mut buf);
        let mut dst = [0u8; 16];
        assert_eq!(
            ctx.cmac_final(&mut se, &[0; 16], &mut dst),
            Err(SeError::DRIVER_CONTEXT_BAD_STATE)
        );
        ctx.acipher_init(AcipherAlgorithm::RsaNoPad, AcipherMode::Encrypt, &[])
            .unwrap();
        assert_eq!(
            ctx.kwuw_do_final(&mut se, &[], &mut dst),
            Err(SeError::DRIVER_CONTEXT_BAD_STATE)
        );
    }

    #[test]
    fn test_layout_unsatisfied() {
        let mut buf = Buf([0; 2048]);
        let cmem = Cmem::get_init(&mut buf.0[..384], &KWUW_CMEM_LAYOUT).unwrap();
        let mut ctx = ApiContext::new(cmem);
        let err = ctx
            .acipher_init(AcipherAlgorithm::RsaNoPad, AcipherMode::Encrypt, &[])
            .unwrap_err();
        assert_eq!(err, SeError::DRIVER_CMEM_LAYOUT_UNSATISFIED);
        assert_eq!(err.kind(), SeErrorKind::NoMemory);
        assert!(matches!(ctx.state(), RunState::None));
    }

    #[test]
    fn test_cmac_two_chunks() {
        let mut se = se();
        let mut buf = Buf([0; 2048]);
        let mut ctx = ctx(&mut buf);
        let key = [0u8; 16];
        let source = KeySource::Raw {
            size: AesKeySize::Aes128,
            key: &key,
        };
        ctx.cmac_init(EngineId::Aes1, 4, &source, CmacFlags::default())
            .unwrap();
        assert_eq!(ctx.cmem().entries(), 1);
        ctx.cmac_update(&mut se, &[0; 16]).unwrap();
        let mut tag = [0u8; 16];
        assert_eq!(ctx.cmac_final(&mut se, &[0; 16], &mut tag), Ok(16));

        let one_shot = {
            let mut engine = se.lock(EngineId::Aes1).unwrap();
            crate::aes_cmac::aes_cmac(&mut engine, 5, source, &[0; 32]).unwrap()
        };
        assert_eq!(tag, one_shot);
        assert!(se.hal().aes_keyslot(EngineId::Aes1, 4).unwrap().is_clear());

        ctx.reset();
        assert_eq!(ctx.cmem().entries(), 0);
    }

    #[test]
    fn test_kwuw_roundtrip() {
        let mut se = se();
        let key = [0x5au8; 32];
        let kek = [0xa5u8; 32];
        se.hal_mut().set_aes_key(EngineId::Aes0, 3, &key);

        let mut params = KwuwParams {
            algorithm: AesAlgorithm::Kwuw,
            mode: AesMode::Encrypt,
            engine: EngineId::Aes0,
            kek: KeySource::Raw {
                size: AesKeySize::Aes256,
                key: &kek,
            },
            kek_slot: 1,
            leave_kek_resident: false,
            target_slot: 3,
            target_size: AesKeySize::Aes256,
            iv: [7; KWUW_IV_SIZE],
            header: ManifestHeader::new(KacManifest::default(), 0),
        };

        let mut buf = Buf([0; 2048]);
        let mut ctx = ctx(&mut buf);
        ctx.kwuw_init(&params).unwrap();
        let mut blob = [0u8; 64];
        assert_eq!(ctx.kwuw_do_final(&mut se, &[], &mut blob), Ok(64));
        assert_eq!(
            ctx.kwuw_do_final(&mut se, &[], &mut blob),
            Err(SeError::DRIVER_KWUW_INVALID_STATE)
        );
        ctx.reset();

        params.mode = AesMode::Decrypt;
        params.target_slot = 9;
        ctx.kwuw_init(&params).unwrap();
        assert_eq!(ctx.kwuw_do_final(&mut se, &blob, &mut []), Ok(0));
        ctx.reset();
        ctx.destroy().unwrap();

        let restored = se.hal().aes_keyslot(EngineId::Aes0, 9).unwrap();
        assert_eq!(restored.key_bytes(), key);
        assert!(se.hal().aes_keyslot(EngineId::Aes0, 1).unwrap().is_clear());
    }

    #[test]
    fn test_kwuw_retry_after_argument_error() {
        let mut se = se();
        se.hal_mut().set_aes_key(EngineId::Aes1, 4, &[0x3cu8; 32]);
        let kek = [0x11u8; 16];
        let mut params = KwuwParams {
            algorithm: AesAlgorithm::Kw,
            mode: AesMode::Encrypt,
            engine: EngineId::Aes1,
            kek: KeySource::Raw {
                size: AesKeySize::Aes128,
                key: &kek,
            },
            kek_slot: 0,
            leave_kek_resident: false,
            target_slot: 4,
            target_size: AesKeySize::Aes128,
            iv: [1; KWUW_IV_SIZE],
            header: ManifestHeader::new(KacManifest::default(), 0),
        };

        let mut buf = Buf([0; 2048]);
        let mut ctx = ctx(&mut buf);
        ctx.kwuw_init(&params).unwrap();
        let mut short = [0u8; 63];
        assert_eq!(
            ctx.kwuw_do_final(&mut se, &[], &mut short),
            Err(SeError::DRIVER_KWUW_INVALID_DST)
        );
        assert_eq!(se.hal().starts(EngineId::Aes1), 0);
        let mut blob = [0u8; 64];
        assert_eq!(ctx.kwuw_do_final(&mut se, &[], &mut blob), Ok(64));
        ctx.reset();

        params.algorithm = AesAlgorithm::Kuw;
        params.target_slot = 6;
        ctx.kwuw_init(&params).unwrap();
        assert_eq!(
            ctx.kwuw_do_final(&mut se, &blob[..60], &mut []),
            Err(SeError::DRIVER_KWUW_INVALID_BLOB)
        );
        let mut tampered = blob;
        tampered[30] ^= 0x80;
        assert_eq!(
            ctx.kwuw_do_final(&mut se, &tampered, &mut []).map_err(|e| e.kind()),
            Err(SeErrorKind::EngineError)
        );
        // The engine ran and failed; the context is spent until reset.
        assert_eq!(
            ctx.kwuw_do_final(&mut se, &blob, &mut []),
            Err(SeError::DRIVER_KWUW_INVALID_STATE)
        );
        ctx.reset();
        ctx.kwuw_init(&params).unwrap();
        assert_eq!(ctx.kwuw_do_final(&mut se, &blob, &mut []), Ok(0));
        ctx.reset();
        assert_eq!(
            se.hal().aes_keyslot(EngineId::Aes1, 6).unwrap().key_bytes()[..16],
            [0x3cu8; 16]
        );
    }

    #[test]
    fn test_kwuw_padding_rejected() {
        let mut buf = Buf([0; 2048]);
        let mut ctx = ctx(&mut buf);
        let params = KwuwParams {
            algorithm: AesAlgorithm::CbcPkcs7,
            mode: AesMode::Encrypt,
            engine: EngineId::Aes0,
            kek: KeySource::Preset {
                size: AesKeySize::Aes128,
                clear_after_use: false,
            },
            kek_slot: 1,
            leave_kek_resident: false,
            target_slot: 2,
            target_size: AesKeySize::Aes128,
            iv: [0; KWUW_IV_SIZE],
            header: ManifestHeader::new(KacManifest::default(), 0),
        };
        let err = ctx.kwuw_init(&params).unwrap_err();
        assert_eq!(err.kind(), SeErrorKind::NotSupported);
        assert!(matches!(ctx.state(), RunState::None));
    }
}
