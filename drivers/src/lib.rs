/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the Security Engine driver library.

--*/

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
pub mod printer;

mod array;
mod wait;

pub mod acipher;
pub mod aes_cmac;
pub mod aes_kwuw;
pub mod api_context;
pub mod cmem;
pub mod drng;
pub mod engine;
pub mod keyslot;
pub mod memory_layout;
pub mod pka;
pub mod pka_keyslot;
pub mod rsa_pad;
pub mod se;

mod kats;

pub use acipher::{AcipherAlgorithm, AcipherKey, AcipherMode, AcipherState, OaepDigest};
pub use aes_cmac::{aes_cmac, AesCmac, CmacFlags, CMAC_TAG_SIZE};
pub use aes_kwuw::{
    key_unwrap, key_wrap, resolve_kwuw, AesAlgorithm, AesMode, KacManifest, KuwArgs, KwArgs,
    KwuwOp, ManifestHeader, WrappedKeyBlob, KWUW_IV_SIZE,
};
pub use api_context::{ApiContext, KwuwParams, RunState};
pub use array::LEArray4x4;
pub use cmem::{Cmem, CmemSlice, CmemTag, CMEM_ALIGN, CMEM_MAX_SIZE};
pub use drng::{Drng, DrngConfig, DRNG_MAX_BYTES};
pub use engine::{DmaRegion, Engine, OpConfig, SeqState, StartFlags, SE_MAX_POLL_COUNT};
pub use kats::execute_cmac_kat;
pub use keyslot::{AesKeySize, IvSelect, KeySource, KeyslotLease};
pub use memory_layout::{CmemLayout, ACIPHER_CMEM_LAYOUT, CMAC_CMEM_LAYOUT, KWUW_CMEM_LAYOUT};
pub use pka::{load_modexp_key, modexp};
pub use pka_keyslot::{
    read_ec_point, read_rsa_public, write_ec_point, write_rsa_keyslot, EcCurve, EcPoint,
    EcPointFlags, Endianness, RsaKeySize, RsaKeyslotFields,
};
pub use se::Se;
pub use se_error::{first_err, SeError, SeErrorKind, SeResult};
pub use se_registers::{EngineId, MemDomain, SeHal};
