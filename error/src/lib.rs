/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains API and macros used by the Security Engine drivers for
    error handling.

--*/
#![cfg_attr(not(any(test, feature = "std")), no_std)]
use core::convert::From;
use core::num::{NonZeroU32, TryFromIntError};

/// Security Engine Error Type
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SeError(pub NonZeroU32);

/// Coarse classification of an error code.
///
/// Callers that only need to branch on the nature of a failure match on the
/// kind instead of individual codes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SeErrorKind {
    /// Null-equivalent, zero-length, malformed size or flag arguments.
    InvalidArgs,
    /// Operation invoked out of sequence.
    BadState,
    /// Algorithm, mode or flag combination not implemented.
    NotSupported,
    /// Request exceeds a hardware or buffer limit.
    TooBig,
    /// Context memory allocation failure.
    NoMemory,
    /// Engine did not reach idle within the poll ceiling.
    Timeout,
    /// Hardware reported a fault.
    EngineError,
}

/// Macro to define error constants ensuring uniqueness
///
/// This macro takes a list of (name, value, kind, doc) tuples and generates
/// constant definitions for each error code plus the code to kind mapping.
#[macro_export]
macro_rules! define_error_constants {
    ($(($name:ident, $value:literal, $kind:ident, $doc:expr)),* $(,)?) => {
        $(
            #[doc = $doc]
            pub const $name: SeError = SeError::new_const($value);
        )*

        /// Returns the taxonomy kind of this error.
        pub fn kind(self) -> SeErrorKind {
            match self.0.get() {
                $(
                    $value => SeErrorKind::$kind,
                )*
                _ => SeErrorKind::EngineError,
            }
        }

        #[cfg(test)]
        /// Returns a vector of all defined error constants for testing uniqueness
        pub fn all_constants() -> Vec<(&'static str, u32)> {
            vec![
                $(
                    (stringify!($name), $value),
                )*
            ]
        }
    };
}

impl SeError {
    /// Create an error; intended to only be used from const contexts, as we don't want
    /// runtime panics if val is zero. The preferred way to get a SeError from a u32 is to
    /// use `SeError::try_from()` from the `TryFrom` trait impl.
    const fn new_const(val: u32) -> Self {
        match NonZeroU32::new(val) {
            Some(val) => Self(val),
            None => panic!("SeError cannot be 0"),
        }
    }

    define_error_constants![
        (
            DRIVER_CMEM_INVALID_ARGS,
            0x0001_0001,
            InvalidArgs,
            "Context memory: invalid size or alignment"
        ),
        (
            DRIVER_CMEM_BUFFER_TOO_SMALL,
            0x0001_0002,
            NoMemory,
            "Context memory: buffer smaller than the layout minimum"
        ),
        (
            DRIVER_CMEM_NO_FREE_SLOT,
            0x0001_0003,
            NoMemory,
            "Context memory: slice table full"
        ),
        (
            DRIVER_CMEM_NO_SPACE,
            0x0001_0004,
            NoMemory,
            "Context memory: no gap large enough"
        ),
        (
            DRIVER_CMEM_INVALID_SLICE,
            0x0001_0005,
            InvalidArgs,
            "Context memory: slice handle is not live"
        ),
        (
            DRIVER_CMEM_SLICES_LIVE,
            0x0001_0006,
            BadState,
            "Context memory: destroyed with live slices"
        ),
        (
            DRIVER_CMEM_LAYOUT_UNSATISFIED,
            0x0001_0007,
            NoMemory,
            "Context memory: capacity below the algorithm family layout"
        ),
        (
            DRIVER_KEYSLOT_INVALID_INDEX,
            0x0002_0001,
            InvalidArgs,
            "Keyslot: index out of range"
        ),
        (
            DRIVER_KEYSLOT_INVALID_KEY_SIZE,
            0x0002_0002,
            InvalidArgs,
            "Keyslot: key size not one of 128/192/256"
        ),
        (
            DRIVER_KEYSLOT_INVALID_KEY_LEN,
            0x0002_0003,
            InvalidArgs,
            "Keyslot: key buffer shorter than key size"
        ),
        (
            DRIVER_KEYSLOT_IV_NOT_SUPPORTED,
            0x0002_0004,
            NotSupported,
            "Keyslot: engine has no IV fields"
        ),
        (
            DRIVER_ENGINE_LOCK_FAILED,
            0x0003_0001,
            BadState,
            "Engine: mutex acquisition failed"
        ),
        (
            DRIVER_ENGINE_INVALID_STATE,
            0x0003_0002,
            BadState,
            "Engine: sequencer call out of order"
        ),
        (
            DRIVER_ENGINE_TIMEOUT,
            0x0003_0003,
            Timeout,
            "Engine: poll ceiling exceeded"
        ),
        (
            DRIVER_ENGINE_CONFIG_MISMATCH,
            0x0003_0004,
            InvalidArgs,
            "Engine: configuration does not match engine type"
        ),
        (
            DRIVER_ENGINE_DMA_TRANSLATION,
            0x0003_0005,
            InvalidArgs,
            "Engine: buffer has no physical mapping"
        ),
        (
            DRIVER_ENGINE_DMA_OUT_OF_RANGE,
            0x0003_0006,
            InvalidArgs,
            "Engine: physical range exceeds DMA address width"
        ),
        (
            DRIVER_ENGINE_DMA_TOO_BIG,
            0x0003_0007,
            TooBig,
            "Engine: buffer exceeds DMA size field"
        ),
        (
            DRIVER_AES0_ENGINE_ERROR,
            0x0003_0008,
            EngineError,
            "Engine: AES0 reported an error"
        ),
        (
            DRIVER_AES1_ENGINE_ERROR,
            0x0003_0009,
            EngineError,
            "Engine: AES1 reported an error"
        ),
        (
            DRIVER_PKA_ENGINE_ERROR,
            0x0003_000a,
            EngineError,
            "Engine: PKA reported an error"
        ),
        (
            DRIVER_CMAC_INVALID_CHUNK,
            0x0004_0001,
            InvalidArgs,
            "CMAC: chunk empty or not block aligned"
        ),
        (
            DRIVER_CMAC_CHUNK_TOO_BIG,
            0x0004_0002,
            TooBig,
            "CMAC: chunk exceeds hardware maximum"
        ),
        (
            DRIVER_CMAC_INVALID_DST,
            0x0004_0003,
            InvalidArgs,
            "CMAC: destination shorter than tag"
        ),
        (
            DRIVER_CMAC_INVALID_STATE,
            0x0004_0004,
            BadState,
            "CMAC: context already finalized"
        ),
        (
            DRIVER_CMAC_INVALID_KEY,
            0x0004_0005,
            InvalidArgs,
            "CMAC: raw key missing or mismatched"
        ),
        (
            DRIVER_KWUW_NOT_SUPPORTED,
            0x0005_0001,
            NotSupported,
            "KW/KUW: algorithm selection not supported"
        ),
        (
            DRIVER_KWUW_INVALID_DST,
            0x0005_0002,
            InvalidArgs,
            "KW/KUW: destination shorter than blob"
        ),
        (
            DRIVER_KWUW_INVALID_BLOB,
            0x0005_0003,
            InvalidArgs,
            "KW/KUW: malformed wrapped key blob"
        ),
        (
            DRIVER_KWUW_INVALID_SLOTS,
            0x0005_0004,
            InvalidArgs,
            "KW/KUW: key encryption key slot equals target slot"
        ),
        (
            DRIVER_KWUW_INVALID_STATE,
            0x0005_0005,
            BadState,
            "KW/KUW: operation context out of sequence"
        ),
        (
            DRIVER_DRNG_INVALID_ARGS,
            0x0006_0001,
            InvalidArgs,
            "DRNG: empty request"
        ),
        (
            DRIVER_DRNG_TOO_BIG,
            0x0006_0002,
            TooBig,
            "DRNG: request above 16 MiB"
        ),
        (
            DRIVER_PKA_KEYSLOT_INVALID_INDEX,
            0x0007_0001,
            InvalidArgs,
            "PKA: keyslot index out of range"
        ),
        (
            DRIVER_PKA_INVALID_RSA_SIZE,
            0x0007_0002,
            InvalidArgs,
            "PKA: unsupported RSA size"
        ),
        (
            DRIVER_PKA_INVALID_EC_FLAGS,
            0x0007_0003,
            InvalidArgs,
            "PKA: invalid EC point flag combination"
        ),
        (
            DRIVER_PKA_UNDEFINED_EC_POINT,
            0x0007_0004,
            InvalidArgs,
            "PKA: EC point is undefined"
        ),
        (
            DRIVER_PKA_INVALID_FIELD_LEN,
            0x0007_0005,
            InvalidArgs,
            "PKA: field value longer than operand"
        ),
        (
            DRIVER_PKA_INVALID_OPERAND,
            0x0007_0006,
            InvalidArgs,
            "PKA: operand buffer length mismatch"
        ),
        (
            DRIVER_ACIPHER_ALREADY_INITIALIZED,
            0x0008_0001,
            BadState,
            "Acipher: context already initialized"
        ),
        (
            DRIVER_ACIPHER_NOT_SUPPORTED,
            0x0008_0002,
            NotSupported,
            "Acipher: algorithm, mode or hash not supported"
        ),
        (
            DRIVER_ACIPHER_INVALID_KEY_TYPE,
            0x0008_0003,
            InvalidArgs,
            "Acipher: key type does not match algorithm"
        ),
        (
            DRIVER_ACIPHER_KEY_NOT_SET,
            0x0008_0004,
            BadState,
            "Acipher: do_final before set_key"
        ),
        (
            DRIVER_ACIPHER_INVALID_STATE,
            0x0008_0005,
            BadState,
            "Acipher: context already finalized"
        ),
        (
            DRIVER_ACIPHER_INPUT_TOO_BIG,
            0x0008_0006,
            TooBig,
            "Acipher: input longer than the padding allows"
        ),
        (
            DRIVER_ACIPHER_INVALID_INPUT,
            0x0008_0007,
            InvalidArgs,
            "Acipher: input length or value invalid"
        ),
        (
            DRIVER_ACIPHER_OUTPUT_TOO_SMALL,
            0x0008_0008,
            InvalidArgs,
            "Acipher: output buffer too small"
        ),
        (
            DRIVER_ACIPHER_DECODING_FAILED,
            0x0008_0009,
            InvalidArgs,
            "Acipher: padding check failed"
        ),
        (
            DRIVER_ACIPHER_INVALID_KEY_SIZE,
            0x0008_000a,
            InvalidArgs,
            "Acipher: modulus or exponent length invalid"
        ),
        (
            DRIVER_CONTEXT_BAD_STATE,
            0x0009_0001,
            BadState,
            "API context: no matching algorithm state active"
        ),
        (
            DRIVER_CONTEXT_BUSY,
            0x0009_0002,
            BadState,
            "API context: another algorithm state is active"
        ),
        (
            KAT_CMAC_FAILURE,
            0x000a_0001,
            EngineError,
            "KAT: CMAC output mismatch"
        ),
    ];
}

impl From<core::num::NonZeroU32> for crate::SeError {
    fn from(val: core::num::NonZeroU32) -> Self {
        crate::SeError(val)
    }
}

impl From<SeError> for core::num::NonZeroU32 {
    fn from(val: SeError) -> Self {
        val.0
    }
}

impl From<SeError> for u32 {
    fn from(val: SeError) -> Self {
        core::num::NonZeroU32::from(val).get()
    }
}

impl TryFrom<u32> for SeError {
    type Error = TryFromIntError;
    fn try_from(val: u32) -> Result<Self, TryFromIntError> {
        match NonZeroU32::try_from(val) {
            Ok(val) => Ok(SeError(val)),
            Err(err) => Err(err),
        }
    }
}

pub type SeResult<T> = Result<T, SeError>;

/// Combine the result of an operation with the result of its cleanup.
///
/// The first failure wins: a cleanup error only surfaces when the primary
/// result succeeded.
pub fn first_err<T>(primary: SeResult<T>, cleanup: SeResult<()>) -> SeResult<T> {
    match (primary, cleanup) {
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(e),
        (Ok(v), Ok(())) => Ok(v),
    }
}
