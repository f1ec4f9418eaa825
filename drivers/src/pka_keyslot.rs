/*++

Licensed under the Apache-2.0 license.

File Name:

    pka_keyslot.rs

Abstract:

    File contains reading and writing of RSA and EC public key material in
    PKA keyslots. The keyslot fields are little-endian word arrays; callers
    may ask for big-endian byte strings instead.

--*/

use crate::engine::Engine;
use crate::{SeError, SeResult};
use arrayvec::ArrayVec;
use se_registers::pka::{self, KeyslotAddr, PKA_KEYSLOT_COUNT};
use se_registers::tock_registers::fields::FieldValue;
use se_registers::{EngineId, SeHal};
use zeroize::Zeroize;

/// Largest RSA field, 4096 bits.
pub const RSA_MAX_BYTES: usize = 512;

/// Largest EC coordinate in whole words, P-521.
pub const EC_MAX_BYTES: usize = 68;

pub type RsaField = ArrayVec<u8, RSA_MAX_BYTES>;
pub type EcCoordinate = ArrayVec<u8, EC_MAX_BYTES>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaKeySize {
    Rsa1024,
    Rsa1536,
    Rsa2048,
    Rsa3072,
    Rsa4096,
}

impl RsaKeySize {
    pub fn bits(self) -> u32 {
        match self {
            RsaKeySize::Rsa1024 => 1024,
            RsaKeySize::Rsa1536 => 1536,
            RsaKeySize::Rsa2048 => 2048,
            RsaKeySize::Rsa3072 => 3072,
            RsaKeySize::Rsa4096 => 4096,
        }
    }

    pub fn bytes(self) -> usize {
        (self.bits() / 8) as usize
    }

    pub fn words(self) -> usize {
        self.bytes() / 4
    }

    pub fn from_modulus_len(len: usize) -> SeResult<Self> {
        u32::try_from(len * 8)
            .map_err(|_| SeError::DRIVER_PKA_INVALID_RSA_SIZE)
            .and_then(Self::try_from)
    }
}

impl TryFrom<u32> for RsaKeySize {
    type Error = SeError;

    fn try_from(bits: u32) -> SeResult<Self> {
        match bits {
            1024 => Ok(RsaKeySize::Rsa1024),
            1536 => Ok(RsaKeySize::Rsa1536),
            2048 => Ok(RsaKeySize::Rsa2048),
            3072 => Ok(RsaKeySize::Rsa3072),
            4096 => Ok(RsaKeySize::Rsa4096),
            _ => Err(SeError::DRIVER_PKA_INVALID_RSA_SIZE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// RSA public key material of a keyslot, each field as long as the modulus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RsaKeyslotFields {
    pub exponent: RsaField,
    pub modulus: RsaField,
    pub m_prime: RsaField,
    pub r_square: RsaField,
}

impl Drop for RsaKeyslotFields {
    fn drop(&mut self) {
        self.exponent.as_mut_slice().zeroize();
        self.modulus.as_mut_slice().zeroize();
        self.m_prime.as_mut_slice().zeroize();
        self.r_square.as_mut_slice().zeroize();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    NistP256,
    NistP384,
    NistP521,
    /// Points are stored compressed, little-endian.
    Ed25519,
}

impl EcCurve {
    pub fn coordinate_len(self) -> usize {
        match self {
            EcCurve::NistP256 | EcCurve::Ed25519 => 32,
            EcCurve::NistP384 => 48,
            EcCurve::NistP521 => 66,
        }
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, EcCurve::Ed25519)
    }

    fn words(self) -> usize {
        self.coordinate_len().div_ceil(4)
    }
}

bitflags::bitflags! {
    /// Encoding of an EC point.
    pub struct EcPointFlags: u32 {
        /// Coordinates are little-endian byte strings.
        const LITTLE_ENDIAN = 1 << 0;
        /// X holds the compressed point and Y is unused.
        const COMPRESSED = 1 << 1;
        /// The point at infinity or otherwise not a valid point.
        const UNDEFINED = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcPoint {
    pub x: EcCoordinate,
    pub y: EcCoordinate,
    pub flags: EcPointFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PkaField {
    Exponent,
    Modulus,
    MPrime,
    RSquare,
    X,
    Y,
}

impl PkaField {
    fn value(self) -> FieldValue<u32, KeyslotAddr::Register> {
        match self {
            PkaField::Exponent => KeyslotAddr::FIELD::EXPONENT,
            PkaField::Modulus => KeyslotAddr::FIELD::MODULUS,
            PkaField::MPrime => KeyslotAddr::FIELD::M_PRIME,
            PkaField::RSquare => KeyslotAddr::FIELD::R_SQUARE,
            PkaField::X => KeyslotAddr::FIELD::X,
            PkaField::Y => KeyslotAddr::FIELD::Y,
        }
    }
}

impl<H: SeHal> Engine<'_, H> {
    pub(crate) fn check_pka_slot(&self, slot: u32) -> SeResult<()> {
        if self.id() != EngineId::Pka {
            Err(SeError::DRIVER_ENGINE_CONFIG_MISMATCH)?;
        }
        if slot >= PKA_KEYSLOT_COUNT {
            Err(SeError::DRIVER_PKA_KEYSLOT_INVALID_INDEX)?;
        }
        Ok(())
    }

    fn pka_select(&mut self, slot: u32, field: PkaField) {
        let addr = KeyslotAddr::SLOT.val(slot)
            + field.value()
            + KeyslotAddr::WORD.val(0)
            + KeyslotAddr::AUTO_INC::SET;
        self.write_reg(pka::KEYSLOT_ADDR, addr.value);
    }

    /// Write `words` words of little-endian `bytes`, zero padded.
    pub(crate) fn pka_write_field(
        &mut self,
        slot: u32,
        field: PkaField,
        bytes: &[u8],
        words: usize,
    ) {
        self.pka_select(slot, field);
        for i in 0..words {
            let mut word = [0u8; 4];
            for (j, b) in word.iter_mut().enumerate() {
                *b = bytes.get(4 * i + j).copied().unwrap_or(0);
            }
            self.write_reg(pka::KEYSLOT_DATA, u32::from_le_bytes(word));
        }
    }

    /// Read the first `out.len()` little-endian bytes of a field.
    pub(crate) fn pka_read_field(&mut self, slot: u32, field: PkaField, out: &mut [u8]) {
        self.pka_select(slot, field);
        for chunk in out.chunks_mut(4) {
            let word = self.read_reg(pka::KEYSLOT_DATA).to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }

    /// Write a big or little-endian value into a field of `len` bytes.
    pub(crate) fn pka_write_value(
        &mut self,
        slot: u32,
        field: PkaField,
        value: &[u8],
        len: usize,
        endian: Endianness,
    ) -> SeResult<()> {
        if value.len() > len || len > RSA_MAX_BYTES {
            Err(SeError::DRIVER_PKA_INVALID_FIELD_LEN)?;
        }
        let mut le = [0u8; RSA_MAX_BYTES];
        le[..value.len()].copy_from_slice(value);
        if endian == Endianness::Big {
            le[..value.len()].reverse();
        }
        self.pka_write_field(slot, field, &le[..len], len.div_ceil(4));
        le.zeroize();
        Ok(())
    }
}

fn read_rsa_field<H: SeHal>(
    engine: &mut Engine<'_, H>,
    slot: u32,
    field: PkaField,
    len: usize,
    endian: Endianness,
) -> RsaField {
    let mut buf = [0u8; RSA_MAX_BYTES];
    engine.pka_read_field(slot, field, &mut buf[..len]);
    let mut out = RsaField::new();
    out.extend(buf[..len].iter().copied());
    if endian == Endianness::Big {
        out.reverse();
    }
    out
}

/// Read the public key material of an RSA keyslot.
pub fn read_rsa_public<H: SeHal>(
    engine: &mut Engine<'_, H>,
    slot: u32,
    bits: u32,
    endian: Endianness,
) -> SeResult<RsaKeyslotFields> {
    let size = RsaKeySize::try_from(bits)?;
    engine.check_pka_slot(slot)?;
    let len = size.bytes();
    Ok(RsaKeyslotFields {
        exponent: read_rsa_field(engine, slot, PkaField::Exponent, len, endian),
        modulus: read_rsa_field(engine, slot, PkaField::Modulus, len, endian),
        m_prime: read_rsa_field(engine, slot, PkaField::MPrime, len, endian),
        r_square: read_rsa_field(engine, slot, PkaField::RSquare, len, endian),
    })
}

/// Provision an RSA keyslot. Fields shorter than the key are zero extended
/// at the most significant end; empty fields write zero.
pub fn write_rsa_keyslot<H: SeHal>(
    engine: &mut Engine<'_, H>,
    slot: u32,
    bits: u32,
    endian: Endianness,
    fields: &RsaKeyslotFields,
) -> SeResult<()> {
    let size = RsaKeySize::try_from(bits)?;
    engine.check_pka_slot(slot)?;
    let len = size.bytes();
    let all = [
        (PkaField::Exponent, &fields.exponent),
        (PkaField::Modulus, &fields.modulus),
        (PkaField::MPrime, &fields.m_prime),
        (PkaField::RSquare, &fields.r_square),
    ];
    if all.iter().any(|(_, value)| value.len() > len) {
        Err(SeError::DRIVER_PKA_INVALID_FIELD_LEN)?;
    }
    for (field, value) in all {
        engine.pka_write_value(slot, field, value, len, endian)?;
    }
    Ok(())
}

fn check_ec_flags(curve: EcCurve, flags: EcPointFlags) -> SeResult<()> {
    let ok = if curve.is_compressed() {
        flags == EcPointFlags::COMPRESSED | EcPointFlags::LITTLE_ENDIAN
    } else {
        (flags - EcPointFlags::LITTLE_ENDIAN).is_empty()
    };
    if !ok {
        Err(SeError::DRIVER_PKA_INVALID_EC_FLAGS)?;
    }
    Ok(())
}

fn endian_of(flags: EcPointFlags) -> Endianness {
    if flags.contains(EcPointFlags::LITTLE_ENDIAN) {
        Endianness::Little
    } else {
        Endianness::Big
    }
}

fn read_coordinate<H: SeHal>(
    engine: &mut Engine<'_, H>,
    slot: u32,
    field: PkaField,
    curve: EcCurve,
    endian: Endianness,
) -> EcCoordinate {
    let mut buf = [0u8; EC_MAX_BYTES];
    engine.pka_read_field(slot, field, &mut buf[..curve.words() * 4]);
    let mut out = EcCoordinate::new();
    out.extend(buf[..curve.coordinate_len()].iter().copied());
    if endian == Endianness::Big {
        out.reverse();
    }
    out
}

/// Read the point held in an EC keyslot.
///
/// The compressed point curve must be read with exactly `COMPRESSED |
/// LITTLE_ENDIAN`; its Y is returned zero filled.
pub fn read_ec_point<H: SeHal>(
    engine: &mut Engine<'_, H>,
    slot: u32,
    curve: EcCurve,
    flags: EcPointFlags,
) -> SeResult<EcPoint> {
    check_ec_flags(curve, flags)?;
    engine.check_pka_slot(slot)?;
    let endian = endian_of(flags);
    let x = read_coordinate(engine, slot, PkaField::X, curve, endian);
    let y = if curve.is_compressed() {
        core::iter::repeat(0).take(curve.coordinate_len()).collect()
    } else {
        read_coordinate(engine, slot, PkaField::Y, curve, endian)
    };
    Ok(EcPoint { x, y, flags })
}

pub fn write_ec_point<H: SeHal>(
    engine: &mut Engine<'_, H>,
    slot: u32,
    curve: EcCurve,
    point: &EcPoint,
) -> SeResult<()> {
    if point.flags.contains(EcPointFlags::UNDEFINED) {
        Err(SeError::DRIVER_PKA_UNDEFINED_EC_POINT)?;
    }
    check_ec_flags(curve, point.flags)?;
    engine.check_pka_slot(slot)?;
    let len = curve.coordinate_len();
    let y_ok = if curve.is_compressed() {
        point.y.iter().all(|b| *b == 0)
    } else {
        point.y.len() == len
    };
    if point.x.len() != len || !y_ok {
        Err(SeError::DRIVER_PKA_INVALID_FIELD_LEN)?;
    }
    // All checks are done; the slot is written only past this point.
    let endian = endian_of(point.flags);
    let padded = curve.words() * 4;
    engine.pka_write_value(slot, PkaField::X, &point.x, padded, endian)?;
    if !curve.is_compressed() {
        engine.pka_write_value(slot, PkaField::Y, &point.y, padded, endian)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use se_emu::SeEmulator;

    fn field(len: usize, seed: u8) -> RsaField {
        (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed)).collect()
    }

    #[test]
    fn test_rsa_sizes() {
        assert_eq!(RsaKeySize::from_modulus_len(256), Ok(RsaKeySize::Rsa2048));
        assert_eq!(RsaKeySize::from_modulus_len(192).unwrap().words(), 48);
        assert_eq!(
            RsaKeySize::try_from(2047),
            Err(SeError::DRIVER_PKA_INVALID_RSA_SIZE)
        );
    }

    #[test]
    fn test_rsa_roundtrip_little() {
        let mut emu = SeEmulator::new();
        let mut engine = Engine::lock(&mut emu, EngineId::Pka).unwrap();
        let fields = RsaKeyslotFields {
            exponent: field(128, 1),
            modulus: field(128, 2),
            m_prime: field(128, 3),
            r_square: field(128, 4),
        };
        write_rsa_keyslot(&mut engine, 2, 1024, Endianness::Little, &fields).unwrap();
        let read = read_rsa_public(&mut engine, 2, 1024, Endianness::Little).unwrap();
        assert_eq!(read, fields);
    }

    #[test]
    fn test_big_endian_is_byte_reversal() {
        let mut emu = SeEmulator::new();
        let mut engine = Engine::lock(&mut emu, EngineId::Pka).unwrap();
        let mut exponent = RsaField::new();
        exponent.try_extend_from_slice(&[0x01, 0x00, 0x01]).unwrap();
        let fields = RsaKeyslotFields {
            exponent,
            modulus: RsaField::new(),
            m_prime: RsaField::new(),
            r_square: RsaField::new(),
        };
        write_rsa_keyslot(&mut engine, 0, 2048, Endianness::Big, &fields).unwrap();
        let little = read_rsa_public(&mut engine, 0, 2048, Endianness::Little).unwrap();
        assert_eq!(&little.exponent[..4], &[0x01, 0x00, 0x01, 0x00]);
        let big = read_rsa_public(&mut engine, 0, 2048, Endianness::Big).unwrap();
        assert_eq!(&big.exponent[253..], &[0x01, 0x00, 0x01]);
        assert!(big.exponent[..253].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_rsa_copy_to_empty_slot_big() {
        let mut emu = SeEmulator::new();
        let mut engine = Engine::lock(&mut emu, EngineId::Pka).unwrap();
        let fields = RsaKeyslotFields {
            exponent: field(192, 9),
            modulus: field(192, 10),
            m_prime: field(192, 11),
            r_square: field(192, 12),
        };
        write_rsa_keyslot(&mut engine, 1, 1536, Endianness::Big, &fields).unwrap();
        let first = read_rsa_public(&mut engine, 1, 1536, Endianness::Big).unwrap();
        assert_eq!(first, fields);

        let empty = read_rsa_public(&mut engine, 3, 1536, Endianness::Big).unwrap();
        assert!(empty.modulus.iter().all(|b| *b == 0));
        write_rsa_keyslot(&mut engine, 3, 1536, Endianness::Big, &first).unwrap();
        let second = read_rsa_public(&mut engine, 3, 1536, Endianness::Big).unwrap();
        assert_eq!(second.exponent, first.exponent);
        assert_eq!(second.modulus, first.modulus);
        assert_eq!(second.m_prime, first.m_prime);
        assert_eq!(second.r_square, first.r_square);
        assert_eq!(
            read_rsa_public(&mut engine, 3, 1536, Endianness::Little).unwrap(),
            read_rsa_public(&mut engine, 1, 1536, Endianness::Little).unwrap()
        );
    }

    #[test]
    fn test_rsa_bad_args() {
        let mut emu = SeEmulator::new();
        let mut engine = Engine::lock(&mut emu, EngineId::Pka).unwrap();
        assert_eq!(
            read_rsa_public(&mut engine, 4, 2048, Endianness::Little).err(),
            Some(SeError::DRIVER_PKA_KEYSLOT_INVALID_INDEX)
        );
        assert_eq!(
            read_rsa_public(&mut engine, 0, 1000, Endianness::Little).err(),
            Some(SeError::DRIVER_PKA_INVALID_RSA_SIZE)
        );
        let mut fields = RsaKeyslotFields::default();
        fields.modulus = field(129, 0);
        assert_eq!(
            write_rsa_keyslot(&mut engine, 0, 1024, Endianness::Little, &fields),
            Err(SeError::DRIVER_PKA_INVALID_FIELD_LEN)
        );
    }

    #[test]
    fn test_ec_point_p521() {
        let mut emu = SeEmulator::new();
        let mut engine = Engine::lock(&mut emu, EngineId::Pka).unwrap();
        let point = EcPoint {
            x: (0..66).map(|i| i as u8 + 1).collect(),
            y: (0..66).map(|i| 0xff - i as u8).collect(),
            flags: EcPointFlags::empty(),
        };
        write_ec_point(&mut engine, 1, EcCurve::NistP521, &point).unwrap();
        let read =
            read_ec_point(&mut engine, 1, EcCurve::NistP521, EcPointFlags::empty()).unwrap();
        assert_eq!(read, point);
        let le = read_ec_point(
            &mut engine,
            1,
            EcCurve::NistP521,
            EcPointFlags::LITTLE_ENDIAN,
        )
        .unwrap();
        assert_eq!(le.x[0], 66);
        assert_eq!(le.x[65], 1);
    }

    #[test]
    fn test_ec_flags() {
        let mut emu = SeEmulator::new();
        let mut engine = Engine::lock(&mut emu, EngineId::Pka).unwrap();
        assert_eq!(
            read_ec_point(&mut engine, 0, EcCurve::NistP256, EcPointFlags::COMPRESSED).err(),
            Some(SeError::DRIVER_PKA_INVALID_EC_FLAGS)
        );
        assert_eq!(
            read_ec_point(&mut engine, 0, EcCurve::Ed25519, EcPointFlags::LITTLE_ENDIAN).err(),
            Some(SeError::DRIVER_PKA_INVALID_EC_FLAGS)
        );
        let undefined = EcPoint {
            x: EcCoordinate::new(),
            y: EcCoordinate::new(),
            flags: EcPointFlags::UNDEFINED,
        };
        assert_eq!(
            write_ec_point(&mut engine, 0, EcCurve::NistP256, &undefined),
            Err(SeError::DRIVER_PKA_UNDEFINED_EC_POINT)
        );
    }

    #[test]
    fn test_rejected_ec_write_leaves_slot() {
        let mut emu = SeEmulator::new();
        let mut engine = Engine::lock(&mut emu, EngineId::Pka).unwrap();
        let good = EcPoint {
            x: [0x11; 32].into_iter().collect(),
            y: [0x22; 32].into_iter().collect(),
            flags: EcPointFlags::empty(),
        };
        write_ec_point(&mut engine, 1, EcCurve::NistP256, &good).unwrap();

        let short_y = EcPoint {
            x: [0x99; 32].into_iter().collect(),
            y: [0x33; 31].into_iter().collect(),
            flags: EcPointFlags::empty(),
        };
        assert_eq!(
            write_ec_point(&mut engine, 1, EcCurve::NistP256, &short_y),
            Err(SeError::DRIVER_PKA_INVALID_FIELD_LEN)
        );
        let read =
            read_ec_point(&mut engine, 1, EcCurve::NistP256, EcPointFlags::empty()).unwrap();
        assert_eq!(read, good);

        let flags = EcPointFlags::COMPRESSED | EcPointFlags::LITTLE_ENDIAN;
        let ed = EcPoint {
            x: [0x44; 32].into_iter().collect(),
            y: EcCoordinate::new(),
            flags,
        };
        write_ec_point(&mut engine, 2, EcCurve::Ed25519, &ed).unwrap();
        let nonzero_y = EcPoint {
            x: [0x55; 32].into_iter().collect(),
            y: [0x01; 32].into_iter().collect(),
            flags,
        };
        assert_eq!(
            write_ec_point(&mut engine, 2, EcCurve::Ed25519, &nonzero_y),
            Err(SeError::DRIVER_PKA_INVALID_FIELD_LEN)
        );
        assert_eq!(
            read_ec_point(&mut engine, 2, EcCurve::Ed25519, flags).unwrap().x,
            ed.x
        );
    }

    #[test]
    fn test_ed25519_compressed() {
        let mut emu = SeEmulator::new();
        let mut engine = Engine::lock(&mut emu, EngineId::Pka).unwrap();
        let flags = EcPointFlags::COMPRESSED | EcPointFlags::LITTLE_ENDIAN;
        let point = EcPoint {
            x: (0..32).map(|i| i as u8 * 3).collect(),
            y: EcCoordinate::new(),
            flags,
        };
        write_ec_point(&mut engine, 3, EcCurve::Ed25519, &point).unwrap();
        let read = read_ec_point(&mut engine, 3, EcCurve::Ed25519, flags).unwrap();
        assert_eq!(read.x, point.x);
        assert_eq!(read.y.as_slice(), &[0u8; 32]);
    }
}
