/*++

Licensed under the Apache-2.0 license.

File Name:

    array.rs

Abstract:

    File contains word array definitions used to move key, IV and MAC
    material through engine registers. Words are little-endian: byte 0 of
    the byte view is the least significant byte of word 0.

--*/

macro_rules! le_array4 {
    ($dim: literal) => {
        paste::paste! {
             pub const [<LE_ARRAY_4X $dim _BYTE_SIZE>]: usize = $dim * core::mem::size_of::<u32>();
             pub const [<LE_ARRAY_4X $dim _WORD_SIZE>]: usize = $dim;

             #[derive(Debug, Default, Copy, Clone, Eq, PartialEq, zeroize::Zeroize)]
             pub struct [<LEArray4x $dim>](pub [u32; [<LE_ARRAY_4X $dim _WORD_SIZE>]]);

             impl [<LEArray4x $dim>] {
                 pub const fn new(words: [u32; [<LE_ARRAY_4X $dim _WORD_SIZE>]]) -> Self {
                     Self(words)
                 }

                 /// Build from up to the full byte size of `bytes`; missing
                 /// bytes are zero.
                 pub fn from_le_slice(bytes: &[u8]) -> Self {
                     let mut result = Self::default();
                     for (i, b) in bytes.iter().take([<LE_ARRAY_4X $dim _BYTE_SIZE>]).enumerate() {
                         result.0[i / 4] |= (*b as u32) << ((i % 4) * 8);
                     }
                     result
                 }

                 pub fn to_le_bytes(&self) -> [u8; [<LE_ARRAY_4X $dim _BYTE_SIZE>]] {
                     let mut result = [0u8; [<LE_ARRAY_4X $dim _BYTE_SIZE>]];
                     for (chunk, word) in result.chunks_exact_mut(4).zip(self.0.iter()) {
                         chunk.copy_from_slice(&word.to_le_bytes());
                     }
                     result
                 }
             }

             impl From<[u8; [<LE_ARRAY_4X $dim _BYTE_SIZE>]]> for [<LEArray4x $dim>] {
                 fn from(value: [u8; [<LE_ARRAY_4X $dim _BYTE_SIZE>]]) -> Self {
                     Self::from_le_slice(&value)
                 }
             }

             impl<'a> From<&'a [u8; [<LE_ARRAY_4X $dim _BYTE_SIZE>]]> for [<LEArray4x $dim>] {
                 fn from(value: &'a [u8; [<LE_ARRAY_4X $dim _BYTE_SIZE>]]) -> Self {
                     Self::from_le_slice(value)
                 }
             }

             impl From<[<LEArray4x $dim>]> for [u8; [<LE_ARRAY_4X $dim _BYTE_SIZE>]] {
                 fn from(value: [<LEArray4x $dim>]) -> Self {
                     value.to_le_bytes()
                 }
             }
        }
    };
}

le_array4!(4);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_le_byte_order() {
        let a = LEArray4x4::from([
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
            0x0f, 0x10,
        ]);
        assert_eq!(a.0, [0x04030201, 0x08070605, 0x0c0b0a09, 0x100f0e0d]);
        assert_eq!(<[u8; 16]>::from(a)[15], 0x10);
    }

    #[test]
    fn test_short_slice_zero_pads() {
        let a = LEArray4x4::from_le_slice(&[0xff; 6]);
        assert_eq!(a.0[0], 0xffff_ffff);
        assert_eq!(a.0[1], 0x0000_ffff);
        assert_eq!(a.0[2..], [0; 2]);
    }
}
