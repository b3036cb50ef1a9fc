use bytes::{Buf, BufMut};

/// A fixed-width value with a big-endian (network order) wire layout.
pub trait Number: Copy + Send + Sync + std::fmt::Debug + 'static {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Decode from exactly [`Number::WIDTH`] bytes.
    fn decode(src: &[u8]) -> Self;

    /// Encode into the first [`Number::WIDTH`] bytes of `dst`.
    fn encode(self, dst: &mut [u8]);
}

macro_rules! impl_number {
    ($($ty:ty => $get:ident, $put:ident;)*) => {
        $(
            impl Number for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn decode(mut src: &[u8]) -> Self {
                    src.$get()
                }

                fn encode(self, mut dst: &mut [u8]) {
                    dst.$put(self)
                }
            }
        )*
    };
}

impl_number! {
    i8 => get_i8, put_i8;
    u8 => get_u8, put_u8;
    i16 => get_i16, put_i16;
    u16 => get_u16, put_u16;
    i32 => get_i32, put_i32;
    u32 => get_u32, put_u32;
    i64 => get_i64, put_i64;
    u64 => get_u64, put_u64;
    f32 => get_f32, put_f32;
    f64 => get_f64, put_f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded<N: Number>(value: N) -> Vec<u8> {
        let mut out = vec![0u8; N::WIDTH];
        value.encode(&mut out);
        out
    }

    #[test]
    fn widths() {
        assert_eq!(i8::WIDTH, 1);
        assert_eq!(i16::WIDTH, 2);
        assert_eq!(i32::WIDTH, 4);
        assert_eq!(f32::WIDTH, 4);
        assert_eq!(i64::WIDTH, 8);
        assert_eq!(f64::WIDTH, 8);
    }

    #[test]
    fn big_endian_layout() {
        assert_eq!(encoded(0x0102i16), [0x01, 0x02]);
        assert_eq!(encoded(42i32), [0x00, 0x00, 0x00, 0x2A]);
        assert_eq!(encoded(-1i64), [0xFF; 8]);
        assert_eq!(encoded(1.0f32), [0x3F, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn decode_reads_network_order() {
        assert_eq!(i32::decode(&[0x00, 0x00, 0x00, 0x2A]), 42);
        assert_eq!(u16::decode(&[0xFF, 0xFE]), 0xFFFE);
        assert_eq!(i8::decode(&[0x80]), -128);
        assert_eq!(f64::decode(&encoded(2.5f64)), 2.5);
    }

    #[test]
    fn encode_ignores_trailing_space() {
        let mut out = [0xAAu8; 6];
        7i32.encode(&mut out);
        assert_eq!(out, [0, 0, 0, 7, 0xAA, 0xAA]);
    }
}
