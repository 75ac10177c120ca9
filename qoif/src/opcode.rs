use crate::{consts::*, Pixel};

/// Operation kind selected by a tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpTag {
    Index,
    Diff,
    Luma,
    Run,
    Rgb,
    Rgba,
}

impl OpTag {
    /// Full-byte tags take precedence over the 2-bit tags they overlap with.
    #[inline]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            QOIF_OP_RGB => OpTag::Rgb,
            QOIF_OP_RGBA => OpTag::Rgba,
            _ => match byte & QOIF_MASK_2 {
                QOIF_OP_INDEX => OpTag::Index,
                QOIF_OP_DIFF => OpTag::Diff,
                QOIF_OP_LUMA => OpTag::Luma,
                _ => OpTag::Run,
            },
        }
    }

    /// Number of bytes following the tag byte.
    #[inline]
    pub const fn payload_len(self) -> usize {
        match self {
            OpTag::Index | OpTag::Diff | OpTag::Run => 0,
            OpTag::Luma => 1,
            OpTag::Rgb => 3,
            OpTag::Rgba => 4,
        }
    }
}

/// A single decoded operation of the stream body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Color array slot: 0..63
    Index(u8),
    /// Channel differences, each -2..1
    Diff { dr: i8, dg: i8, db: i8 },
    /// Green difference -32..31, red and blue relative to it -8..7
    Luma { dg: i8, dr_dg: i8, db_dg: i8 },
    /// Run-length: 1..62
    Run(u8),
    Rgb([u8; 3]),
    Rgba(Pixel),
}

impl Opcode {
    /// Longest encoded operation, QOIF_OP_RGBA.
    pub const MAX_LEN: usize = 5;

    #[inline]
    pub const fn tag(&self) -> OpTag {
        match self {
            Opcode::Index(_) => OpTag::Index,
            Opcode::Diff { .. } => OpTag::Diff,
            Opcode::Luma { .. } => OpTag::Luma,
            Opcode::Run(_) => OpTag::Run,
            Opcode::Rgb(_) => OpTag::Rgb,
            Opcode::Rgba(_) => OpTag::Rgba,
        }
    }

    /// Encoded size including the tag byte.
    #[inline]
    pub const fn len(&self) -> usize {
        1 + self.tag().payload_len()
    }

    /// Chooses the operation describing `pixel` relative to `prev`, given that it is neither a
    /// repeat nor a color array hit.
    #[inline]
    pub const fn for_delta(prev: Pixel, pixel: Pixel) -> Self {
        if pixel.a != prev.a {
            return Opcode::Rgba(pixel);
        }

        let dr = crate::utils::diff(pixel.r, prev.r);
        let dg = crate::utils::diff(pixel.g, prev.g);
        let db = crate::utils::diff(pixel.b, prev.b);

        if matches!((dr, dg, db), (-2..=1, -2..=1, -2..=1)) {
            return Opcode::Diff { dr, dg, db };
        }

        let dr_dg = dr.wrapping_sub(dg);
        let db_dg = db.wrapping_sub(dg);

        if matches!((dr_dg, dg, db_dg), (-8..=7, -32..=31, -8..=7)) {
            Opcode::Luma { dg, dr_dg, db_dg }
        } else {
            Opcode::Rgb(pixel.to_rgb())
        }
    }

    /// Writes the operation into `buf` and returns the number of bytes used.
    pub fn encode_into(&self, buf: &mut [u8; Self::MAX_LEN]) -> usize {
        match *self {
            Opcode::Index(index) => {
                buf[0] = QOIF_OP_INDEX | (index & 0b0011_1111);
            }
            Opcode::Diff { dr, dg, db } => {
                let mut b = QOIF_OP_DIFF;
                b |= ((dr + 2) as u8) << 4;
                b |= ((dg + 2) as u8) << 2;
                b |= (db + 2) as u8;
                buf[0] = b;
            }
            Opcode::Luma { dg, dr_dg, db_dg } => {
                buf[0] = QOIF_OP_LUMA | ((dg + 32) as u8);
                buf[1] = ((dr_dg + 8) as u8) << 4 | (db_dg + 8) as u8;
            }
            Opcode::Run(run) => {
                debug_assert!((1..=QOIF_MAX_RUN).contains(&run));
                buf[0] = QOIF_OP_RUN | (run - 1);
            }
            Opcode::Rgb([r, g, b]) => {
                buf[..4].copy_from_slice(&[QOIF_OP_RGB, r, g, b]);
            }
            Opcode::Rgba(Pixel { r, g, b, a }) => {
                buf[..5].copy_from_slice(&[QOIF_OP_RGBA, r, g, b, a]);
            }
        }

        self.len()
    }

    /// Parses an operation from its tag byte and the payload bytes that follow it.
    ///
    /// `payload` must hold at least [`OpTag::payload_len`] bytes for the tag.
    pub fn parse(byte: u8, payload: &[u8]) -> Self {
        match OpTag::from_byte(byte) {
            OpTag::Index => Opcode::Index(byte & 0b0011_1111),
            OpTag::Diff => Opcode::Diff {
                dr: ((byte >> 4) & 0b11) as i8 - 2,
                dg: ((byte >> 2) & 0b11) as i8 - 2,
                db: (byte & 0b11) as i8 - 2,
            },
            OpTag::Luma => Opcode::Luma {
                dg: (byte & 0b0011_1111) as i8 - 32,
                dr_dg: (payload[0] >> 4) as i8 - 8,
                db_dg: (payload[0] & 0b1111) as i8 - 8,
            },
            OpTag::Run => Opcode::Run((byte & 0b0011_1111) + 1),
            OpTag::Rgb => Opcode::Rgb([payload[0], payload[1], payload[2]]),
            OpTag::Rgba => Opcode::Rgba(Pixel::new(payload[0], payload[1], payload[2], payload[3])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(op: Opcode) -> Vec<u8> {
        let mut buf = [0; Opcode::MAX_LEN];
        let len = op.encode_into(&mut buf);
        buf[..len].to_vec()
    }

    #[test]
    fn full_byte_tags_win() {
        assert_eq!(OpTag::from_byte(0xFE), OpTag::Rgb);
        assert_eq!(OpTag::from_byte(0xFF), OpTag::Rgba);
        assert_eq!(OpTag::from_byte(0xFD), OpTag::Run);
        assert_eq!(OpTag::from_byte(0xC0), OpTag::Run);
        assert_eq!(OpTag::from_byte(0x3F), OpTag::Index);
        assert_eq!(OpTag::from_byte(0x40), OpTag::Diff);
        assert_eq!(OpTag::from_byte(0xBF), OpTag::Luma);
    }

    #[test]
    fn encoded_lengths() {
        assert_eq!(encoded(Opcode::Index(63)), [0x3F]);
        assert_eq!(encoded(Opcode::Run(62)), [0xC0 | 61]);
        assert_eq!(encoded(Opcode::Run(1)), [0xC0]);
        assert_eq!(encoded(Opcode::Rgb([1, 2, 3])), [0xFE, 1, 2, 3]);
        assert_eq!(
            encoded(Opcode::Rgba(Pixel::new(1, 2, 3, 4))),
            [0xFF, 1, 2, 3, 4]
        );
    }

    #[test]
    fn diff_bias() {
        // dr = 1, dg = 0, db = -1 -> 3, 2, 1
        assert_eq!(
            encoded(Opcode::Diff { dr: 1, dg: 0, db: -1 }),
            [0b01_11_10_01]
        );
        assert_eq!(
            Opcode::parse(0b01_11_10_01, &[]),
            Opcode::Diff { dr: 1, dg: 0, db: -1 }
        );
    }

    #[test]
    fn luma_bias() {
        let op = Opcode::Luma {
            dg: -32,
            dr_dg: 7,
            db_dg: -8,
        };
        let bytes = encoded(op);
        assert_eq!(bytes, [0x80, 0xF0]);
        assert_eq!(Opcode::parse(bytes[0], &bytes[1..]), op);
    }

    #[test]
    fn selection_priority() {
        let prev = Pixel::new(10, 10, 10, 255);

        assert_eq!(
            Opcode::for_delta(prev, Pixel::new(11, 10, 9, 255)),
            Opcode::Diff { dr: 1, dg: 0, db: -1 }
        );
        assert_eq!(
            Opcode::for_delta(prev, Pixel::new(20, 15, 12, 255)),
            Opcode::Luma {
                dg: 5,
                dr_dg: 5,
                db_dg: -3
            }
        );
        assert_eq!(
            Opcode::for_delta(prev, Pixel::new(200, 10, 10, 255)),
            Opcode::Rgb([200, 10, 10])
        );
        // Alpha change always forces a full pixel, even for tiny deltas.
        assert_eq!(
            Opcode::for_delta(prev, Pixel::new(10, 10, 10, 254)),
            Opcode::Rgba(Pixel::new(10, 10, 10, 254))
        );
    }

    #[test]
    fn selection_wraps_around() {
        let prev = Pixel::new(255, 0, 255, 255);
        assert_eq!(
            Opcode::for_delta(prev, Pixel::new(0, 255, 0, 255)),
            Opcode::Diff { dr: 1, dg: -1, db: 1 }
        );
    }
}
