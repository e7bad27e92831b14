use std::io::Read;

use crate::error::{Error, Result};
use crate::reader::Reader;

/// Width in bits of the fast-path look-up table index.
const LUT_BITS: i32 = 8;
const MAX_CODE_LENGTH: usize = 16;
pub const MAX_N_CODES: usize = 256;

/// One decoded Huffman codebook.
///
/// `lut` is indexed by the next 8 bits of entropy data; a non-zero slot packs
/// `(decoded value << 8) | (code length + 1)`. Codes longer than 8 bits fall
/// through to the canonical `min_codes`/`max_codes`/`vals_indices` arrays,
/// indexed by code length minus one, with -1 marking lengths that have no
/// codes.
#[derive(Clone)]
pub struct HuffmanTable {
    n_codes: i32,
    lut: [u16; 1 << LUT_BITS],
    vals: [u8; MAX_N_CODES],
    min_codes: [i32; MAX_CODE_LENGTH],
    max_codes: [i32; MAX_CODE_LENGTH],
    vals_indices: [i32; MAX_CODE_LENGTH],
}

impl HuffmanTable {
    /// A table slot that no DHT segment has filled yet. Decoding against it
    /// fails.
    pub fn empty() -> HuffmanTable {
        HuffmanTable {
            n_codes: 0,
            lut: [0; 1 << LUT_BITS],
            vals: [0; MAX_N_CODES],
            min_codes: [-1; MAX_CODE_LENGTH],
            max_codes: [-1; MAX_CODE_LENGTH],
            vals_indices: [-1; MAX_CODE_LENGTH],
        }
    }

    /// Builds a table from the DHT counts `L[1..16]` and the value list laid
    /// out by increasing code length. Codes are assigned canonically
    /// (section C.2, figure C.2).
    pub fn new(counts: &[u8; 16], values: &[u8]) -> Result<HuffmanTable> {
        debug_assert_eq!(
            counts.iter().map(|&c| usize::from(c)).sum::<usize>(),
            values.len()
        );
        let mut table = HuffmanTable {
            n_codes: values.len() as i32,
            ..HuffmanTable::empty()
        };
        table.vals[..values.len()].copy_from_slice(values);

        // Fill the look-up table for codes no longer than 8 bits. A code of
        // length 1+i occupies every LUT slot whose top bits match it.
        let mut x = 0usize;
        let mut code = 0u32;
        for i in 0..LUT_BITS as u32 {
            code <<= 1;
            for _ in 0..counts[i as usize] {
                let base = (code << (7 - i)) as u8;
                let lut_value = u16::from(table.vals[x]) << 8 | (2 + i as u16);
                for k in 0..1u16 << (7 - i) {
                    table.lut[usize::from(base | k as u8)] = lut_value;
                }
                code += 1;
                x += 1;
            }
        }

        // Derive min_codes, max_codes, and vals_indices.
        let mut c = 0i32;
        let mut index = 0i32;
        for (i, &n) in counts.iter().enumerate() {
            let n = i32::from(n);
            if n == 0 {
                table.min_codes[i] = -1;
                table.max_codes[i] = -1;
                table.vals_indices[i] = -1;
            } else {
                table.min_codes[i] = c;
                table.max_codes[i] = c + n - 1;
                table.vals_indices[i] = index;
                c += n;
                index += n;
            }
            if c > 1 << (i + 1) {
                return Err(Error::BadHuffmanTable("bad code length distribution"));
            }
            c <<= 1;
        }
        Ok(table)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.n_codes == 0
    }
}

/// Decodes one Huffman symbol (section F.2.2.3, figure F.16).
///
/// The fast path peeks 8 bits through the LUT. Refilling the accumulator for
/// the peek may run into a marker (`MissingFF00`) or the end of the stream
/// (`ShortHuffmanData`); both are handled locally by re-aligning the byte
/// window and taking the bit-at-a-time slow path instead.
pub fn decode<R: Read>(r: &mut Reader<R>, table: &HuffmanTable) -> Result<u8> {
    if table.is_empty() {
        return Err(Error::BadHuffmanTable("uninitialized table"));
    }
    if r.bit_count() < LUT_BITS {
        match r.ensure_bits(LUT_BITS) {
            Ok(()) => {}
            Err(Error::MissingFF00) | Err(Error::ShortHuffmanData) => {
                if r.n_unreadable() != 0 {
                    r.unread_stuffed_byte();
                }
                return decode_slow(r, table);
            }
            Err(e) => return Err(e),
        }
    }
    let v = table.lut[r.peek_lut_index()];
    if v != 0 {
        r.consume_bits(i32::from(v & 0xff) - 1);
        return Ok((v >> 8) as u8);
    }
    decode_slow(r, table)
}

fn decode_slow<R: Read>(r: &mut Reader<R>, table: &HuffmanTable) -> Result<u8> {
    let mut code = 0i32;
    for i in 0..MAX_CODE_LENGTH {
        if r.decode_bit()? {
            code |= 1;
        }
        if code <= table.max_codes[i] {
            let index = table.vals_indices[i] + code - table.min_codes[i];
            return Ok(table.vals[index as usize]);
        }
        code <<= 1;
    }
    Err(Error::BadHuffmanCode)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{decode, HuffmanTable};
    use crate::error::Error;
    use crate::reader::Reader;

    fn reader(data: &[u8]) -> Reader<Cursor<Vec<u8>>> {
        Reader::new(Cursor::new(data.to_vec()))
    }

    // Canonical codes for L = [0, 2, 1, ...]: "00" -> 5, "01" -> 6,
    // "100" -> 7.
    fn short_table() -> HuffmanTable {
        let mut counts = [0u8; 16];
        counts[1] = 2;
        counts[2] = 1;
        HuffmanTable::new(&counts, &[5, 6, 7]).unwrap()
    }

    #[test]
    fn decodes_assigned_codes_to_their_values() {
        let table = short_table();
        // "01" "100" "00" packed MSB-first: 0110 0001 padded with ones.
        let mut r = reader(&[0b0110_0001, 0xff, 0x00]);
        assert_eq!(decode(&mut r, &table).unwrap(), 6);
        assert_eq!(decode(&mut r, &table).unwrap(), 7);
        assert_eq!(decode(&mut r, &table).unwrap(), 5);
    }

    #[test]
    fn long_codes_take_the_slow_path() {
        // One 12-bit code: "000000000000".
        let mut counts = [0u8; 16];
        counts[11] = 1;
        let table = HuffmanTable::new(&counts, &[42]).unwrap();
        let mut r = reader(&[0x00, 0x00]);
        assert_eq!(decode(&mut r, &table).unwrap(), 42);
        // Exactly 12 bits were consumed.
        assert_eq!(r.bit_count(), 4);
    }

    #[test]
    fn unassigned_prefix_is_a_bad_code() {
        let table = short_table();
        // "11..." matches no assigned code at any length.
        let mut r = reader(&[0xff, 0x00, 0xff, 0x00]);
        assert!(matches!(decode(&mut r, &table), Err(Error::BadHuffmanCode)));
    }

    #[test]
    fn oversubscribed_lengths_are_rejected() {
        let mut counts = [0u8; 16];
        counts[0] = 3; // three codes of length one cannot exist
        assert!(matches!(
            HuffmanTable::new(&counts, &[1, 2, 3]),
            Err(Error::BadHuffmanTable(_))
        ));
    }

    #[test]
    fn symbols_straddling_a_marker_use_the_slow_path() {
        let table = short_table();
        // After the first symbol only six bits remain and the next bytes are
        // a marker, so the second decode cannot refill to 8 bits. It must
        // fall back to the slow path and still decode "01" from the
        // accumulator.
        let mut r = reader(&[0b0101_1111, 0xff, 0xd9]);
        assert_eq!(decode(&mut r, &table).unwrap(), 6);
        assert_eq!(decode(&mut r, &table).unwrap(), 6);
    }
}
