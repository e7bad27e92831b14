use std::io::Read;

use byteorder::{BigEndian, ByteOrder};
use tracing::{debug, trace, warn};

use crate::color::{self, Plane};
use crate::error::{Error, Result};
use crate::huffman::{self, HuffmanTable};
use crate::idct::dequantize_and_idct_block;
use crate::marker::Marker;
use crate::parser::{
    parse_app0, parse_app1, parse_app14, parse_dht, parse_dqt, parse_dri, parse_sof, parse_sos,
    FrameInfo, ScanInfo,
};
use crate::reader::Reader;
use crate::{PixelSink, MAX_COMPONENTS};

/// One 8x8 coefficient block in natural (row-major) order.
pub(crate) type Block = [i32; 64];

/// Maps a zig-zag index to its natural (row-major) position.
pub(crate) static UNZIG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// JPEG decoder. Owns every piece of mutable decode state: the byte window
/// and bit accumulator, the Huffman and quantization tables, the per-image
/// sample planes, and the progressive coefficient store.
pub struct Decoder<R> {
    reader: Reader<R>,
    frame: Option<FrameInfo>,
    dc_huffman_tables: [HuffmanTable; 4],
    ac_huffman_tables: [HuffmanTable; 4],
    quantization_tables: [[u16; 64]; 4],
    restart_interval: u16,
    is_jfif: bool,
    adobe_transform: Option<u8>,
    /// End-of-band run shared between blocks of a progressive AC scan.
    eob_run: u16,
    planes: Option<Vec<Plane>>,
    /// Per-component coefficient blocks, retained across progressive scans.
    progressive_coefficients: Vec<Vec<Block>>,
    warned_extraneous_data: bool,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Decoder<R> {
        Decoder {
            reader: Reader::new(reader),
            frame: None,
            dc_huffman_tables: std::array::from_fn(|_| HuffmanTable::empty()),
            ac_huffman_tables: std::array::from_fn(|_| HuffmanTable::empty()),
            quantization_tables: [[0; 64]; 4],
            restart_interval: 0,
            is_jfif: false,
            adobe_transform: None,
            eob_run: 0,
            planes: None,
            progressive_coefficients: vec![],
            warned_extraneous_data: false,
        }
    }

    /// Decodes the image and hands the result to `sink`.
    ///
    /// With `metadata_only` set, decoding stops after the first SOF segment
    /// (once the color model is decidable) without constructing any pixels;
    /// the JFIF resolution, if present, is still delivered.
    pub fn decode<S: PixelSink>(&mut self, sink: &mut S, metadata_only: bool) -> Result<()> {
        let mut tmp = [0u8; 2];
        self.reader.read_full(&mut tmp)?;
        if tmp != [0xff, 0xd8] {
            return Err(Error::MissingSoi);
        }
        loop {
            self.reader.read_full(&mut tmp)?;
            // The JPEG spec does not allow extraneous data between marker
            // segments, but images in the wild carry it, so slide until a
            // 0xff byte comes up.
            while tmp[0] != 0xff {
                if !self.warned_extraneous_data {
                    self.warned_extraneous_data = true;
                    warn!("extraneous data before marker segment");
                }
                tmp[0] = tmp[1];
                tmp[1] = self.reader.read_byte()?;
            }
            let mut marker_byte = tmp[1];
            if marker_byte == 0x00 {
                // "\xff\x00" here is also treated as extraneous data.
                continue;
            }
            // Section B.1.1.2: any marker may be preceded by fill bytes.
            while marker_byte == 0xff {
                marker_byte = self.reader.read_byte()?;
            }
            let marker = match Marker::from_u8(marker_byte) {
                Some(marker) => marker,
                None => return Err(Error::UnknownMarker(marker_byte)),
            };
            if marker == Marker::EOI {
                break;
            }
            if let Marker::RST(_) = marker {
                // RSTn markers are only expected inside entropy-coded data;
                // a stray one between segments is dropped.
                continue;
            }

            self.reader.read_full(&mut tmp)?;
            let length = i32::from(BigEndian::read_u16(&tmp)) - 2;
            if length < 0 {
                return Err(Error::ShortSegment("segment length too short"));
            }
            let length = length as usize;
            trace!(?marker, length, "marker segment");

            match marker {
                Marker::SOF(n @ (0 | 1 | 2)) => {
                    if self.frame.is_some() {
                        return Err(Error::MultipleSof);
                    }
                    let frame = parse_sof(&mut self.reader, n, length)?;
                    debug!(
                        width = frame.width,
                        height = frame.height,
                        components = frame.components.len(),
                        progressive = frame.is_progressive,
                        subsampling = ?frame.subsampling,
                        "frame header"
                    );
                    self.progressive_coefficients = vec![vec![]; frame.components.len()];
                    self.frame = Some(frame);
                    if metadata_only && self.is_jfif {
                        return Ok(());
                    }
                }
                Marker::SOF(3) | Marker::SOF(11) => {
                    return Err(Error::UnsupportedMode("lossless coding"))
                }
                Marker::SOF(5..=7) | Marker::SOF(13..=15) | Marker::DHP | Marker::EXP => {
                    return Err(Error::UnsupportedMode("hierarchical coding"))
                }
                Marker::SOF(_) | Marker::DAC => {
                    return Err(Error::UnsupportedMode("arithmetic coding"))
                }
                Marker::DNL => return Err(Error::UnsupportedMode("DNL")),
                Marker::DHT => {
                    if metadata_only {
                        self.reader.skip(length)?;
                    } else {
                        let baseline = self.frame.as_ref().is_some_and(|f| f.is_baseline);
                        parse_dht(
                            &mut self.reader,
                            length,
                            baseline,
                            &mut self.dc_huffman_tables,
                            &mut self.ac_huffman_tables,
                        )?;
                    }
                }
                Marker::DQT => {
                    if metadata_only {
                        self.reader.skip(length)?;
                    } else {
                        parse_dqt(&mut self.reader, length, &mut self.quantization_tables)?;
                    }
                }
                Marker::DRI => {
                    if metadata_only {
                        self.reader.skip(length)?;
                    } else {
                        self.restart_interval = parse_dri(&mut self.reader, length)?;
                    }
                }
                Marker::SOS => {
                    if metadata_only {
                        return Ok(());
                    }
                    let frame = self.frame.as_ref().ok_or(Error::MissingSof)?;
                    let scan = parse_sos(&mut self.reader, frame, length)?;
                    debug!(
                        components = scan.components.len(),
                        zig_start = scan.zig_start,
                        zig_end = scan.zig_end,
                        ah = scan.approximation_high,
                        al = scan.approximation_low,
                        "scan header"
                    );
                    self.decode_scan(&scan)?;
                }
                Marker::APP(0) => {
                    let app0 = parse_app0(&mut self.reader, length)?;
                    self.is_jfif |= app0.is_jfif;
                    if let Some((horizontal, vertical)) = app0.resolution {
                        sink.set_resolution(horizontal, vertical);
                    }
                }
                Marker::APP(1) => {
                    if let Some(profile) = parse_app1(&mut self.reader, length)? {
                        sink.set_exif_profile(profile);
                    }
                }
                Marker::APP(14) => {
                    if let Some(transform) = parse_app14(&mut self.reader, length)? {
                        self.adobe_transform = Some(transform);
                    }
                }
                Marker::APP(_) | Marker::COM => self.reader.skip(length)?,
                Marker::TEM | Marker::RES => return Err(Error::UnknownMarker(marker_byte)),
                Marker::JPG | Marker::JPGn(_) => {
                    return Err(Error::UnsupportedMode("JPEG extensions"))
                }
                // A second SOI cannot start a segment.
                Marker::SOI => return Err(Error::UnknownMarker(marker_byte)),
                Marker::EOI | Marker::RST(_) => unreachable!(),
            }
        }

        let frame = self.frame.take().ok_or(Error::MissingSof)?;
        let mut planes = self.planes.take().ok_or(Error::MissingSos)?;
        if frame.is_progressive {
            self.reconstruct_progressive_image(&frame, &mut planes)?;
        }
        let model = color::choose_color_model(&frame, self.is_jfif, self.adobe_transform)?;
        debug!(?model, "converting sample planes");
        let rgba = color::planes_to_rgba(model, &frame, &planes);
        sink.set_pixels(u32::from(frame.width), u32::from(frame.height), rgba);
        Ok(())
    }

    /// Decodes one entropy-coded scan into coefficient blocks, reconstructing
    /// baseline blocks on the fly and accumulating progressive ones.
    fn decode_scan(&mut self, scan: &ScanInfo) -> Result<()> {
        let frame = self.frame.clone().expect("scan without frame");
        let width = i32::from(frame.width);
        let height = i32::from(frame.height);
        let h0 = i32::from(frame.components[0].horizontal_sampling_factor);
        let v0 = i32::from(frame.components[0].vertical_sampling_factor);
        let mxx = (width + 8 * h0 - 1) / (8 * h0);
        let myy = (height + 8 * v0 - 1) / (8 * v0);
        if self.planes.is_none() {
            self.planes = Some(make_planes(&frame, mxx, myy));
        }
        if frame.is_progressive {
            for sc in &scan.components {
                let comp = &frame.components[sc.component_index];
                let blocks = mxx
                    * myy
                    * i32::from(comp.horizontal_sampling_factor)
                    * i32::from(comp.vertical_sampling_factor);
                let store = &mut self.progressive_coefficients[sc.component_index];
                if store.is_empty() {
                    *store = vec![[0; 64]; blocks as usize];
                }
            }
        }

        self.reader.reset_bits();
        let is_interleaved = scan.components.len() > 1;
        let al = scan.approximation_low;
        let mut dc_predictors = [0i32; MAX_COMPONENTS];
        let mut block_count = 0i32;
        let mut mcu = 0i32;
        let mut expected_rst = 0u8;
        for my in 0..myy {
            for mx in 0..mxx {
                for sc in &scan.components {
                    let comp = &frame.components[sc.component_index];
                    let hi = i32::from(comp.horizontal_sampling_factor);
                    let vi = i32::from(comp.vertical_sampling_factor);
                    for j in 0..hi * vi {
                        let (bx, by);
                        let mut visible = true;
                        if is_interleaved {
                            // Interleaved scans visit the hi*vi blocks of a
                            // component tile in row-major order within each
                            // MCU.
                            bx = hi * mx + j % hi;
                            by = vi * my + j / hi;
                        } else {
                            // Non-interleaved scans sweep the component's
                            // blocks left to right, top to bottom. Positions
                            // past the right image edge still consume their
                            // entropy symbols; only their samples go unused.
                            let q = mxx * hi;
                            bx = block_count % q;
                            by = block_count / q;
                            block_count += 1;
                            if bx * 8 >= width || by * 8 >= height {
                                visible = false;
                            }
                        }

                        let block_index = (by * mxx * hi + bx) as usize;
                        let mut b = if frame.is_progressive {
                            self.progressive_coefficients[sc.component_index][block_index]
                        } else {
                            [0; 64]
                        };
                        if scan.approximation_high != 0 {
                            refine(
                                &mut self.reader,
                                &self.ac_huffman_tables[sc.ac_table_index],
                                &mut b,
                                scan.zig_start,
                                scan.zig_end,
                                1 << al,
                                &mut self.eob_run,
                            )?;
                        } else {
                            decode_block(
                                &mut self.reader,
                                &self.dc_huffman_tables[sc.dc_table_index],
                                &self.ac_huffman_tables[sc.ac_table_index],
                                &mut b,
                                scan.zig_start,
                                scan.zig_end,
                                al,
                                &mut dc_predictors[sc.component_index],
                                &mut self.eob_run,
                            )?;
                        }
                        if frame.is_progressive {
                            // Keep the coefficients for later scans;
                            // dequantization and the IDCT wait for the final
                            // reconstruction pass.
                            self.progressive_coefficients[sc.component_index][block_index] = b;
                        } else if visible {
                            self.reconstruct_block(&frame, &b, bx, by, sc.component_index);
                        }
                    }
                }

                mcu += 1;
                if self.restart_interval > 0
                    && mcu % i32::from(self.restart_interval) == 0
                    && mcu < mxx * myy
                {
                    // Section F.2.1.3.1: expect the next RST marker in cyclic
                    // order, then restart the entropy decoder.
                    let mut tmp = [0u8; 2];
                    self.reader.read_full(&mut tmp)?;
                    if tmp[0] != 0xff || Marker::from_u8(tmp[1]) != Some(Marker::RST(expected_rst))
                    {
                        return Err(Error::BadRestart);
                    }
                    expected_rst = (expected_rst + 1) % 8;
                    self.reader.reset_bits();
                    dc_predictors = [0; MAX_COMPONENTS];
                    self.eob_run = 0;
                }
            }
        }
        Ok(())
    }

    /// Dequantizes and inverts every accumulated block once all progressive
    /// scans have been read.
    fn reconstruct_progressive_image(
        &mut self,
        frame: &FrameInfo,
        planes: &mut [Plane],
    ) -> Result<()> {
        let width = i32::from(frame.width);
        let h0 = i32::from(frame.components[0].horizontal_sampling_factor);
        let v0 = i32::from(frame.components[0].vertical_sampling_factor);
        let mxx = (width + 8 * h0 - 1) / (8 * h0);
        let myy = (i32::from(frame.height) + 8 * v0 - 1) / (8 * v0);
        debug!("reconstructing progressive image");
        for (i, comp) in frame.components.iter().enumerate() {
            let store = std::mem::take(&mut self.progressive_coefficients[i]);
            if store.is_empty() {
                // The component never appeared in a scan.
                continue;
            }
            let hi = i32::from(comp.horizontal_sampling_factor);
            let vi = i32::from(comp.vertical_sampling_factor);
            for by in 0..myy * vi {
                for bx in 0..mxx * hi {
                    let b = &store[(by * mxx * hi + bx) as usize];
                    let quantization_table =
                        &self.quantization_tables[comp.quantization_table_index];
                    let plane = &mut planes[i];
                    let offset = (by * 8) as usize * plane.stride + (bx * 8) as usize;
                    dequantize_and_idct_block(
                        b,
                        quantization_table,
                        plane.stride,
                        &mut plane.data[offset..],
                    );
                }
            }
        }
        Ok(())
    }

    fn reconstruct_block(
        &mut self,
        frame: &FrameInfo,
        b: &Block,
        bx: i32,
        by: i32,
        component_index: usize,
    ) {
        let comp = &frame.components[component_index];
        let quantization_table = &self.quantization_tables[comp.quantization_table_index];
        let plane = &mut self.planes.as_mut().expect("planes not allocated")[component_index];
        let offset = (by * 8) as usize * plane.stride + (bx * 8) as usize;
        dequantize_and_idct_block(b, quantization_table, plane.stride, &mut plane.data[offset..]);
    }
}

fn make_planes(frame: &FrameInfo, mxx: i32, myy: i32) -> Vec<Plane> {
    frame
        .components
        .iter()
        .map(|comp| {
            let stride = (mxx * i32::from(comp.horizontal_sampling_factor) * 8) as usize;
            let rows = (myy * i32::from(comp.vertical_sampling_factor) * 8) as usize;
            Plane {
                data: vec![0; stride * rows],
                stride,
            }
        })
        .collect()
}

/// Decodes one block of a baseline scan or of a progressive first pass
/// (sections F.2.2.1, F.2.2.2, G.1.2.1 and G.1.2.2).
#[allow(clippy::too_many_arguments)]
fn decode_block<R: Read>(
    reader: &mut Reader<R>,
    dc_table: &HuffmanTable,
    ac_table: &HuffmanTable,
    b: &mut Block,
    zig_start: i32,
    zig_end: i32,
    al: u32,
    dc_predictor: &mut i32,
    eob_run: &mut u16,
) -> Result<()> {
    let mut zig = zig_start;
    if zig == 0 {
        zig = 1;
        // Figure F.12: the DC coefficient is the running predictor plus a
        // sign-extended delta.
        let value = huffman::decode(reader, dc_table)?;
        if value > 16 {
            return Err(Error::ExcessiveDc);
        }
        let dc_delta = reader.receive_extend(value)?;
        *dc_predictor = dc_predictor.wrapping_add(dc_delta);
        b[0] = dc_predictor.wrapping_shl(al);
    }

    if zig <= zig_end && *eob_run > 0 {
        // This block falls inside an end-of-band run: its whole band is
        // zero.
        *eob_run -= 1;
        return Ok(());
    }
    while zig <= zig_end {
        let value = huffman::decode(reader, ac_table)?;
        let val0 = value >> 4;
        let val1 = value & 0x0f;
        if val1 != 0 {
            zig += i32::from(val0);
            if zig > zig_end {
                break;
            }
            let ac = reader.receive_extend(val1)?;
            b[UNZIG[zig as usize]] = ac.wrapping_shl(al);
        } else {
            if val0 < 0x0f {
                *eob_run = 1 << val0;
                if val0 != 0 {
                    *eob_run |= reader.decode_bits(i32::from(val0))? as u16;
                }
                // The run includes the current block.
                *eob_run -= 1;
                break;
            }
            zig += 0x0f;
        }
        zig += 1;
    }
    Ok(())
}

/// Refines the coefficients of one block by a single successive-approximation
/// bit (section G.1.2.3).
fn refine<R: Read>(
    reader: &mut Reader<R>,
    ac_table: &HuffmanTable,
    b: &mut Block,
    zig_start: i32,
    zig_end: i32,
    delta: i32,
    eob_run: &mut u16,
) -> Result<()> {
    if zig_start == 0 {
        // DC refinement appends one bit to the existing coefficient.
        if reader.decode_bit()? {
            b[0] |= delta;
        }
        return Ok(());
    }

    let mut zig = zig_start;
    if *eob_run == 0 {
        while zig <= zig_end {
            let mut z = 0i32;
            let value = huffman::decode(reader, ac_table)?;
            let val0 = value >> 4;
            let val1 = value & 0x0f;
            match val1 {
                0 => {
                    if val0 != 0x0f {
                        *eob_run = 1 << val0;
                        if val0 != 0 {
                            *eob_run |= reader.decode_bits(i32::from(val0))? as u16;
                        }
                        break;
                    }
                }
                1 => {
                    z = delta;
                    if !reader.decode_bit()? {
                        z = -z;
                    }
                }
                // T.81 reserves every other magnitude for refinement scans.
                _ => return Err(Error::BadHuffmanCode),
            }

            zig = refine_non_zeroes(reader, b, zig, zig_end, i32::from(val0), delta)?;
            if zig > zig_end {
                return Err(Error::TooManyCoefficients);
            }
            if z != 0 {
                b[UNZIG[zig as usize]] = z;
            }
            zig += 1;
        }
    }
    if *eob_run > 0 {
        *eob_run -= 1;
        // Within an end-of-band run no new coefficients appear, but every
        // existing non-zero coefficient still receives a refinement bit.
        refine_non_zeroes(reader, b, zig, zig_end, -1, delta)?;
    }
    Ok(())
}

/// Advances `zig` through the band, refining existing non-zero coefficients
/// and skipping `nz` zero positions. A negative `nz` refines through to the
/// end of the band.
fn refine_non_zeroes<R: Read>(
    reader: &mut Reader<R>,
    b: &mut Block,
    mut zig: i32,
    zig_end: i32,
    mut nz: i32,
    delta: i32,
) -> Result<i32> {
    while zig <= zig_end {
        let u = UNZIG[zig as usize];
        if b[u] == 0 {
            if nz == 0 {
                break;
            }
            nz -= 1;
        } else if reader.decode_bit()? {
            // Sign-preserving: the refinement bit moves the coefficient away
            // from zero.
            if b[u] >= 0 {
                b[u] += delta;
            } else {
                b[u] -= delta;
            }
        }
        zig += 1;
    }
    Ok(zig)
}

#[cfg(test)]
mod tests {
    use super::UNZIG;

    #[test]
    fn unzig_is_a_permutation() {
        let mut seen = [false; 64];
        for &u in &UNZIG {
            assert!(!seen[u]);
            seen[u] = true;
        }
        // Spot checks: zig-zag position 3 is row 2 column 0.
        assert_eq!(UNZIG[3], 16);
        assert_eq!(UNZIG[1], 1);
        assert_eq!(UNZIG[2], 8);
        assert_eq!(UNZIG[63], 63);
    }
}
