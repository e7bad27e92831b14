use std::io::Read;

use byteorder::{BigEndian, ByteOrder};

use crate::color::Subsampling;
use crate::error::{Error, Result};
use crate::huffman::{HuffmanTable, MAX_N_CODES};
use crate::reader::Reader;
use crate::MAX_COMPONENTS;

#[derive(Clone, Debug)]
pub struct Component {
    pub identifier: u8,
    pub horizontal_sampling_factor: u8,
    pub vertical_sampling_factor: u8,
    pub quantization_table_index: usize,
}

#[derive(Clone, Debug)]
pub struct FrameInfo {
    pub is_baseline: bool,
    pub is_progressive: bool,
    pub width: u16,
    pub height: u16,
    pub components: Vec<Component>,
    pub subsampling: Option<Subsampling>,
}

#[derive(Clone, Copy, Debug)]
pub struct ScanComponent {
    pub component_index: usize,
    pub dc_table_index: usize,
    pub ac_table_index: usize,
}

#[derive(Debug)]
pub struct ScanInfo {
    pub components: Vec<ScanComponent>,
    /// Spectral selection band, both ends inclusive (zig-zag positions).
    pub zig_start: i32,
    pub zig_end: i32,
    pub approximation_high: u32,
    pub approximation_low: u32,
}

// Section B.2.2
pub fn parse_sof<R: Read>(reader: &mut Reader<R>, sof: u8, n: usize) -> Result<FrameInfo> {
    let component_count = match n {
        9 => 1,
        15 => 3,
        18 => 4,
        _ => return Err(Error::UnsupportedMode("SOF component count")),
    };
    let mut tmp = [0u8; 18];
    reader.read_full(&mut tmp[..n])?;
    if tmp[0] != 8 {
        return Err(Error::UnsupportedMode("sample precision"));
    }
    let height = BigEndian::read_u16(&tmp[1..3]);
    let width = BigEndian::read_u16(&tmp[3..5]);
    if height == 0 {
        // A zero height defers the line count to a DNL segment (B.2.5).
        return Err(Error::UnsupportedMode("DNL"));
    }
    if width == 0 {
        return Err(Error::ShortSegment("zero width in frame header"));
    }
    if usize::from(tmp[5]) != component_count {
        return Err(Error::ShortSegment("SOF has wrong length"));
    }

    let mut components: Vec<Component> = Vec::with_capacity(component_count);
    for i in 0..component_count {
        let identifier = tmp[6 + 3 * i];
        // Section B.2.2: "the value of C_i shall be different from the
        // values of C_1 through C_(i-1)".
        if components.iter().any(|c| c.identifier == identifier) {
            return Err(Error::ShortSegment("repeated component identifier"));
        }
        let quantization_table_index = tmp[8 + 3 * i];
        if quantization_table_index > 3 {
            return Err(Error::BadQuantTable("bad Tq value in frame header"));
        }
        let hv = tmp[7 + 3 * i];
        let mut h = hv >> 4;
        let mut v = hv & 0x0f;
        if !(1..=4).contains(&h) || !(1..=4).contains(&v) || h == 3 || v == 3 {
            return Err(Error::UnsupportedSubsampling);
        }
        match component_count {
            1 => {
                // Section A.2: single-component data is non-interleaved by
                // definition, so the sampling factors are meaningless.
                h = 1;
                v = 1;
            }
            3 => match i {
                // The luma factor pair must name one of the six supported
                // ratios; chroma factors must divide luma factors and Cb and
                // Cr must agree.
                0 => {
                    if Subsampling::from_luma_factors(h, v).is_none() {
                        return Err(Error::UnsupportedSubsampling);
                    }
                }
                1 => {
                    if components[0].horizontal_sampling_factor % h != 0
                        || components[0].vertical_sampling_factor % v != 0
                    {
                        return Err(Error::UnsupportedSubsampling);
                    }
                }
                _ => {
                    if components[1].horizontal_sampling_factor != h
                        || components[1].vertical_sampling_factor != v
                    {
                        return Err(Error::UnsupportedSubsampling);
                    }
                }
            },
            _ => match i {
                // Section K.7 documents only 4:4:4:4 and 4:2:0:4 layouts for
                // four-component images.
                0 => {
                    if !(h == 1 && v == 1 || h == 2 && v == 2) {
                        return Err(Error::UnsupportedSubsampling);
                    }
                }
                1 | 2 => {
                    if h != 1 || v != 1 {
                        return Err(Error::UnsupportedSubsampling);
                    }
                }
                _ => {
                    if components[0].horizontal_sampling_factor != h
                        || components[0].vertical_sampling_factor != v
                    {
                        return Err(Error::UnsupportedSubsampling);
                    }
                }
            },
        }
        components.push(Component {
            identifier,
            horizontal_sampling_factor: h,
            vertical_sampling_factor: v,
            quantization_table_index: usize::from(quantization_table_index),
        });
    }

    let subsampling = if component_count >= 3 {
        Subsampling::from_luma_factors(
            components[0].horizontal_sampling_factor,
            components[0].vertical_sampling_factor,
        )
    } else {
        None
    };
    Ok(FrameInfo {
        is_baseline: sof == 0,
        is_progressive: sof == 2,
        width,
        height,
        components,
        subsampling,
    })
}

// Section B.2.3
pub fn parse_sos<R: Read>(
    reader: &mut Reader<R>,
    frame: &FrameInfo,
    n: usize,
) -> Result<ScanInfo> {
    if n < 6 || n > 4 + 2 * MAX_COMPONENTS || n % 2 != 0 {
        return Err(Error::ShortSegment("SOS has wrong length"));
    }
    let mut tmp = [0u8; 4 + 2 * MAX_COMPONENTS];
    reader.read_full(&mut tmp[..n])?;
    let component_count = usize::from(tmp[0]);
    if n != 4 + 2 * component_count {
        return Err(Error::ShortSegment("SOS length inconsistent with component count"));
    }

    let mut components: Vec<ScanComponent> = Vec::with_capacity(component_count);
    let mut total_hv = 0u32;
    for i in 0..component_count {
        let selector = tmp[1 + 2 * i];
        let component_index = frame
            .components
            .iter()
            .position(|c| c.identifier == selector)
            .ok_or(Error::BadSosParams("unknown component selector"))?;
        // Section B.2.3: "the value of Cs_j shall be different from the
        // values of Cs_1 through Cs_(j-1)".
        if components.iter().any(|sc| sc.component_index == component_index) {
            return Err(Error::BadSosParams("repeated component selector"));
        }
        let comp = &frame.components[component_index];
        total_hv += u32::from(comp.horizontal_sampling_factor)
            * u32::from(comp.vertical_sampling_factor);
        // Table B.3: baseline scans may only name tables 0 and 1.
        let dc_table_index = tmp[2 + 2 * i] >> 4;
        if dc_table_index > 3 || frame.is_baseline && dc_table_index > 1 {
            return Err(Error::BadSosParams("bad Td value"));
        }
        let ac_table_index = tmp[2 + 2 * i] & 0x0f;
        if ac_table_index > 3 || frame.is_baseline && ac_table_index > 1 {
            return Err(Error::BadSosParams("bad Ta value"));
        }
        components.push(ScanComponent {
            component_index,
            dc_table_index: usize::from(dc_table_index),
            ac_table_index: usize::from(ac_table_index),
        });
    }
    // Section B.2.3: when a scan interleaves components, the total of their
    // H*V products may not exceed 10.
    if component_count > 1 && total_hv > 10 {
        return Err(Error::BadSosParams("total sampling factors too large"));
    }

    let mut zig_start = 0i32;
    let mut zig_end = 63i32;
    let mut ah = 0u32;
    let mut al = 0u32;
    if frame.is_progressive {
        zig_start = i32::from(tmp[1 + 2 * component_count]);
        zig_end = i32::from(tmp[2 + 2 * component_count]);
        ah = u32::from(tmp[3 + 2 * component_count] >> 4);
        al = u32::from(tmp[3 + 2 * component_count] & 0x0f);
        if zig_start == 0 && zig_end != 0 || zig_start > zig_end || zig_end > 63 {
            return Err(Error::BadSosParams("bad spectral selection bounds"));
        }
        if zig_start != 0 && component_count != 1 {
            return Err(Error::BadSosParams(
                "AC coefficient scan with more than one component",
            ));
        }
        // Section G.1.1.1.2: each refinement scan improves the band by
        // exactly one bit.
        if ah != 0 && ah != al + 1 {
            return Err(Error::BadSosParams("bad successive approximation values"));
        }
    }
    Ok(ScanInfo {
        components,
        zig_start,
        zig_end,
        approximation_high: ah,
        approximation_low: al,
    })
}

// Section B.2.4.1
pub fn parse_dqt<R: Read>(
    reader: &mut Reader<R>,
    mut n: usize,
    tables: &mut [[u16; 64]; 4],
) -> Result<()> {
    // A single DQT segment may define multiple tables.
    while n > 0 {
        n -= 1;
        let x = reader.read_byte()?;
        let tq = usize::from(x & 0x0f);
        if tq > 3 {
            return Err(Error::BadQuantTable("bad Tq value"));
        }
        match x >> 4 {
            0 => {
                if n < 64 {
                    return Err(Error::BadQuantTable("DQT has wrong length"));
                }
                n -= 64;
                let mut tmp = [0u8; 64];
                reader.read_full(&mut tmp)?;
                for (entry, &byte) in tables[tq].iter_mut().zip(&tmp) {
                    *entry = u16::from(byte);
                }
            }
            1 => {
                if n < 128 {
                    return Err(Error::BadQuantTable("DQT has wrong length"));
                }
                n -= 128;
                let mut tmp = [0u8; 128];
                reader.read_full(&mut tmp)?;
                for (i, entry) in tables[tq].iter_mut().enumerate() {
                    *entry = BigEndian::read_u16(&tmp[2 * i..]);
                }
            }
            _ => return Err(Error::BadQuantTable("bad Pq value")),
        }
    }
    Ok(())
}

// Section B.2.4.2
pub fn parse_dht<R: Read>(
    reader: &mut Reader<R>,
    mut n: usize,
    baseline: bool,
    dc_tables: &mut [HuffmanTable; 4],
    ac_tables: &mut [HuffmanTable; 4],
) -> Result<()> {
    // A single DHT segment may define multiple tables.
    while n > 0 {
        if n < 17 {
            return Err(Error::BadHuffmanTable("DHT has wrong length"));
        }
        let mut tmp = [0u8; 17];
        reader.read_full(&mut tmp)?;
        let tc = tmp[0] >> 4;
        if tc > 1 {
            return Err(Error::BadHuffmanTable("bad Tc value"));
        }
        let th = usize::from(tmp[0] & 0x0f);
        // Table B.5: baseline frames may only use tables 0 and 1.
        if th > 3 || baseline && th > 1 {
            return Err(Error::BadHuffmanTable("bad Th value"));
        }
        let mut counts = [0u8; 16];
        counts.copy_from_slice(&tmp[1..]);
        let n_codes: usize = counts.iter().map(|&c| usize::from(c)).sum();
        if n_codes == 0 {
            return Err(Error::BadHuffmanTable("table has zero length"));
        }
        if n_codes > MAX_N_CODES {
            return Err(Error::BadHuffmanTable("table has excessive length"));
        }
        if n < 17 + n_codes {
            return Err(Error::BadHuffmanTable("DHT has wrong length"));
        }
        n -= 17 + n_codes;
        let mut values = [0u8; MAX_N_CODES];
        reader.read_full(&mut values[..n_codes])?;
        let table = HuffmanTable::new(&counts, &values[..n_codes])?;
        if tc == 0 {
            dc_tables[th] = table;
        } else {
            ac_tables[th] = table;
        }
    }
    Ok(())
}

// Section B.2.4.4
pub fn parse_dri<R: Read>(reader: &mut Reader<R>, n: usize) -> Result<u16> {
    if n != 2 {
        return Err(Error::ShortSegment("DRI has wrong length"));
    }
    let mut tmp = [0u8; 2];
    reader.read_full(&mut tmp)?;
    Ok(BigEndian::read_u16(&tmp))
}

/// Parsed JFIF APP0 data: present or not, plus the pixel density fields when
/// the segment is long enough to carry them.
pub struct App0Info {
    pub is_jfif: bool,
    pub resolution: Option<(u16, u16)>,
}

pub fn parse_app0<R: Read>(reader: &mut Reader<R>, n: usize) -> Result<App0Info> {
    if n < 12 {
        if n >= 5 {
            let mut tmp = [0u8; 5];
            reader.read_full(&mut tmp)?;
            reader.skip(n - 5)?;
            return Ok(App0Info {
                is_jfif: &tmp == b"JFIF\0",
                resolution: None,
            });
        }
        reader.skip(n)?;
        return Ok(App0Info {
            is_jfif: false,
            resolution: None,
        });
    }
    let mut tmp = [0u8; 12];
    reader.read_full(&mut tmp)?;
    reader.skip(n - 12)?;
    if &tmp[..5] != b"JFIF\0" {
        return Ok(App0Info {
            is_jfif: false,
            resolution: None,
        });
    }
    let horizontal = BigEndian::read_u16(&tmp[8..10]);
    let vertical = BigEndian::read_u16(&tmp[10..12]);
    Ok(App0Info {
        is_jfif: true,
        resolution: Some((horizontal, vertical)),
    })
}

/// Returns the raw EXIF profile when the APP1 payload carries one.
pub fn parse_app1<R: Read>(reader: &mut Reader<R>, n: usize) -> Result<Option<Vec<u8>>> {
    if n < 6 {
        reader.skip(n)?;
        return Ok(None);
    }
    let mut payload = vec![0u8; n];
    reader.read_full(&mut payload)?;
    if &payload[..6] == b"Exif\0\0" {
        Ok(Some(payload))
    } else {
        Ok(None)
    }
}

/// Returns the Adobe APP14 color transform byte when present.
pub fn parse_app14<R: Read>(reader: &mut Reader<R>, n: usize) -> Result<Option<u8>> {
    if n < 12 {
        reader.skip(n)?;
        return Ok(None);
    }
    let mut tmp = [0u8; 12];
    reader.read_full(&mut tmp)?;
    reader.skip(n - 12)?;
    if &tmp[..5] == b"Adobe" {
        Ok(Some(tmp[11]))
    } else {
        Ok(None)
    }
}
