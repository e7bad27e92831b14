// Table B.1
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    /// Start Of Frame markers
    ///
    /// - SOF(0): Baseline DCT (Huffman coding)
    /// - SOF(1): Extended sequential DCT (Huffman coding)
    /// - SOF(2): Progressive DCT (Huffman coding)
    /// - SOF(3): Lossless (sequential) (Huffman coding)
    /// - SOF(5..7): Differential variants (Huffman coding)
    /// - SOF(9..15): Arithmetic-coding variants
    SOF(u8),
    /// Reserved for JPEG extensions
    JPG,
    /// Define Huffman table(s)
    DHT,
    /// Define arithmetic coding conditioning(s)
    DAC,
    /// Restart with modulo 8 count `m`
    RST(u8),
    /// Start of image
    SOI,
    /// End of image
    EOI,
    /// Start of scan
    SOS,
    /// Define quantization table(s)
    DQT,
    /// Define number of lines
    DNL,
    /// Define restart interval
    DRI,
    /// Define hierarchical progression
    DHP,
    /// Expand reference component(s)
    EXP,
    /// Reserved for application segments
    APP(u8),
    /// Reserved for JPEG extensions
    JPGn(u8),
    /// Comment
    COM,
    /// For temporary private use in arithmetic coding
    TEM,
    /// Reserved
    RES,
}

impl Marker {
    /// Maps a marker byte to its marker. `0x00` (byte stuffing) and `0xff`
    /// (fill byte) are not markers.
    pub fn from_u8(n: u8) -> Option<Marker> {
        use self::Marker::*;
        match n {
            0x00 | 0xff => None,
            0x01 => Some(TEM),
            0x02..=0xbf => Some(RES),
            0xc4 => Some(DHT),
            0xc8 => Some(JPG),
            0xcc => Some(DAC),
            0xc0..=0xcf => Some(SOF(n - 0xc0)),
            0xd0..=0xd7 => Some(RST(n - 0xd0)),
            0xd8 => Some(SOI),
            0xd9 => Some(EOI),
            0xda => Some(SOS),
            0xdb => Some(DQT),
            0xdc => Some(DNL),
            0xdd => Some(DRI),
            0xde => Some(DHP),
            0xdf => Some(EXP),
            0xe0..=0xef => Some(APP(n - 0xe0)),
            0xf0..=0xfd => Some(JPGn(n - 0xf0)),
            0xfe => Some(COM),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Marker;

    #[test]
    fn marker_byte_round_trip() {
        assert_eq!(Marker::from_u8(0xd8), Some(Marker::SOI));
        assert_eq!(Marker::from_u8(0xd9), Some(Marker::EOI));
        assert_eq!(Marker::from_u8(0xc0), Some(Marker::SOF(0)));
        assert_eq!(Marker::from_u8(0xc2), Some(Marker::SOF(2)));
        assert_eq!(Marker::from_u8(0xc4), Some(Marker::DHT));
        assert_eq!(Marker::from_u8(0xd3), Some(Marker::RST(3)));
        assert_eq!(Marker::from_u8(0xee), Some(Marker::APP(14)));
        assert_eq!(Marker::from_u8(0x00), None);
        assert_eq!(Marker::from_u8(0xff), None);
    }
}
