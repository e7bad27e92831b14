use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding a JPEG image.
///
/// Every variant aborts the decode of the current image. The only exceptions
/// are [`Error::MissingFF00`] and [`Error::ShortHuffmanData`], which the
/// Huffman decoder traps internally to switch from its fast path to its slow
/// path; they become fatal only when they escape that boundary.
#[derive(Error, Debug)]
pub enum Error {
    #[error("missing SOI marker")]
    MissingSoi,
    #[error("unknown marker 0x{0:02x}")]
    UnknownMarker(u8),
    #[error("malformed segment: {0}")]
    ShortSegment(&'static str),
    #[error("unsupported JPEG feature: {0}")]
    UnsupportedMode(&'static str),
    #[error("unsupported luma/chroma subsampling ratio")]
    UnsupportedSubsampling,
    #[error("multiple SOF markers")]
    MultipleSof,
    #[error("missing SOF marker")]
    MissingSof,
    #[error("missing SOS marker")]
    MissingSos,
    #[error("bad Huffman table: {0}")]
    BadHuffmanTable(&'static str),
    #[error("bad quantization table: {0}")]
    BadQuantTable(&'static str),
    #[error("bad SOS parameters: {0}")]
    BadSosParams(&'static str),
    #[error("bad Huffman code")]
    BadHuffmanCode,
    #[error("excessive DC component")]
    ExcessiveDc,
    #[error("too many coefficients")]
    TooManyCoefficients,
    #[error("missing 0xff00 sequence in entropy-coded data")]
    MissingFF00,
    #[error("short Huffman data")]
    ShortHuffmanData,
    #[error("bad RST marker")]
    BadRestart,
    #[error("unexpected end of stream")]
    UnexpectedEof,
    #[error("4-component image without Adobe APP14 color transform")]
    UnknownColorModel,
    #[error(transparent)]
    Io(#[from] io::Error),
}
