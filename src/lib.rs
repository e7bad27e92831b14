//! A baseline and progressive JPEG decoder.
//!
//! The decoder pulls bytes from any [`std::io::Read`] and delivers the
//! reconstructed image as a dense RGBA buffer, along with JFIF resolution
//! and raw EXIF metadata when the stream carries them, through the
//! [`PixelSink`] the caller provides.
//!
//! # Examples
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! #[derive(Default)]
//! struct Image {
//!     width: u32,
//!     height: u32,
//!     rgba: Vec<u8>,
//! }
//!
//! impl jpegdec::PixelSink for Image {
//!     fn set_pixels(&mut self, width: u32, height: u32, rgba: Vec<u8>) {
//!         self.width = width;
//!         self.height = height;
//!         self.rgba = rgba;
//!     }
//!     fn set_resolution(&mut self, _horizontal: u16, _vertical: u16) {}
//!     fn set_exif_profile(&mut self, _profile: Vec<u8>) {}
//! }
//!
//! let file = File::open("image.jpg").expect("failed to open file");
//! let mut image = Image::default();
//! jpegdec::decode(&mut image, BufReader::new(file), false).expect("failed to decode");
//! ```

mod color;
mod decoder;
mod error;
mod huffman;
mod idct;
mod marker;
mod parser;
mod reader;

pub use color::{ColorModel, Subsampling};
pub use decoder::Decoder;
pub use error::{Error, Result};

use std::io::Read;

pub const MAX_COMPONENTS: usize = 4;

/// Receives the outputs of a decode: the RGBA pixels and, when present in
/// the stream, the JFIF pixel density and the raw EXIF profile.
pub trait PixelSink {
    fn set_pixels(&mut self, width: u32, height: u32, rgba: Vec<u8>);
    fn set_resolution(&mut self, horizontal: u16, vertical: u16);
    fn set_exif_profile(&mut self, profile: Vec<u8>);
}

/// Decodes one JPEG image from `reader` into `image`.
///
/// When `metadata_only` is set, decoding stops after the frame header (or at
/// the first scan) without producing pixels; resolution and EXIF metadata
/// seen up to that point are still delivered.
pub fn decode<S: PixelSink, R: Read>(
    image: &mut S,
    reader: R,
    metadata_only: bool,
) -> Result<()> {
    Decoder::new(reader).decode(image, metadata_only)
}
