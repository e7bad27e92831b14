use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::parser::FrameInfo;

/// Chroma subsampling ratio, derived from the luma sampling factors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subsampling {
    Ratio444,
    Ratio422,
    Ratio420,
    Ratio440,
    Ratio411,
    Ratio410,
}

impl Subsampling {
    pub fn from_luma_factors(h: u8, v: u8) -> Option<Subsampling> {
        match (h, v) {
            (1, 1) => Some(Subsampling::Ratio444),
            (2, 1) => Some(Subsampling::Ratio422),
            (2, 2) => Some(Subsampling::Ratio420),
            (1, 2) => Some(Subsampling::Ratio440),
            (4, 1) => Some(Subsampling::Ratio411),
            (4, 2) => Some(Subsampling::Ratio410),
            _ => None,
        }
    }
}

/// One reconstructed sample plane. The stride is a whole number of blocks,
/// so it may exceed the visible component width.
pub struct Plane {
    pub data: Vec<u8>,
    pub stride: usize,
}

/// How the decoded component planes map to RGB.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorModel {
    Grayscale,
    YCbCr,
    Rgb,
    Cmyk,
    Ycck,
}

/// Picks the color model for the decoded frame.
///
/// Three-component images are YCbCr unless the stream positively identifies
/// itself as RGB: no JFIF segment, and either an Adobe transform of zero or
/// literal 'R','G','B' component identifiers. Four-component images require
/// the Adobe segment to disambiguate CMYK from YCbCrK.
pub fn choose_color_model(
    frame: &FrameInfo,
    is_jfif: bool,
    adobe_transform: Option<u8>,
) -> Result<ColorModel> {
    match frame.components.len() {
        1 => Ok(ColorModel::Grayscale),
        3 => {
            let identifiers = [
                frame.components[0].identifier,
                frame.components[1].identifier,
                frame.components[2].identifier,
            ];
            if !is_jfif && (adobe_transform == Some(0) || identifiers == *b"RGB") {
                Ok(ColorModel::Rgb)
            } else {
                Ok(ColorModel::YCbCr)
            }
        }
        _ => match adobe_transform {
            None => Err(Error::UnknownColorModel),
            Some(0) => Ok(ColorModel::Cmyk),
            Some(_) => Ok(ColorModel::Ycck),
        },
    }
}

/// Converts the reconstructed planes into a dense row-major RGBA buffer.
///
/// Every output row depends only on the read-only planes, so rows are
/// converted in parallel.
pub fn planes_to_rgba(model: ColorModel, frame: &FrameInfo, planes: &[Plane]) -> Vec<u8> {
    let width = usize::from(frame.width);
    let height = usize::from(frame.height);
    let mut rgba = vec![0u8; width * height * 4];

    // Per-component index scale relative to the luma grid.
    let h0 = usize::from(frame.components[0].horizontal_sampling_factor);
    let v0 = usize::from(frame.components[0].vertical_sampling_factor);
    let scales: Vec<(usize, usize)> = frame
        .components
        .iter()
        .map(|c| {
            (
                h0 / usize::from(c.horizontal_sampling_factor),
                v0 / usize::from(c.vertical_sampling_factor),
            )
        })
        .collect();
    let sample = |i: usize, x: usize, y: usize| -> u8 {
        let (sx, sy) = scales[i];
        planes[i].data[(y / sy) * planes[i].stride + x / sx]
    };

    rgba.par_chunks_mut(width * 4)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
                let (r, g, b, a) = match model {
                    ColorModel::Grayscale => {
                        let gray = sample(0, x, y);
                        (gray, gray, gray, 255)
                    }
                    ColorModel::YCbCr => {
                        let (r, g, b) =
                            ycbcr_to_rgb(sample(0, x, y), sample(1, x, y), sample(2, x, y));
                        (r, g, b, 255)
                    }
                    ColorModel::Rgb => (sample(0, x, y), sample(1, x, y), sample(2, x, y), 255),
                    ColorModel::Cmyk => {
                        // Adobe stores the CMYK planes inverted; the black
                        // plane combines multiplicatively.
                        let k = u32::from(sample(3, x, y));
                        let r = u32::from(sample(0, x, y)) * k / 255;
                        let g = u32::from(sample(1, x, y)) * k / 255;
                        let b = u32::from(sample(2, x, y)) * k / 255;
                        (r as u8, g as u8, b as u8, 255)
                    }
                    ColorModel::Ycck => {
                        let (r, g, b) =
                            ycbcr_to_rgb(sample(0, x, y), sample(1, x, y), sample(2, x, y));
                        let k = u32::from(sample(3, x, y));
                        (
                            (u32::from(r) * k / 255) as u8,
                            (u32::from(g) * k / 255) as u8,
                            (u32::from(b) * k / 255) as u8,
                            255,
                        )
                    }
                };
                pixel[0] = r;
                pixel[1] = g;
                pixel[2] = b;
                pixel[3] = a;
            }
        });
    rgba
}

// ITU-R BT.601 as specified for JFIF, with rounding.
fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> (u8, u8, u8) {
    let y = f32::from(y);
    let cb = f32::from(cb) - 128.0;
    let cr = f32::from(cr) - 128.0;

    let r = y + 1.402 * cr;
    let g = y - 0.344136 * cb - 0.714136 * cr;
    let b = y + 1.772 * cb;

    (
        clamp((r + 0.5) as i32),
        clamp((g + 0.5) as i32),
        clamp((b + 0.5) as i32),
    )
}

fn clamp(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Component;

    fn frame_with(component_count: usize, identifiers: &[u8]) -> FrameInfo {
        FrameInfo {
            is_baseline: true,
            is_progressive: false,
            width: 2,
            height: 1,
            components: (0..component_count)
                .map(|i| Component {
                    identifier: identifiers[i],
                    horizontal_sampling_factor: 1,
                    vertical_sampling_factor: 1,
                    quantization_table_index: 0,
                })
                .collect(),
            subsampling: Some(Subsampling::Ratio444),
        }
    }

    #[test]
    fn jfif_always_means_ycbcr() {
        let frame = frame_with(3, b"RGB");
        assert_eq!(
            choose_color_model(&frame, true, Some(0)).unwrap(),
            ColorModel::YCbCr
        );
    }

    #[test]
    fn adobe_transform_zero_without_jfif_means_rgb() {
        let frame = frame_with(3, &[1, 2, 3]);
        assert_eq!(
            choose_color_model(&frame, false, Some(0)).unwrap(),
            ColorModel::Rgb
        );
    }

    #[test]
    fn rgb_identifiers_without_jfif_mean_rgb() {
        let frame = frame_with(3, b"RGB");
        assert_eq!(
            choose_color_model(&frame, false, None).unwrap(),
            ColorModel::Rgb
        );
    }

    #[test]
    fn plain_three_component_defaults_to_ycbcr() {
        let frame = frame_with(3, &[1, 2, 3]);
        assert_eq!(
            choose_color_model(&frame, false, None).unwrap(),
            ColorModel::YCbCr
        );
    }

    #[test]
    fn four_components_require_the_adobe_segment() {
        let frame = frame_with(4, &[1, 2, 3, 4]);
        assert!(matches!(
            choose_color_model(&frame, false, None),
            Err(Error::UnknownColorModel)
        ));
        assert_eq!(
            choose_color_model(&frame, false, Some(0)).unwrap(),
            ColorModel::Cmyk
        );
        assert_eq!(
            choose_color_model(&frame, false, Some(2)).unwrap(),
            ColorModel::Ycck
        );
    }

    #[test]
    fn neutral_ycbcr_stays_neutral() {
        assert_eq!(ycbcr_to_rgb(128, 128, 128), (128, 128, 128));
        assert_eq!(ycbcr_to_rgb(0, 128, 128), (0, 0, 0));
        assert_eq!(ycbcr_to_rgb(255, 128, 128), (255, 255, 255));
    }

    #[test]
    fn primary_chroma_extremes_convert() {
        // Full-scale red: Y=76, Cb=85, Cr=255 is close to (255, 0, 0).
        let (r, g, b) = ycbcr_to_rgb(76, 85, 255);
        assert!(r >= 254 && g <= 2 && b <= 2, "got ({}, {}, {})", r, g, b);
    }

    #[test]
    fn inverted_cmyk_planes_convert_to_rgb() {
        let frame = frame_with(4, &[1, 2, 3, 4]);
        let planes: Vec<Plane> = [[255u8, 0], [255, 0], [255, 0], [255, 255]]
            .iter()
            .map(|samples| Plane {
                data: samples.to_vec(),
                stride: 2,
            })
            .collect();
        let rgba = planes_to_rgba(ColorModel::Cmyk, &frame, &planes);
        // Stored 255 is zero ink; stored 0 is full ink.
        assert_eq!(&rgba[..4], &[255, 255, 255, 255]);
        assert_eq!(&rgba[4..], &[0, 0, 0, 255]);
    }
}
