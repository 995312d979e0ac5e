//! Frame scaling and transformation utilities.

use image::imageops::{self, FilterType};
use image::RgbImage;

use super::types::{FitMode, Frame, FrameFormat};

/// Bilinear, matching what most capture pipelines use for preview scaling.
const FILTER: FilterType = FilterType::Triangle;

/// Map a device frame onto an exact `width x height` output.
///
/// Returns the frame unchanged when it already has the target size.
/// `Letterbox` centres the scaled image on a black canvas. Sequence number
/// and timestamp are carried over.
pub fn fit_frame(frame: Frame, width: u32, height: u32, fit: FitMode) -> Frame {
    if frame.width == width && frame.height == height {
        return frame;
    }

    let (sequence, timestamp) = (frame.sequence, frame.timestamp);
    let source = if frame.is_complete() && width > 0 && height > 0 {
        RgbImage::from_raw(frame.width, frame.height, frame.data)
    } else {
        None
    };
    let Some(source) = source else {
        return Frame {
            sequence,
            timestamp,
            ..Frame::black(width, height)
        };
    };

    let output = match fit {
        FitMode::Stretch => imageops::resize(&source, width, height, FILTER),
        FitMode::Letterbox => letterbox(&source, width, height),
    };

    Frame {
        data: output.into_raw(),
        width,
        height,
        format: FrameFormat::Rgb,
        sequence,
        timestamp,
    }
}

fn letterbox(source: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (inner_w, inner_h) = letterbox_size(source.width(), source.height(), width, height);
    let scaled = imageops::resize(source, inner_w, inner_h, FILTER);

    let mut canvas = RgbImage::new(width, height);
    let x = (width - inner_w) / 2;
    let y = (height - inner_h) / 2;
    imageops::overlay(&mut canvas, &scaled, x as i64, y as i64);
    canvas
}

/// Largest size with the source aspect ratio that fits inside the target.
fn letterbox_size(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (u32, u32) {
    let (src_w, src_h, dst_w, dst_h) = (src_w as u64, src_h as u64, dst_w as u64, dst_h as u64);
    if src_w * dst_h >= src_h * dst_w {
        // Source is wider: width-bound
        let h = (src_h * dst_w / src_w).clamp(1, dst_h);
        (dst_w as u32, h as u32)
    } else {
        let w = (src_w * dst_h / src_h).clamp(1, dst_w);
        (w as u32, dst_h as u32)
    }
}

/// Mirror a frame horizontally (flip left-right) for selfie mode.
pub fn mirror_horizontal(frame: &mut Frame) {
    let width = frame.width as usize;
    let bpp = frame.bytes_per_pixel();
    if width == 0 {
        return;
    }

    for row in frame.data.chunks_exact_mut(width * bpp) {
        // Swap pixels from left and right
        for x in 0..width / 2 {
            let left = x * bpp;
            let right = (width - 1 - x) * bpp;
            for i in 0..bpp {
                row.swap(left + i, right + i);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: Vec<u8>, width: u32, height: u32) -> Frame {
        Frame::new(data, width, height, 0).unwrap()
    }

    #[test]
    fn test_fit_frame_same_size_is_identity() {
        let input = frame(vec![9; 2 * 2 * 3], 2, 2);
        let out = fit_frame(input.clone(), 2, 2, FitMode::Letterbox);
        assert_eq!(out.data, input.data);
    }

    /// `width x height` frame, left half red and right half blue.
    fn split(width: u32, height: u32) -> Frame {
        let mut data = Vec::new();
        for _y in 0..height {
            for x in 0..width {
                let px = if x < width / 2 { [255, 0, 0] } else { [0, 0, 255] };
                data.extend_from_slice(&px);
            }
        }
        frame(data, width, height)
    }

    #[test]
    fn test_stretch_downscale_keeps_layout() {
        let out = fit_frame(split(8, 4), 2, 1, FitMode::Stretch);
        assert_eq!((out.width, out.height), (2, 1));
        assert!(out.is_complete());

        let [r, _, b] = out.pixel(0, 0).unwrap();
        assert!(r > b, "left pixel should stay red, got r={} b={}", r, b);
        let [r, _, b] = out.pixel(1, 0).unwrap();
        assert!(b > r, "right pixel should stay blue, got r={} b={}", r, b);
    }

    #[test]
    fn test_stretch_upscale_uniform_is_exact() {
        let out = fit_frame(frame(vec![40; 2 * 2 * 3], 2, 2), 5, 3, FitMode::Stretch);
        assert_eq!((out.width, out.height), (5, 3));
        assert!(out.data.iter().all(|&b| b == 40));
    }

    #[test]
    fn test_fit_keeps_sequence() {
        let input = Frame::new(vec![1; 4 * 4 * 3], 4, 4, 42).unwrap();
        let timestamp = input.timestamp;
        let out = fit_frame(input, 2, 2, FitMode::Stretch);
        assert_eq!(out.sequence, 42);
        assert_eq!(out.timestamp, timestamp);
    }

    #[test]
    fn test_incomplete_source_becomes_black() {
        let broken = Frame {
            data: vec![255; 5],
            ..Frame::black(2, 2)
        };
        let out = fit_frame(broken, 3, 3, FitMode::Stretch);
        assert!(out.is_complete());
        assert!(out.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_letterbox_pads_top_and_bottom() {
        // 4x2 white source into 4x4 target: 4x2 image centred vertically
        let out = fit_frame(frame(vec![255; 4 * 2 * 3], 4, 2), 4, 4, FitMode::Letterbox);
        assert_eq!((out.width, out.height), (4, 4));
        assert_eq!(out.pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(out.pixel(0, 1), Some([255, 255, 255]));
        assert_eq!(out.pixel(3, 2), Some([255, 255, 255]));
        assert_eq!(out.pixel(3, 3), Some([0, 0, 0]));
    }

    #[test]
    fn test_letterbox_pads_left_and_right() {
        let out = fit_frame(frame(vec![255; 2 * 4 * 3], 2, 4), 4, 4, FitMode::Letterbox);
        assert_eq!(out.pixel(0, 2), Some([0, 0, 0]));
        assert_eq!(out.pixel(1, 2), Some([255, 255, 255]));
        assert_eq!(out.pixel(2, 0), Some([255, 255, 255]));
        assert_eq!(out.pixel(3, 3), Some([0, 0, 0]));
    }

    #[test]
    fn test_letterbox_size_never_zero() {
        assert_eq!(letterbox_size(1000, 1, 10, 10), (10, 1));
        assert_eq!(letterbox_size(1, 1000, 10, 10), (1, 10));
    }

    #[test]
    fn test_mirror_horizontal_2x1() {
        // Simple 2x1 image: pixel A (R=1,G=2,B=3) and pixel B (R=4,G=5,B=6)
        let mut f = frame(vec![1, 2, 3, 4, 5, 6], 2, 1);
        mirror_horizontal(&mut f);
        assert_eq!(f.data, vec![4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn test_mirror_horizontal_3x2() {
        let mut f = frame(
            vec![
                1, 1, 1, 2, 2, 2, 3, 3, 3, // Row 0: A, B, C
                4, 4, 4, 5, 5, 5, 6, 6, 6, // Row 1: D, E, F
            ],
            3,
            2,
        );
        mirror_horizontal(&mut f);
        assert_eq!(
            f.data,
            vec![
                3, 3, 3, 2, 2, 2, 1, 1, 1, // Row 0: C, B, A
                6, 6, 6, 5, 5, 5, 4, 4, 4, // Row 1: F, E, D
            ]
        );
    }
}
