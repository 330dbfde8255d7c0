use super::{CaptureError, RgbaBuffer};
use image::{ImageBuffer, RgbaImage};

/// Converts a BGRA screen buffer into an opaque RGBA image.
///
/// Rows may carry padding; the stride is derived from the buffer length.
pub fn rgba_from_bgra(
    buffer_bgra: &[u8],
    width: u32,
    height: u32,
) -> Result<RgbaImage, CaptureError> {
    let (w, h) = (width as usize, height as usize);
    if h == 0 || w == 0 {
        return Err(CaptureError::BadFrame { width, height, len: buffer_bgra.len() });
    }

    // Calculate the stride (bytes per row)
    let stride = buffer_bgra.len() / h;
    if stride < w * 4 {
        return Err(CaptureError::BadFrame { width, height, len: buffer_bgra.len() });
    }

    // Preallocate the entire vector to avoid reallocations
    let mut rgba: RgbaBuffer = vec![0u8; w * h * 4];

    for (y, row) in rgba.chunks_exact_mut(w * 4).enumerate() {
        let src = &buffer_bgra[y * stride..y * stride + w * 4];
        for (dst, px) in row.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
            dst[0] = px[2]; // B to R
            dst[1] = px[1]; // G remains the same
            dst[2] = px[0]; // R to B
            dst[3] = 255; // Alpha
        }
    }

    ImageBuffer::from_raw(width, height, rgba)
        .ok_or(CaptureError::BadFrame { width, height, len: buffer_bgra.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn swaps_channels_and_forces_opaque() {
        let bgra = vec![10, 20, 30, 0, 1, 2, 3, 4];
        let img = rgba_from_bgra(&bgra, 2, 1).unwrap();
        assert_eq!(*img.get_pixel(0, 0), Rgba([30, 20, 10, 255]));
        assert_eq!(*img.get_pixel(1, 0), Rgba([3, 2, 1, 255]));
    }

    #[test]
    fn skips_row_padding() {
        // 1x2 image, each row padded to 8 bytes.
        let bgra = vec![1, 2, 3, 0, 9, 9, 9, 9, 4, 5, 6, 0, 9, 9, 9, 9];
        let img = rgba_from_bgra(&bgra, 1, 2).unwrap();
        assert_eq!(*img.get_pixel(0, 0), Rgba([3, 2, 1, 255]));
        assert_eq!(*img.get_pixel(0, 1), Rgba([6, 5, 4, 255]));
    }

    #[test]
    fn short_buffer_is_rejected() {
        let bgra = vec![0u8; 7];
        assert!(matches!(
            rgba_from_bgra(&bgra, 2, 1),
            Err(CaptureError::BadFrame { len: 7, .. })
        ));
    }
}
