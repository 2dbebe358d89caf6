/// Image header probing: the `image` crate reads just enough of the file to
/// learn its pixel dimensions, without decoding the full frame.

use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Read the pixel dimensions of an encoded image (JPEG, PNG, WebP, BMP, GIF).
pub fn probe_dimensions(data: &[u8]) -> Result<ImageSize, String> {
    let reader = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| format!("Image format detection: {e}"))?;

    if reader.format().is_none() {
        return Err("Image decode: unrecognized image format".to_string());
    }

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| format!("Image decode: {e}"))?;

    Ok(ImageSize { width, height })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        RgbImage::new(width, height).write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn reads_png_dimensions() {
        let size = probe_dimensions(&encode(64, 48, ImageFormat::Png)).unwrap();
        assert_eq!(size, ImageSize { width: 64, height: 48 });
    }

    #[test]
    fn reads_jpeg_dimensions() {
        let size = probe_dimensions(&encode(33, 17, ImageFormat::Jpeg)).unwrap();
        assert_eq!(size, ImageSize { width: 33, height: 17 });
    }

    #[test]
    fn rejects_garbage() {
        assert!(probe_dimensions(b"definitely not an image").is_err());
        assert!(probe_dimensions(&[]).is_err());
    }
}
