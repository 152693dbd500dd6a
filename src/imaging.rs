//! Shrinking profile pictures before upload.

use std::io::Cursor;

use base64::{Engine, engine::general_purpose::STANDARD};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::error::{Error, Result};

/// Data URIs longer than this (in characters) get compressed.
pub const COMPRESS_THRESHOLD: usize = 500_000;
pub const MAX_EDGE: u32 = 800;
pub const JPEG_QUALITY: u8 = 70;

/// Only oversized data URIs; plain URLs are sent as they are.
pub fn needs_compression(picture: &str) -> bool {
    picture.len() > COMPRESS_THRESHOLD && picture.starts_with("data:")
}

/// Compress an oversized data-URI picture. Small payloads and anything that
/// isn't a data URI come back unchanged.
pub fn prepare_profile_picture(picture: String) -> Result<String> {
    if !needs_compression(&picture) {
        return Ok(picture);
    }
    compress_data_uri(&picture)
}

/// Decode, cap the longer edge at `MAX_EDGE`, re-encode as JPEG.
pub fn compress_data_uri(data_uri: &str) -> Result<String> {
    let bytes = decode_data_uri(data_uri)?;
    let img = image::load_from_memory(&bytes)?;

    let (w, h) = fit_within(img.width(), img.height(), MAX_EDGE);
    let img = if (w, h) != (img.width(), img.height()) {
        img.resize_exact(w, h, FilterType::Triangle)
    } else {
        img
    };

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    image::DynamicImage::from(img.to_rgb8()).write_with_encoder(encoder)?;

    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(out.into_inner())))
}

fn decode_data_uri(data_uri: &str) -> Result<Vec<u8>> {
    let rest = data_uri
        .strip_prefix("data:")
        .ok_or_else(|| Error::Image("not a data URI".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::Image("data URI has no payload".into()))?;
    if !meta.ends_with(";base64") {
        return Err(Error::Image("only base64 data URIs are supported".into()));
    }
    STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::Image(e.to_string()))
}

/// Target size with the longer edge capped at `max`, aspect ratio kept.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    let longer = width.max(height);
    if longer <= max {
        return (width, height);
    }
    let scale = max as f64 / longer as f64;
    let w = ((width as f64 * scale).round() as u32).clamp(1, max);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max);
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png_data_uri(width: u32, height: u32) -> String {
        let mut img = RgbImage::new(width, height);
        // xorshift noise so the PNG doesn't compress to nothing
        let mut state = 0x2545_f491u32;
        for px in img.pixels_mut() {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            *px = image::Rgb([r, g, b]);
        }
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(buf.into_inner()))
    }

    fn dimensions(data_uri: &str) -> (u32, u32) {
        let img = image::load_from_memory(&decode_data_uri(data_uri).unwrap()).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn fit_caps_longer_edge() {
        assert_eq!(fit_within(1600, 1200, 800), (800, 600));
        assert_eq!(fit_within(1200, 1600, 800), (600, 800));
        assert_eq!(fit_within(2000, 2000, 800), (800, 800));
        assert_eq!(fit_within(640, 480, 800), (640, 480));
    }

    #[test]
    fn oversized_picture_is_resized() {
        let uri = png_data_uri(1200, 900);
        assert!(needs_compression(&uri));
        let out = prepare_profile_picture(uri).unwrap();
        assert!(out.starts_with("data:image/jpeg;base64,"));
        let (w, h) = dimensions(&out);
        assert!(w.max(h) <= MAX_EDGE);
        assert_eq!((w, h), (800, 600));
    }

    #[test]
    fn small_picture_passes_through() {
        let uri = png_data_uri(32, 32);
        assert!(!needs_compression(&uri));
        assert_eq!(prepare_profile_picture(uri.clone()).unwrap(), uri);
    }

    #[test]
    fn urls_pass_through() {
        let url = format!("https://cdn.example/{}", "a".repeat(COMPRESS_THRESHOLD + 1));
        assert!(!needs_compression(&url));
        assert_eq!(prepare_profile_picture(url.clone()).unwrap(), url);
    }

    #[test]
    fn broken_data_uri_is_an_error() {
        let bad = format!("data:image/png;base64,{}", "A".repeat(COMPRESS_THRESHOLD + 4));
        assert!(matches!(prepare_profile_picture(bad), Err(Error::Image(_))));
    }
}
