//! Image payload decoding: base64 / data URL → bytes + file name.
//!
//! The service sends image content either as plain base64 or framed as
//! `data:<mime>;base64,<payload>`, sometimes wrapped across lines. Framing
//! and whitespace are removed before decoding with the standard alphabet.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;

/// Payload value the service uses when image content was not requested.
pub const PLACEHOLDER_PAYLOAD: &str = "...";

/// Extension used when the bytes do not identify a known format.
pub const DEFAULT_EXTENSION: &str = "jpeg";

/// Strip data-URL framing and whitespace.
///
/// Returns `None` for an empty or placeholder payload.
pub fn payload_body(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == PLACEHOLDER_PAYLOAD {
        return None;
    }
    let body = match raw.strip_prefix("data:") {
        Some(framed) => framed.split_once(',').map_or(raw, |(_, payload)| payload),
        None => raw,
    };
    Some(body.chars().filter(|c| !c.is_whitespace()).collect())
}

/// Decode an image payload.
///
/// `Ok(None)` means there was nothing to decode.
pub fn decode_payload(raw: &str) -> Result<Option<Vec<u8>>, base64::DecodeError> {
    match payload_body(raw) {
        Some(body) => STANDARD.decode(body).map(Some),
        None => Ok(None),
    }
}

/// File extension for decoded image bytes, sniffed from the magic number.
pub fn infer_extension(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "png",
        Ok(ImageFormat::Jpeg) => "jpeg",
        Ok(ImageFormat::Gif) => "gif",
        Ok(ImageFormat::WebP) => "webp",
        Ok(ImageFormat::Bmp) => "bmp",
        Ok(ImageFormat::Tiff) => "tiff",
        _ => DEFAULT_EXTENSION,
    }
}

/// File name for an image: its identifier, plus an extension if it has none.
///
/// Path separators in the identifier are replaced so the file always lands
/// directly inside `images/`.
pub fn image_filename(id: &str, bytes: &[u8]) -> String {
    let name: String = id
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    if name.contains('.') {
        name
    } else {
        format!("{name}.{}", infer_extension(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 128, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("encode png");
        buf
    }

    #[test]
    fn data_url_decodes_like_stripped_payload() {
        let framed = decode_payload("data:image/jpeg;base64,AAAA\nBBBB").unwrap();
        let plain = decode_payload("AAAABBBB").unwrap();
        assert!(framed.is_some());
        assert_eq!(framed, plain);
    }

    #[test]
    fn whitespace_variants_are_stripped() {
        assert_eq!(
            payload_body("data:image/png;base64, AA AA\r\nBB\tBB ").as_deref(),
            Some("AAAABBBB")
        );
    }

    #[test]
    fn empty_and_placeholder_are_skipped() {
        assert_eq!(decode_payload("").unwrap(), None);
        assert_eq!(decode_payload("   ").unwrap(), None);
        assert_eq!(decode_payload("...").unwrap(), None);
    }

    #[test]
    fn invalid_base64_is_an_error() {
        assert!(decode_payload("not base64!!").is_err());
    }

    #[test]
    fn filename_keeps_existing_extension() {
        assert_eq!(image_filename("img-0.jpeg", &png_bytes()), "img-0.jpeg");
    }

    #[test]
    fn filename_infers_png() {
        assert_eq!(image_filename("img-1", &png_bytes()), "img-1.png");
    }

    #[test]
    fn filename_defaults_to_jpeg() {
        assert_eq!(image_filename("x", b"\x00\x01\x02\x03"), "x.jpeg");
        assert_eq!(image_filename("y", &[]), "y.jpeg");
    }

    #[test]
    fn filename_has_no_separators() {
        assert_eq!(image_filename("../a/b.png", &[]), ".._a_b.png");
    }

    #[test]
    fn png_round_trip_through_data_url() {
        let png = png_bytes();
        let url = format!("data:image/png;base64,{}", STANDARD.encode(&png));
        let decoded = decode_payload(&url).unwrap().unwrap();
        assert_eq!(decoded, png);
        assert_eq!(infer_extension(&decoded), "png");
    }
}
