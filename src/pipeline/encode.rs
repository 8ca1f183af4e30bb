//! Image encoding: canonical PNG bytes and the base64 transport form.
//!
//! Every page, whatever its source, ends up as an RGB8 PNG. PNG is lossless,
//! so pencil strokes and strike-through lines survive intact; JPEG ringing
//! around thin handwriting is exactly what makes a "6" read as a "0".

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

use super::render::PageImage;

/// Force 3-channel RGB and encode as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Wrap a page's PNG bytes as base64 for the multimodal request body.
///
/// `detail: "high"` asks GPT-4-class models for the full tile budget; with
/// the single low-detail tile small handwritten corrections are lost.
pub fn encode_page(page: &PageImage) -> ImageData {
    let b64 = STANDARD.encode(&page.png);
    debug!("Page {}: {} PNG bytes → {} base64 bytes", page.page, page.png.len(), b64.len());
    ImageData::new(b64, "image/png").with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_png_drops_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 128])));
        let png = encode_png(&img).expect("encode should succeed");
        let back = image::load_from_memory(&png).expect("valid png");
        assert_eq!(back.color(), image::ColorType::Rgb8);
        assert_eq!((back.width(), back.height()), (4, 3));
    }

    #[test]
    fn encode_page_is_valid_base64_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let page = PageImage {
            page: 1,
            png: encode_png(&img).unwrap(),
            width: 10,
            height: 10,
        };
        let data = encode_page(&page);
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, page.png);
    }
}
