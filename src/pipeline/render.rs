//! Document rasterisation: turn a [`Document`] into ordered [`PageImage`]s.
//!
//! ## Why spawn_blocking?
//!
//! pdfium and the image decoders are CPU-bound and pdfium is not async-safe.
//! `tokio::task::spawn_blocking` keeps that work off the async worker threads.
//!
//! ## No partial failure
//!
//! Unlike interpretation, rasterisation has no per-page recovery: if one page
//! cannot be rendered the whole document fails. A table missing a page it
//! silently skipped is worse than no table.

use crate::error::ExtractError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

use super::encode::encode_png;
use super::input::{Document, DocumentKind};

/// One rasterised page: canonical RGB8 PNG bytes plus its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-based page index within the source document.
    pub page: usize,
    /// PNG-encoded RGB8 bitmap.
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Rendering knobs taken from [`crate::ExtractionConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub dpi: u32,
    pub max_rendered_pixels: u32,
    pub password: Option<String>,
}

impl From<&crate::config::ExtractionConfig> for RenderOptions {
    fn from(c: &crate::config::ExtractionConfig) -> Self {
        Self {
            dpi: c.dpi,
            max_rendered_pixels: c.max_rendered_pixels,
            password: c.password.clone(),
        }
    }
}

/// Rasterise a document into page images in physical page order.
///
/// # Errors
/// [`ExtractError::UnsupportedFormat`] for spreadsheets (they never go
/// through the model) and for image bytes the decoder does not recognise.
pub async fn rasterize(doc: &Document, opts: &RenderOptions) -> Result<Vec<PageImage>, ExtractError> {
    match doc.kind {
        DocumentKind::Spreadsheet => Err(ExtractError::UnsupportedFormat {
            name: doc.name.clone(),
            detail: "spreadsheets are read directly and cannot be rasterised".into(),
        }),
        DocumentKind::Image => {
            let bytes = doc.bytes.clone();
            let name = doc.name.clone();
            tokio::task::spawn_blocking(move || rasterize_image(&bytes, name))
                .await
                .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))?
        }
        DocumentKind::Pdf => {
            let bytes = doc.bytes.clone();
            let opts = opts.clone();
            tokio::task::spawn_blocking(move || render_pdf_blocking(&bytes, &opts))
                .await
                .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))?
        }
    }
}

/// Decode a single bitmap and re-encode it as the one page of the document.
pub fn rasterize_image(bytes: &[u8], name: Option<String>) -> Result<Vec<PageImage>, ExtractError> {
    let format = image::guess_format(bytes).map_err(|e| ExtractError::UnsupportedFormat {
        name: name.clone(),
        detail: e.to_string(),
    })?;
    if !format.reading_enabled() {
        return Err(ExtractError::UnsupportedFormat {
            name,
            detail: format!("{:?} images are not supported", format),
        });
    }
    let img = image::load_from_memory_with_format(bytes, format).map_err(|e| {
        ExtractError::ImageDecodeFailed {
            detail: e.to_string(),
        }
    })?;
    let page = to_page_image(1, &img)?;
    debug!("Image {:?} → {}x{} px", format, page.width, page.height);
    Ok(vec![page])
}

fn to_page_image(page: usize, img: &DynamicImage) -> Result<PageImage, ExtractError> {
    let png = encode_png(img).map_err(|e| ExtractError::RasterisationFailed {
        page,
        detail: format!("PNG encoding failed: {}", e),
    })?;
    Ok(PageImage {
        page,
        png,
        width: img.width(),
        height: img.height(),
    })
}

/// Bind pdfium, honouring `PDFIUM_LIB_PATH` before the system library.
fn bind_pdfium() -> Result<Pdfium, ExtractError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(path),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn render_pdf_blocking(bytes: &[u8], opts: &RenderOptions) -> Result<Vec<PageImage>, ExtractError> {
    let pdfium = bind_pdfium()?;
    let password = opts.password.as_deref();

    let document = pdfium.load_pdf_from_byte_slice(bytes, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                ExtractError::WrongPassword
            } else {
                ExtractError::PasswordRequired
            }
        } else {
            ExtractError::CorruptPdf { detail: err_str }
        }
    })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(opts.dpi as f32 / 72.0)
        .set_maximum_width(opts.max_rendered_pixels as i32)
        .set_maximum_height(opts.max_rendered_pixels as i32);

    let mut results = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            ExtractError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            }
        })?;
        let image = bitmap.as_image();
        let page_image = to_page_image(page_num, &image)?;
        debug!(
            "Rendered page {} → {}x{} px",
            page_num, page_image.width, page_image.height
        );
        results.push(page_image);
    }

    if results.is_empty() {
        return Err(ExtractError::CorruptPdf {
            detail: "document has no pages".into(),
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encoded(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn grayscale_jpeg_becomes_one_rgb_png_page() {
        let jpeg = encoded(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 6, Luma([200]))),
            ImageFormat::Jpeg,
        );
        let pages = rasterize_image(&jpeg, Some("scan.jpg".into())).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page, 1);
        assert_eq!((pages[0].width, pages[0].height), (8, 6));
        let back = image::load_from_memory_with_format(&pages[0].png, ImageFormat::Png).unwrap();
        assert_eq!(back.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn unknown_bytes_are_unsupported() {
        let err = rasterize_image(b"definitely not an image", None).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat { .. }), "got {err:?}");
    }

    #[test]
    fn recognised_but_disabled_format_is_unsupported() {
        let err = rasterize_image(b"GIF89a\x01\x00\x01\x00\x00\x00\x00", Some("a.gif".into()))
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat { .. }), "got {err:?}");
    }

    #[test]
    fn truncated_png_fails_to_decode() {
        let mut png = encoded(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 255]))),
            ImageFormat::Png,
        );
        png.truncate(png.len() / 2);
        let err = rasterize_image(&png, None).unwrap_err();
        assert!(matches!(err, ExtractError::ImageDecodeFailed { .. }), "got {err:?}");
    }

    #[test]
    fn spreadsheet_cannot_be_rasterised() {
        let doc = Document::new(b"PK\x03\x04".to_vec(), DocumentKind::Spreadsheet);
        let opts = RenderOptions::from(&crate::ExtractionConfig::default());
        let err = tokio_test::block_on(rasterize(&doc, &opts)).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat { .. }));
    }
}
