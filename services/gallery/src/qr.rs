use crate::error::{Error, Result};
use crate::slug::normalize_slug;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{ImageFormat, Luma};
use qrcode::QrCode;
use std::io::Cursor;

/// Minimum edge of the rendered QR image in pixels
const QR_MIN_SIZE: u32 = 240;

/// Public gallery link for an event slug
pub fn gallery_link(base_url: &str, slug: &str) -> String {
    format!(
        "{}/event/{}",
        base_url.trim_end_matches('/'),
        normalize_slug(slug)
    )
}

/// Render `value` as a PNG QR code
pub fn render_png(value: &str) -> Result<Vec<u8>> {
    let code = QrCode::new(value.as_bytes())
        .map_err(|e| Error::Render(format!("Failed to encode QR code: {}", e)))?;

    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_MIN_SIZE, QR_MIN_SIZE)
        .build();

    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| Error::Render(format!("Failed to write QR image: {}", e)))?;

    Ok(png.into_inner())
}

/// PNG QR code as a `data:` URL for inline display
pub fn render_data_url(value: &str) -> Result<String> {
    let png = render_png(value)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

/// Download name for an event's QR image
pub fn download_filename(slug: &str) -> String {
    format!("{}-qr.png", slug)
}
