//! services/api/src/adapters/qr.rs
//!
//! Renders pairing tokens as scannable QR images for the operator.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chat_export_core::{PortError, PortResult};
use qrcode::{render::svg, QrCode};

const QR_SIZE: u32 = 300;

/// Encodes `payload` as an SVG QR code wrapped in a `data:` URL.
pub fn render_data_url(payload: &str) -> PortResult<String> {
    let code = QrCode::new(payload.as_bytes())
        .map_err(|e| PortError::Unexpected(format!("cannot encode pairing token: {e}")))?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(QR_SIZE, QR_SIZE)
        .build();
    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}
