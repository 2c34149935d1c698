use base64::Engine;
use chrono::{DateTime, Utc};
use qrcode::render::svg;
use qrcode::QrCode;
use serde::{Deserialize, Serialize};

use crate::models::ticket::{TicketReceipt, TicketStatus};
use crate::services::signature;

#[derive(thiserror::Error, Debug)]
pub enum QrGenerationError {
    #[error("QR code generation failed: {0}")]
    QrCodeError(#[from] qrcode::types::QrError),

    #[error("JSON serialization failed: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("PNG encoding failed: {0}")]
    ImageError(#[from] image::ImageError),
}

/// What a conductor's scanner reads off a ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketQrPayload {
    pub ticket_id: String,
    pub trip_id: String,
    pub seat: String,
    pub origin: String,
    pub destination: String,
    pub company: String,
    pub bus_number: i32,
    pub departure_at: DateTime<Utc>,
    pub price_cents: i64,
    pub purchased_at: DateTime<Utc>,
    pub status: TicketStatus,

    /// HMAC signature of the payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl TicketQrPayload {
    pub fn from_receipt(receipt: &TicketReceipt) -> Self {
        Self {
            ticket_id: receipt.id.to_string(),
            trip_id: receipt.trip_id.to_string(),
            seat: receipt.seat_label.clone(),
            origin: receipt.origin.clone(),
            destination: receipt.destination.clone(),
            company: receipt.company_name.clone(),
            bus_number: receipt.bus_number,
            departure_at: receipt.departure_at,
            price_cents: receipt.price_cents,
            purchased_at: receipt.purchased_at,
            status: receipt.status,
            signature: None,
        }
    }

    /// JSON of the payload without its signature
    fn to_signing_string(&self) -> Result<String, QrGenerationError> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        Ok(serde_json::to_string(&unsigned)?)
    }

    /// Returns a copy carrying an HMAC-SHA256 signature over the unsigned JSON
    pub fn signed(&self, signing_key: &[u8]) -> Result<Self, QrGenerationError> {
        let mut signed = self.clone();
        signed.signature = Some(signature::sign(&self.to_signing_string()?, signing_key));
        Ok(signed)
    }

    /// Checks the embedded signature, e.g. when a scanned code comes back
    pub fn verify(&self, signing_key: &[u8]) -> bool {
        match (&self.signature, self.to_signing_string()) {
            (Some(sig), Ok(payload)) => signature::verify(&payload, sig, signing_key),
            _ => false,
        }
    }

    fn encode(&self) -> Result<QrCode, QrGenerationError> {
        let json_str = serde_json::to_string(self)?;
        Ok(QrCode::new(json_str.as_bytes())?)
    }
}

/// Generates a QR code SVG from a (signed) payload
pub fn generate_qr_svg(payload: &TicketQrPayload) -> Result<String, QrGenerationError> {
    let code = payload.encode()?;
    let svg = code.render::<svg::Color>().min_dimensions(200, 200).build();

    Ok(svg)
}

/// Generates a QR code PNG from a (signed) payload
pub fn generate_qr_png(payload: &TicketQrPayload) -> Result<Vec<u8>, QrGenerationError> {
    use image::{ImageBuffer, Luma};

    let code = payload.encode()?;

    let module_size = 8u32; // Each module is 8x8 pixels
    let quiet_zone = 4u32; // Modules of blank border
    let width = code.width() as u32;
    let img_size = (width + 2 * quiet_zone) * module_size;

    let mut img = ImageBuffer::<Luma<u8>, Vec<u8>>::from_pixel(img_size, img_size, Luma([255u8]));

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let module_x = (x / module_size) as i64 - quiet_zone as i64;
        let module_y = (y / module_size) as i64 - quiet_zone as i64;
        if module_x < 0 || module_y < 0 || module_x >= width as i64 || module_y >= width as i64 {
            continue;
        }
        if code[(module_x as usize, module_y as usize)] == qrcode::types::Color::Dark {
            *pixel = Luma([0u8]);
        }
    }

    let mut png_data = Vec::new();
    image::DynamicImage::ImageLuma8(img).write_to(
        &mut std::io::Cursor::new(&mut png_data),
        image::ImageFormat::Png,
    )?;

    Ok(png_data)
}

/// PNG QR as a `data:` URL, for inlining into HTML
pub fn generate_qr_data_url(payload: &TicketQrPayload) -> Result<String, QrGenerationError> {
    let png = generate_qr_png(payload)?;
    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn receipt() -> TicketReceipt {
        TicketReceipt {
            id: Uuid::new_v4(),
            trip_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            seat_label: "A3".to_string(),
            price_cents: 45_000,
            status: TicketStatus::Active,
            purchased_at: Utc::now(),
            cancelled_at: None,
            departure_at: Utc::now(),
            arrival_at: Utc::now(),
            origin: "Bogotá".to_string(),
            destination: "Tunja".to_string(),
            company_name: "Expreso Andino".to_string(),
            bus_number: 12,
        }
    }

    #[test]
    fn test_payload_from_receipt() {
        let r = receipt();
        let payload = TicketQrPayload::from_receipt(&r);

        assert_eq!(payload.ticket_id, r.id.to_string());
        assert_eq!(payload.seat, "A3");
        assert_eq!(payload.company, "Expreso Andino");
        assert!(payload.signature.is_none());
    }

    #[test]
    fn test_payload_signing() {
        let key = b"test-signing-key";
        let signed = TicketQrPayload::from_receipt(&receipt()).signed(key).unwrap();

        let sig = signed.signature.clone().unwrap();
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(signed.verify(key));
        assert!(!signed.verify(b"another-key"));

        let mut tampered = signed.clone();
        tampered.seat = "A4".to_string();
        assert!(!tampered.verify(key));
    }

    #[test]
    fn test_qr_svg_generation() {
        let payload = TicketQrPayload::from_receipt(&receipt())
            .signed(b"test-signing-key")
            .unwrap();
        let svg = generate_qr_svg(&payload).unwrap();

        assert!(svg.contains("<svg"));
        assert!(svg.contains("</svg>"));
    }

    #[test]
    fn test_qr_png_and_data_url() {
        let payload = TicketQrPayload::from_receipt(&receipt());

        let png = generate_qr_png(&payload).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let url = generate_qr_data_url(&payload).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }
}
