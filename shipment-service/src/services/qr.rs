use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use image::{DynamicImage, Luma};
use qrcode::QrCode;
use std::io::Cursor;

use crate::models::PaymentQr;

/// Days a delivery payment link stays valid.
const QR_EXPIRY_DAYS: i64 = 7;

pub struct PaymentQrService {
    base_url: String,
}

impl PaymentQrService {
    pub fn new(base_url: String) -> Self {
        Self { base_url }
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }

    /// Payment link format: {base}?ref=<tracking>&amount=<n>&cu=<currency>
    pub fn payment_link(&self, tracking_code: &str, amount: f64, currency: &str) -> String {
        format!(
            "{}?ref={}&amount={:.2}&cu={}",
            self.base_url,
            urlencoding::encode(tracking_code),
            amount,
            urlencoding::encode(currency)
        )
    }

    pub fn generate_qr_base64(&self, link: &str) -> Result<String> {
        let code = QrCode::new(link)?;
        let image = code.render::<Luma<u8>>().build();

        let dynamic_image = DynamicImage::ImageLuma8(image);
        let mut buffer = Cursor::new(Vec::new());
        dynamic_image.write_to(&mut buffer, image::ImageOutputFormat::Png)?;

        Ok(general_purpose::STANDARD.encode(buffer.get_ref()))
    }

    /// Build the QR handle embedded in a delivery assignment, expiring
    /// [`QR_EXPIRY_DAYS`] from now.
    pub fn build_payment_qr(
        &self,
        tracking_code: &str,
        amount: f64,
        currency: &str,
    ) -> Result<PaymentQr> {
        let link = self.payment_link(tracking_code, amount, currency);
        let qr_png_base64 = self.generate_qr_base64(&link)?;
        Ok(PaymentQr {
            link,
            qr_png_base64,
            expires_at: Utc::now() + Duration::days(QR_EXPIRY_DAYS),
        })
    }
}
