//! Upload decoding: data URL → resized RGB working frame.

use base64::Engine as _;
use image::imageops::FilterType;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("expected a data URL of the form data:<mime>;base64,<payload>")]
    InvalidFormat,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("undecodable image: {0}")]
    Image(#[from] image::ImageError),
}

impl FrameError {
    /// Whether the failure is in the envelope rather than the image bytes.
    pub fn is_format(&self) -> bool {
        matches!(self, FrameError::InvalidFormat)
    }
}

/// Strip the `data:...;base64,` prefix and decode the payload.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, FrameError> {
    let (_, payload) = data_url.split_once(',').ok_or(FrameError::InvalidFormat)?;
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(FrameError::InvalidFormat);
    }
    Ok(base64::engine::general_purpose::STANDARD.decode(payload)?)
}

/// Decode an uploaded image and resize it to the working resolution.
pub fn decode_frame(data_url: &str, width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let bytes = decode_data_url(data_url)?;
    let image = image::load_from_memory(&bytes)?;
    let frame = image.resize_exact(width, height, FilterType::Triangle).to_rgb8();
    tracing::debug!(
        src_width = image.width(),
        src_height = image.height(),
        width,
        height,
        "frame decoded"
    );
    Ok(frame)
}
