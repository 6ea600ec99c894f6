//! Still-image decoding for pushed frames

use crate::error::MediaError;
use fos_render::Frame;
use image::ImageFormat;
use tracing::debug;

/// Decode one self-contained JPEG, PNG or WebP payload into a frame
pub fn decode_frame(data: &[u8]) -> Result<Frame, MediaError> {
    let format = image::guess_format(data)
        .map_err(|e| MediaError::FrameDecodeFailure(e.to_string()))?;

    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP) {
        return Err(MediaError::FrameDecodeFailure(format!(
            "unsupported image format {:?}",
            format
        )));
    }

    let image = image::load_from_memory_with_format(data, format)
        .map_err(|e| MediaError::FrameDecodeFailure(e.to_string()))?;

    let frame = Frame::from_image(image.into_rgba8());
    debug!("Decoded {:?} frame {}x{}", format, frame.width(), frame.height());
    Ok(frame)
}

/// Decode on the blocking pool so the caller's executor thread stays free
pub async fn decode_frame_blocking(data: Vec<u8>) -> Result<Frame, MediaError> {
    tokio::task::spawn_blocking(move || decode_frame(&data))
        .await
        .map_err(|e| MediaError::FrameDecodeFailure(format!("decode task failed: {}", e)))?
}

#[cfg(test)]
pub(crate) fn encode_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = std::io::Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}
