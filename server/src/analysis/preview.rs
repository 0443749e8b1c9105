use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::data::PreviewFrame;
use image::{codecs::jpeg::JpegEncoder, imageops, imageops::FilterType, RgbImage};
use log::{debug, warn};

use super::{Frame, VideoBackend};

pub const PREVIEW_WIDTH: u32 = 640;
pub const PREVIEW_HEIGHT: u32 = 480;
const JPEG_QUALITY: u8 = 85;

/// First frame of the video as a base64 JPEG, or `None` when there is no
/// frame to show. A missing preview is never an analysis failure.
pub fn extract_preview(backend: &dyn VideoBackend, path: &Path) -> Option<PreviewFrame> {
    let frame = match backend.open(path).and_then(|mut source| source.read_frame(0)) {
        Ok(Some(frame)) => frame,
        Ok(None) => {
            debug!("{} has no readable frame for a preview", path.display());
            return None;
        }
        Err(e) => {
            warn!("no preview for {}: {e}", path.display());
            return None;
        }
    };
    encode_preview(frame)
}

pub fn encode_preview(frame: Frame) -> Option<PreviewFrame> {
    let img = RgbImage::from_raw(frame.width, frame.height, frame.rgb)?;
    let resized = imageops::resize(&img, PREVIEW_WIDTH, PREVIEW_HEIGHT, FilterType::Triangle);
    let mut jpeg = Vec::new();
    if let Err(e) = JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&resized) {
        warn!("could not encode preview: {e}");
        return None;
    }
    Some(PreviewFrame {
        mime_type: "image/jpeg".to_string(),
        width: PREVIEW_WIDTH,
        height: PREVIEW_HEIGHT,
        data: STANDARD.encode(&jpeg),
    })
}
