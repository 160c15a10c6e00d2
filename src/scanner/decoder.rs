use image::GrayImage;
use log::trace;
use thiserror::Error;

use super::camera::Frame;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No code in this frame. Expected most of the time; never surfaced.
    #[error("no code in frame")]
    NothingFound,

    #[error("decoder failure: {0}")]
    Driver(String),
}

pub trait FrameDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Result<String, DecodeError>;
}

/// Locates and reads QR grids in still frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrFrameDecoder;

impl FrameDecoder for QrFrameDecoder {
    fn decode(&self, frame: &Frame) -> Result<String, DecodeError> {
        let img = image::load_from_memory(&frame.bytes)
            .map_err(|err| DecodeError::Driver(format!("unreadable frame: {err}")))?;
        decode_luma(&img.to_luma8())
    }
}

pub fn decode_luma(luma: &GrayImage) -> Result<String, DecodeError> {
    let (width, height) = luma.dimensions();
    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
            luma.get_pixel(x as u32, y as u32).0[0]
        });

    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_, content)) => return Ok(content),
            // A partly visible or blurred code; the next frame may read.
            Err(err) => trace!("qr grid located but unreadable: {err:?}"),
        }
    }

    Err(DecodeError::NothingFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_blank_frame_is_soft_error() {
        let blank = GrayImage::from_pixel(64, 64, Luma([255u8]));
        assert_eq!(decode_luma(&blank), Err(DecodeError::NothingFound));
    }

    #[test]
    fn test_garbage_bytes_are_driver_failure() {
        let frame = Frame::new(b"definitely not an image".to_vec());
        assert!(matches!(
            QrFrameDecoder.decode(&frame),
            Err(DecodeError::Driver(_))
        ));
    }
}
