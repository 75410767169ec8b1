//! Conversions from the engine's straight-alpha RGBA buffers to what display
//! surfaces expect.

use serde::{Deserialize, Serialize};

pub const BYTES_PER_PIXEL: usize = 4;

/// Byte order of a premultiplied output pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOrder {
    #[default]
    Bgra,
    Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PixelFormatError {
    #[error("pixel buffer length {len} is not a multiple of {BYTES_PER_PIXEL}")]
    PartialPixel { len: usize },
    #[error("destination length {dst} does not match source length {src}")]
    LengthMismatch { src: usize, dst: usize },
}

fn check_whole_pixels(len: usize) -> Result<(), PixelFormatError> {
    if len % BYTES_PER_PIXEL == 0 {
        Ok(())
    } else {
        Err(PixelFormatError::PartialPixel { len })
    }
}

#[inline]
fn premultiply_channel(channel: u8, alpha: u8) -> u8 {
    ((u32::from(channel) * u32::from(alpha) + 127) / 255) as u8
}

/// Premultiplies straight-alpha RGBA `src` into `dst` in `order`.
///
/// Nothing is written when the lengths disagree or are not whole pixels.
pub fn premultiply_into(
    src: &[u8],
    dst: &mut [u8],
    order: ChannelOrder,
) -> Result<(), PixelFormatError> {
    check_whole_pixels(src.len())?;
    if dst.len() != src.len() {
        return Err(PixelFormatError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }

    for (input, output) in src
        .chunks_exact(BYTES_PER_PIXEL)
        .zip(dst.chunks_exact_mut(BYTES_PER_PIXEL))
    {
        let alpha = input[3];
        let r = premultiply_channel(input[0], alpha);
        let g = premultiply_channel(input[1], alpha);
        let b = premultiply_channel(input[2], alpha);
        let pixel = match order {
            ChannelOrder::Bgra => [b, g, r, alpha],
            ChannelOrder::Rgba => [r, g, b, alpha],
        };
        output.copy_from_slice(&pixel);
    }
    Ok(())
}

pub fn premultiply(src: &[u8], order: ChannelOrder) -> Result<Vec<u8>, PixelFormatError> {
    let mut dst = vec![0; src.len()];
    premultiply_into(src, &mut dst, order)?;
    Ok(dst)
}

/// Packs straight-alpha RGBA bytes into `0xAARRGGBB` words, alpha untouched.
pub fn rgba_to_argb(src: &[u8]) -> Result<Vec<u32>, PixelFormatError> {
    check_whole_pixels(src.len())?;
    Ok(src
        .chunks_exact(BYTES_PER_PIXEL)
        .map(|pixel| u32::from_be_bytes([pixel[3], pixel[0], pixel[1], pixel[2]]))
        .collect())
}
