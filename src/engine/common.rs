// src/engine/common.rs
//
// Pixel import shared by the still-image and animation encoders.
// Every supported layout ends up in a `SafePicture`; unsupported ones are
// rejected before any engine object exists.

use crate::buffer::{AlphaMode, PixelLayout, YuvaImage};
use crate::codecs::webp_safe::{check_source, SafePicture};
use crate::error::{Result, WebpError};
use crate::geometry::chroma_extent;
use tracing::trace;

/// Neutral chroma for luma-only sources.
const NEUTRAL_CHROMA: u8 = 128;

/// Fail fast on a layout the encoder cannot import.
pub(crate) fn ensure_supported(layout: &PixelLayout<'_>) -> Result<()> {
    match layout {
        PixelLayout::Unsupported { description } => {
            Err(WebpError::unsupported_image_type(description.clone()))
        }
        _ => Ok(()),
    }
}

/// Copy `layout` into `picture`, whose dimensions must already match the source.
pub(crate) fn import_pixels(picture: &mut SafePicture, layout: PixelLayout<'_>) -> Result<()> {
    match layout {
        PixelLayout::Rgb { pixels, stride } => picture.import_rgb(pixels, stride),
        PixelLayout::Rgba {
            pixels,
            stride,
            alpha: AlphaMode::Straight,
        } => picture.import_rgba(pixels, stride),
        PixelLayout::Rgba {
            pixels,
            stride,
            alpha: AlphaMode::Premultiplied,
        } => {
            let (width, height) = (picture.width(), picture.height());
            check_source("RGBA", pixels.len(), width, height, stride, 4)?;
            trace!(target: "webp_bridge::encode", width, height, "unpremultiplying source");
            let straight = unpremultiply(pixels, stride, width as usize, height as usize);
            picture.import_rgba(&straight, width as usize * 4)
        }
        PixelLayout::Gray { pixels, stride } => import_gray(picture, pixels, stride),
        PixelLayout::Yuva(image) => import_yuva(picture, image),
        PixelLayout::Unsupported { description } => {
            Err(WebpError::unsupported_image_type(description))
        }
    }
}

/// Tightly packed straight-alpha copy of premultiplied rows.
fn unpremultiply(pixels: &[u8], stride: usize, width: usize, height: usize) -> Vec<u8> {
    let row_bytes = width * 4;
    let mut out = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        for px in pixels[start..start + row_bytes].chunks_exact(4) {
            let a = px[3] as u32;
            if a == 0 {
                out.extend_from_slice(&[0, 0, 0, 0]);
                continue;
            }
            let straighten = |c: u8| ((c as u32 * 255 + a / 2) / a).min(255) as u8;
            out.extend_from_slice(&[straighten(px[0]), straighten(px[1]), straighten(px[2]), px[3]]);
        }
    }
    out
}

fn copy_rows(dst: &mut [u8], dst_stride: usize, src: &[u8], src_stride: usize, row_bytes: usize, rows: usize) {
    for row in 0..rows {
        let d = row * dst_stride;
        let s = row * src_stride;
        dst[d..d + row_bytes].copy_from_slice(&src[s..s + row_bytes]);
    }
}

fn import_gray(picture: &mut SafePicture, pixels: &[u8], stride: usize) -> Result<()> {
    let (width, height) = (picture.width(), picture.height());
    check_source("gray", pixels.len(), width, height, stride, 1)?;
    picture.alloc_yuv(false)?;
    let planes = picture
        .yuv_planes_mut()
        .ok_or_else(|| WebpError::allocation_failed("picture YUV planes"))?;
    copy_rows(planes.y, planes.y_stride, pixels, stride, width as usize, height as usize);
    planes.u.fill(NEUTRAL_CHROMA);
    planes.v.fill(NEUTRAL_CHROMA);
    Ok(())
}

fn import_yuva(picture: &mut SafePicture, image: &YuvaImage) -> Result<()> {
    if (image.width(), image.height()) != (picture.width(), picture.height()) {
        return Err(WebpError::invalid_buffer(format!(
            "planar image is {}x{}, picture is {}x{}",
            image.width(),
            image.height(),
            picture.width(),
            picture.height()
        )));
    }
    let has_alpha = image.color_space().has_alpha();
    picture.alloc_yuv(has_alpha)?;
    let planes = picture
        .yuv_planes_mut()
        .ok_or_else(|| WebpError::allocation_failed("picture YUV planes"))?;

    let (width, height) = (image.width() as usize, image.height() as usize);
    let (c_width, c_height) = (
        chroma_extent(image.width()) as usize,
        chroma_extent(image.height()) as usize,
    );
    copy_rows(planes.y, planes.y_stride, image.y(), image.y_stride(), width, height);
    copy_rows(planes.u, planes.uv_stride, image.cb(), image.c_stride(), c_width, c_height);
    copy_rows(planes.v, planes.uv_stride, image.cr(), image.c_stride(), c_width, c_height);
    if let (Some((dst, dst_stride)), Some(src)) = (planes.a, image.a()) {
        copy_rows(dst, dst_stride, src, image.a_stride(), width, height);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ColorSpace, ImageSource, RgbaBuffer};
    use crate::geometry::Rect;
    use std::borrow::Cow;

    #[test]
    fn unpremultiply_restores_straight_alpha() {
        // half-transparent red, premultiplied
        let px = [128u8, 0, 0, 128, 0, 0, 0, 0];
        let out = unpremultiply(&px, 8, 2, 1);
        assert_eq!(&out[..4], &[255, 0, 0, 128]);
        assert_eq!(&out[4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn unpremultiply_skips_row_padding() {
        let px = [10u8, 20, 30, 255, 99, 99, 10, 20, 30, 255, 99, 99];
        let out = unpremultiply(&px, 6, 1, 2);
        assert_eq!(out, vec![10, 20, 30, 255, 10, 20, 30, 255]);
    }

    #[test]
    fn unsupported_layout_is_rejected() {
        let layout = PixelLayout::Unsupported {
            description: Cow::Borrowed("16-bit luma"),
        };
        let err = ensure_supported(&layout).unwrap_err();
        assert!(matches!(err, WebpError::UnsupportedImageType { .. }));
        assert!(err.to_string().contains("16-bit luma"));
    }

    #[test]
    fn gray_import_fills_neutral_chroma() {
        let mut picture = SafePicture::new(3, 3).unwrap();
        import_pixels(
            &mut picture,
            PixelLayout::Gray {
                pixels: &[7u8; 9],
                stride: 3,
            },
        )
        .unwrap();
        let planes = picture.yuv_planes_mut().unwrap();
        assert_eq!(&planes.y[..3], &[7, 7, 7]);
        assert!(planes.u[..2].iter().all(|&c| c == NEUTRAL_CHROMA));
        assert!(planes.a.is_none());
    }

    #[test]
    fn yuva_import_copies_every_plane() {
        let mut image = YuvaImage::new(Rect::from_size(3, 2), ColorSpace::Yuv420A);
        image.y_mut().fill(50);
        image.cb_mut().fill(60);
        image.cr_mut().fill(70);
        if let Some(a) = image.a_mut() {
            a.fill(80);
        }
        let mut picture = SafePicture::new(3, 2).unwrap();
        import_pixels(&mut picture, PixelLayout::Yuva(&image)).unwrap();
        let planes = picture.yuv_planes_mut().unwrap();
        assert_eq!(&planes.y[..3], &[50, 50, 50]);
        assert_eq!(&planes.u[..2], &[60, 60]);
        assert_eq!(&planes.v[..2], &[70, 70]);
        let (a, _) = planes.a.unwrap();
        assert_eq!(&a[..3], &[80, 80, 80]);
    }

    #[test]
    fn yuva_size_mismatch_is_rejected() {
        let image = YuvaImage::new(Rect::from_size(4, 4), ColorSpace::Yuv420);
        let mut picture = SafePicture::new(2, 2).unwrap();
        let err = import_pixels(&mut picture, PixelLayout::Yuva(&image)).unwrap_err();
        assert!(matches!(err, WebpError::InvalidBuffer { .. }));
    }

    #[test]
    fn premultiplied_rgba_imports() {
        let source = RgbaBuffer::new(Rect::from_size(2, 2), AlphaMode::Premultiplied);
        let mut picture = SafePicture::new(2, 2).unwrap();
        import_pixels(&mut picture, source.layout()).unwrap();
    }
}
