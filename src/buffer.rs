// src/buffer.rs
//
// Pixel buffers exchanged with the engine, and the image-source capability
// that lets caller-side image types feed the encoder.

use crate::error::{Result, WebpError};
use crate::geometry::{PlaneLayout, Rect};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use std::borrow::Cow;

/// How colour channels relate to alpha in a 4-channel buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlphaMode {
    /// Colour is independent of alpha (NRGBA).
    #[default]
    Straight,
    /// Colour is already multiplied by alpha.
    Premultiplied,
}

/// Planar colour space tag. Decides whether an alpha plane exists at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSpace {
    /// 4:2:0 luma + chroma
    Yuv420,
    /// 4:2:0 luma + chroma + full-resolution alpha
    Yuv420A,
}

impl ColorSpace {
    pub fn has_alpha(self) -> bool {
        matches!(self, ColorSpace::Yuv420A)
    }
}

fn check_interleaved(
    width: u32,
    height: u32,
    stride: usize,
    len: usize,
    channels: usize,
) -> Result<()> {
    let row = (width as usize)
        .checked_mul(channels)
        .ok_or_else(|| WebpError::invalid_buffer("row size overflow"))?;
    if stride < row {
        return Err(WebpError::invalid_buffer(format!(
            "stride {stride} is smaller than {width} pixels x {channels} channels"
        )));
    }
    let expected = stride
        .checked_mul(height as usize)
        .ok_or_else(|| WebpError::invalid_buffer("buffer size overflow"))?;
    if len != expected {
        return Err(WebpError::invalid_buffer(format!(
            "buffer holds {len} bytes, expected stride {stride} x height {height} = {expected}"
        )));
    }
    Ok(())
}

macro_rules! interleaved_common {
    ($ty:ident, $channels:expr) => {
        impl $ty {
            pub const CHANNELS: usize = $channels;

            pub fn rect(&self) -> Rect {
                self.rect
            }

            pub fn width(&self) -> u32 {
                self.rect.width()
            }

            pub fn height(&self) -> u32 {
                self.rect.height()
            }

            pub fn stride(&self) -> usize {
                self.stride
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.pixels
            }

            pub fn as_bytes_mut(&mut self) -> &mut [u8] {
                &mut self.pixels
            }

            pub fn into_raw(self) -> Vec<u8> {
                self.pixels
            }

            /// Channel values of the pixel at `(x, y)`, relative to the buffer origin.
            pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
                if x >= self.width() || y >= self.height() {
                    return None;
                }
                let start = y as usize * self.stride + x as usize * Self::CHANNELS;
                self.pixels.get(start..start + Self::CHANNELS)
            }

            /// Copy the visible rows into a tightly packed vector.
            fn packed_rows(&self) -> Vec<u8> {
                let row = self.width() as usize * Self::CHANNELS;
                if row == self.stride {
                    return self.pixels.clone();
                }
                let mut out = Vec::with_capacity(row * self.height() as usize);
                for line in self.pixels.chunks(self.stride).take(self.height() as usize) {
                    out.extend_from_slice(&line[..row]);
                }
                out
            }
        }
    };
}

/// Interleaved 8-bit RGB.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbBuffer {
    rect: Rect,
    stride: usize,
    pixels: Vec<u8>,
}

interleaved_common!(RgbBuffer, 3);

impl RgbBuffer {
    /// Zero-filled, tightly packed buffer covering `rect`.
    pub fn new(rect: Rect) -> Self {
        let stride = rect.width() as usize * Self::CHANNELS;
        Self {
            rect,
            stride,
            pixels: vec![0; stride * rect.height() as usize],
        }
    }

    pub fn from_raw(width: u32, height: u32, stride: usize, pixels: Vec<u8>) -> Result<Self> {
        check_interleaved(width, height, stride, pixels.len(), Self::CHANNELS)?;
        Ok(Self {
            rect: Rect::from_size(width, height),
            stride,
            pixels,
        })
    }

    pub fn into_image(self) -> Option<RgbImage> {
        let (w, h) = (self.width(), self.height());
        RgbImage::from_raw(w, h, self.packed_rows())
    }
}

/// Interleaved 8-bit RGBA, straight or premultiplied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbaBuffer {
    rect: Rect,
    stride: usize,
    pixels: Vec<u8>,
    alpha: AlphaMode,
}

interleaved_common!(RgbaBuffer, 4);

impl RgbaBuffer {
    pub fn new(rect: Rect, alpha: AlphaMode) -> Self {
        let stride = rect.width() as usize * Self::CHANNELS;
        Self {
            rect,
            stride,
            pixels: vec![0; stride * rect.height() as usize],
            alpha,
        }
    }

    pub fn from_raw(
        width: u32,
        height: u32,
        stride: usize,
        pixels: Vec<u8>,
        alpha: AlphaMode,
    ) -> Result<Self> {
        check_interleaved(width, height, stride, pixels.len(), Self::CHANNELS)?;
        Ok(Self {
            rect: Rect::from_size(width, height),
            stride,
            pixels,
            alpha,
        })
    }

    pub fn alpha_mode(&self) -> AlphaMode {
        self.alpha
    }

    /// Convert to an `image::RgbaImage`. Premultiplied buffers are returned as-is;
    /// the `image` crate does not track the distinction.
    pub fn into_image(self) -> Option<RgbaImage> {
        let (w, h) = (self.width(), self.height());
        RgbaImage::from_raw(w, h, self.packed_rows())
    }
}

/// Interleaved 8-bit luma-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayBuffer {
    rect: Rect,
    stride: usize,
    pixels: Vec<u8>,
}

interleaved_common!(GrayBuffer, 1);

impl GrayBuffer {
    pub fn new(rect: Rect) -> Self {
        let stride = rect.width() as usize;
        Self {
            rect,
            stride,
            pixels: vec![0; stride * rect.height() as usize],
        }
    }

    pub fn from_raw(width: u32, height: u32, stride: usize, pixels: Vec<u8>) -> Result<Self> {
        check_interleaved(width, height, stride, pixels.len(), Self::CHANNELS)?;
        Ok(Self {
            rect: Rect::from_size(width, height),
            stride,
            pixels,
        })
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        if x < self.width() && y < self.height() {
            self.pixels[y as usize * self.stride + x as usize] = value;
        }
    }

    pub fn into_image(self) -> Option<GrayImage> {
        let (w, h) = (self.width(), self.height());
        GrayImage::from_raw(w, h, self.packed_rows())
    }
}

/// 4:2:0 planar image with an optional alpha plane, all planes in one allocation.
///
/// The colour-space tag and the presence of the alpha plane always agree:
/// `Yuv420A` images have an alpha plane of luma size, `Yuv420` images have none.
///
/// The RGB/YCbCr conversion used by the engine follows ITU-R BT.601, which is
/// not the JFIF variant used by JPEG.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YuvaImage {
    rect: Rect,
    color_space: ColorSpace,
    layout: PlaneLayout,
    data: Vec<u8>,
}

impl YuvaImage {
    /// Allocate a zero-filled planar image covering `rect`.
    pub fn new(rect: Rect, color_space: ColorSpace) -> Self {
        let layout = PlaneLayout::compute(rect, color_space.has_alpha());
        Self {
            rect,
            color_space,
            layout,
            data: vec![0; layout.total_len()],
        }
    }

    /// Wrap an existing `Y | Cb | Cr | [A]` allocation.
    pub fn from_parts(rect: Rect, color_space: ColorSpace, data: Vec<u8>) -> Result<Self> {
        let layout = PlaneLayout::compute(rect, color_space.has_alpha());
        if data.len() != layout.total_len() {
            return Err(WebpError::invalid_buffer(format!(
                "planar buffer holds {} bytes, layout needs {}",
                data.len(),
                layout.total_len()
            )));
        }
        Ok(Self {
            rect,
            color_space,
            layout,
            data,
        })
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn width(&self) -> u32 {
        self.layout.luma_width
    }

    pub fn height(&self) -> u32 {
        self.layout.luma_height
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn layout(&self) -> PlaneLayout {
        self.layout
    }

    pub fn y_stride(&self) -> usize {
        self.layout.y_stride()
    }

    pub fn c_stride(&self) -> usize {
        self.layout.c_stride()
    }

    pub fn a_stride(&self) -> usize {
        self.layout.a_stride()
    }

    pub fn y(&self) -> &[u8] {
        &self.data[..self.layout.y_len()]
    }

    pub fn cb(&self) -> &[u8] {
        let start = self.layout.cb_offset();
        &self.data[start..start + self.layout.c_len()]
    }

    pub fn cr(&self) -> &[u8] {
        let start = self.layout.cr_offset();
        &self.data[start..start + self.layout.c_len()]
    }

    pub fn a(&self) -> Option<&[u8]> {
        if !self.color_space.has_alpha() {
            return None;
        }
        Some(&self.data[self.layout.a_offset()..])
    }

    pub fn y_mut(&mut self) -> &mut [u8] {
        let end = self.layout.y_len();
        &mut self.data[..end]
    }

    pub fn cb_mut(&mut self) -> &mut [u8] {
        let start = self.layout.cb_offset();
        let end = start + self.layout.c_len();
        &mut self.data[start..end]
    }

    pub fn cr_mut(&mut self) -> &mut [u8] {
        let start = self.layout.cr_offset();
        let end = start + self.layout.c_len();
        &mut self.data[start..end]
    }

    pub fn a_mut(&mut self) -> Option<&mut [u8]> {
        if !self.color_space.has_alpha() {
            return None;
        }
        let start = self.layout.a_offset();
        Some(&mut self.data[start..])
    }

    /// The whole backing allocation, `Y | Cb | Cr | [A]`.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Disjoint mutable views of all planes, for writing the whole image at once.
    pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8], Option<&mut [u8]>) {
        let layout = self.layout;
        let has_alpha = self.color_space.has_alpha();
        let (y, rest) = self.data.split_at_mut(layout.y_len());
        let (cb, rest) = rest.split_at_mut(layout.c_len());
        let (cr, a) = rest.split_at_mut(layout.c_len());
        (y, cb, cr, if has_alpha { Some(a) } else { None })
    }
}

/// Borrowed view of an image's pixels in one of the representations the
/// encoder can import.
#[derive(Debug)]
pub enum PixelLayout<'a> {
    Rgb {
        pixels: &'a [u8],
        stride: usize,
    },
    Rgba {
        pixels: &'a [u8],
        stride: usize,
        alpha: AlphaMode,
    },
    /// Luma-only; encoded with neutral chroma.
    Gray {
        pixels: &'a [u8],
        stride: usize,
    },
    Yuva(&'a YuvaImage),
    /// A representation the encoder cannot import.
    Unsupported { description: Cow<'static, str> },
}

/// Anything that can describe its pixels to the encoder.
pub trait ImageSource {
    /// `(width, height)` in pixels.
    fn dimensions(&self) -> (u32, u32);

    fn layout(&self) -> PixelLayout<'_>;
}

impl<T: ImageSource + ?Sized> ImageSource for &T {
    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn layout(&self) -> PixelLayout<'_> {
        (**self).layout()
    }
}

impl ImageSource for RgbBuffer {
    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    fn layout(&self) -> PixelLayout<'_> {
        PixelLayout::Rgb {
            pixels: &self.pixels,
            stride: self.stride,
        }
    }
}

impl ImageSource for RgbaBuffer {
    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    fn layout(&self) -> PixelLayout<'_> {
        PixelLayout::Rgba {
            pixels: &self.pixels,
            stride: self.stride,
            alpha: self.alpha,
        }
    }
}

impl ImageSource for GrayBuffer {
    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    fn layout(&self) -> PixelLayout<'_> {
        PixelLayout::Gray {
            pixels: &self.pixels,
            stride: self.stride,
        }
    }
}

impl ImageSource for YuvaImage {
    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    fn layout(&self) -> PixelLayout<'_> {
        PixelLayout::Yuva(self)
    }
}

impl ImageSource for RgbImage {
    fn dimensions(&self) -> (u32, u32) {
        RgbImage::dimensions(self)
    }

    fn layout(&self) -> PixelLayout<'_> {
        PixelLayout::Rgb {
            pixels: self.as_raw(),
            stride: self.width() as usize * 3,
        }
    }
}

impl ImageSource for RgbaImage {
    fn dimensions(&self) -> (u32, u32) {
        RgbaImage::dimensions(self)
    }

    fn layout(&self) -> PixelLayout<'_> {
        PixelLayout::Rgba {
            pixels: self.as_raw(),
            stride: self.width() as usize * 4,
            alpha: AlphaMode::Straight,
        }
    }
}

impl ImageSource for GrayImage {
    fn dimensions(&self) -> (u32, u32) {
        GrayImage::dimensions(self)
    }

    fn layout(&self) -> PixelLayout<'_> {
        PixelLayout::Gray {
            pixels: self.as_raw(),
            stride: self.width() as usize,
        }
    }
}

impl ImageSource for DynamicImage {
    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    fn layout(&self) -> PixelLayout<'_> {
        match self {
            DynamicImage::ImageRgb8(img) => img.layout(),
            DynamicImage::ImageRgba8(img) => img.layout(),
            DynamicImage::ImageLuma8(img) => img.layout(),
            other => PixelLayout::Unsupported {
                description: Cow::Owned(format!("{:?}", other.color())),
            },
        }
    }
}

impl From<RgbImage> for RgbBuffer {
    fn from(img: RgbImage) -> Self {
        let (w, h) = img.dimensions();
        Self {
            rect: Rect::from_size(w, h),
            stride: w as usize * 3,
            pixels: img.into_raw(),
        }
    }
}

impl From<RgbaImage> for RgbaBuffer {
    fn from(img: RgbaImage) -> Self {
        let (w, h) = img.dimensions();
        Self {
            rect: Rect::from_size(w, h),
            stride: w as usize * 4,
            pixels: img.into_raw(),
            alpha: AlphaMode::Straight,
        }
    }
}

impl From<GrayImage> for GrayBuffer {
    fn from(img: GrayImage) -> Self {
        let (w, h) = img.dimensions();
        Self {
            rect: Rect::from_size(w, h),
            stride: w as usize,
            pixels: img.into_raw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_rejects_short_stride() {
        let err = RgbBuffer::from_raw(4, 2, 11, vec![0; 22]).unwrap_err();
        assert!(err.to_string().contains("stride 11"));
    }

    #[test]
    fn from_raw_rejects_length_mismatch() {
        let err =
            RgbaBuffer::from_raw(2, 2, 8, vec![0; 15], AlphaMode::Straight).unwrap_err();
        assert!(err.to_string().contains("expected stride 8 x height 2 = 16"));
    }

    #[test]
    fn padded_stride_is_accepted_and_packed_on_conversion() {
        // 2x2 gray with one byte of row padding
        let buf = GrayBuffer::from_raw(2, 2, 3, vec![1, 2, 99, 3, 4, 99]).unwrap();
        assert_eq!(buf.pixel(1, 1), Some(&[4u8][..]));
        let img = buf.into_image().unwrap();
        assert_eq!(img.as_raw(), &vec![1, 2, 3, 4]);
    }

    #[test]
    fn pixel_out_of_bounds_is_none() {
        let buf = RgbBuffer::new(Rect::from_size(3, 3));
        assert!(buf.pixel(3, 0).is_none());
        assert_eq!(buf.pixel(2, 2), Some(&[0u8, 0, 0][..]));
    }

    #[test]
    fn yuva_planes_match_layout() {
        let img = YuvaImage::new(Rect::from_size(5, 3), ColorSpace::Yuv420A);
        assert_eq!(img.y().len(), 15);
        assert_eq!(img.cb().len(), 3 * 2);
        assert_eq!(img.cr().len(), 3 * 2);
        assert_eq!(img.a().map(<[u8]>::len), Some(15));
        assert_eq!(img.as_bytes().len(), img.layout().total_len());
    }

    #[test]
    fn reversed_rect_literal_gives_empty_planes() {
        let rect = Rect {
            min_x: 5,
            min_y: 0,
            max_x: 1,
            max_y: 4,
        };
        let img = YuvaImage::new(rect, ColorSpace::Yuv420);
        assert_eq!((img.width(), img.height()), (0, 4));
        assert!(img.y().is_empty());
        assert!(img.cb().is_empty());
        assert!(img.as_bytes().is_empty());
    }

    #[test]
    fn yuv_without_alpha_has_no_alpha_plane() {
        let mut img = YuvaImage::new(Rect::from_size(4, 4), ColorSpace::Yuv420);
        assert!(img.a().is_none());
        assert!(img.a_mut().is_none());
        assert_eq!(img.a_stride(), 0);
        let (y, cb, cr, a) = img.planes_mut();
        assert_eq!((y.len(), cb.len(), cr.len()), (16, 4, 4));
        assert!(a.is_none());
    }

    #[test]
    fn from_parts_checks_length() {
        let rect = Rect::from_size(3, 3);
        let err = YuvaImage::from_parts(rect, ColorSpace::Yuv420, vec![0; 16]).unwrap_err();
        assert!(err.to_string().contains("layout needs 17"));
        assert!(YuvaImage::from_parts(rect, ColorSpace::Yuv420, vec![0; 17]).is_ok());
    }

    #[test]
    fn plane_writes_do_not_overlap() {
        let mut img = YuvaImage::new(Rect::from_size(3, 3), ColorSpace::Yuv420A);
        img.y_mut().fill(1);
        img.cb_mut().fill(2);
        img.cr_mut().fill(3);
        img.a_mut().unwrap().fill(4);
        assert!(img.y().iter().all(|&v| v == 1));
        assert!(img.cb().iter().all(|&v| v == 2));
        assert!(img.cr().iter().all(|&v| v == 3));
        assert!(img.a().unwrap().iter().all(|&v| v == 4));
    }

    #[test]
    fn dynamic_image_dispatch() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        assert!(matches!(rgb.layout(), PixelLayout::Rgb { stride: 6, .. }));

        let gray = DynamicImage::ImageLuma8(GrayImage::new(2, 2));
        assert!(matches!(gray.layout(), PixelLayout::Gray { stride: 2, .. }));

        let la = DynamicImage::ImageLumaA8(image::GrayAlphaImage::new(2, 2));
        assert!(matches!(la.layout(), PixelLayout::Unsupported { .. }));
    }

    #[test]
    fn image_crate_round_trip() {
        let img = RgbaImage::from_fn(3, 2, |x, y| image::Rgba([x as u8, y as u8, 7, 255]));
        let buf = RgbaBuffer::from(img.clone());
        assert_eq!(buf.alpha_mode(), AlphaMode::Straight);
        assert_eq!(buf.into_image().unwrap(), img);
    }
}
