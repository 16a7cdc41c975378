use common::raster::{is_valid_brush_width, CANVAS_HEIGHT, CANVAS_WIDTH, ERASER_WIDTH};
use common::{Color, Point, StrokeStyle};
use image::{imageops, DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("brush width {0} is outside the selectable range")]
    InvalidBrushWidth(f64),
}

#[derive(Debug, Clone, Copy)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    /// Filled once when the surface is created; `None` leaves it transparent.
    pub background: Option<Color>,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
            background: Some(Color::WHITE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    Jpeg,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
        }
    }
}

/// The persistent raster surface and the pen drawing on it.
pub struct Canvas {
    surface: RgbaImage,
    /// Color the eraser paints with.
    background: Color,
    style: StrokeStyle,
    eraser: bool,
    pen: Option<Pen>,
}

/// The gesture in progress.
#[derive(Debug, Clone, Copy)]
struct Pen {
    last: Point,
    /// Eraser mode as it was at press; holds for the whole gesture.
    eraser: bool,
}

impl Canvas {
    pub fn new(config: &CanvasConfig) -> Self {
        let surface = match config.background {
            Some(color) => RgbaImage::from_pixel(config.width, config.height, Rgba(color.to_rgba())),
            None => RgbaImage::new(config.width, config.height),
        };
        Self {
            surface,
            background: config.background.unwrap_or(Color::WHITE),
            style: StrokeStyle::default(),
            eraser: false,
            pen: None,
        }
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn style(&self) -> StrokeStyle {
        self.style
    }

    pub fn eraser(&self) -> bool {
        self.eraser
    }

    pub fn is_drawing(&self) -> bool {
        self.pen.is_some()
    }

    pub fn set_color(&mut self, color: Color) {
        self.style.color = color;
    }

    pub fn set_brush_width(&mut self, width: f64) -> Result<(), CanvasError> {
        if !is_valid_brush_width(width) {
            return Err(CanvasError::InvalidBrushWidth(width));
        }
        self.style.width = width;
        Ok(())
    }

    pub fn set_eraser(&mut self, enabled: bool) {
        self.eraser = enabled;
    }

    /// Start a path at `point`. Nothing is painted until the pen moves.
    pub fn press(&mut self, point: Point) {
        self.pen = Some(Pen {
            last: point,
            eraser: self.eraser,
        });
    }

    /// Paint the segment from the previous point to `point`. Color and width
    /// are read per segment; eraser mode is the one latched at press.
    /// Returns false when no gesture is in progress.
    pub fn drag_to(&mut self, point: Point) -> bool {
        let Some(pen) = self.pen else {
            return false;
        };
        let (color, width) = if pen.eraser {
            (self.background, ERASER_WIDTH)
        } else {
            (self.style.color, self.style.width)
        };
        self.stroke_segment(pen.last, point, color, width);
        self.pen = Some(Pen { last: point, ..pen });
        true
    }

    pub fn release(&mut self) {
        self.pen = None;
    }

    /// Rasterize a segment as a capsule: every pixel whose center lies within
    /// `width / 2` of the segment. This gives round caps, and consecutive
    /// segments sharing an endpoint get round joins.
    fn stroke_segment(&mut self, a: Point, b: Point, color: Color, width: f64) {
        let radius = width / 2.0;
        let max_x = self.surface.width() as f64 - 1.0;
        let max_y = self.surface.height() as f64 - 1.0;

        let x0 = (a.x.min(b.x) - radius).floor().max(0.0);
        let x1 = (a.x.max(b.x) + radius).ceil().min(max_x);
        let y0 = (a.y.min(b.y) - radius).floor().max(0.0);
        let y1 = (a.y.max(b.y) + radius).ceil().min(max_y);
        if x0 > x1 || y0 > y1 {
            return;
        }

        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let len_sq = dx * dx + dy * dy;
        let pixel = Rgba(color.to_rgba());

        for py in y0 as u32..=y1 as u32 {
            for px in x0 as u32..=x1 as u32 {
                let cx = px as f64 + 0.5;
                let cy = py as f64 + 0.5;
                let t = if len_sq == 0.0 {
                    0.0
                } else {
                    (((cx - a.x) * dx + (cy - a.y) * dy) / len_sq).clamp(0.0, 1.0)
                };
                let (nx, ny) = (a.x + t * dx, a.y + t * dy);
                if (cx - nx).powi(2) + (cy - ny).powi(2) <= radius * radius {
                    self.surface.put_pixel(px, py, pixel);
                }
            }
        }
    }

    /// Replace the whole raster: clear it, then draw `image` at the origin.
    pub fn restore(&mut self, image: &RgbaImage) {
        for pixel in self.surface.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
        imageops::replace(&mut self.surface, image, 0, 0);
    }

    /// Encode the finished raster for download or upload.
    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>, CanvasError> {
        let mut buf = Cursor::new(Vec::new());
        match format {
            ExportFormat::Png => self.surface.write_to(&mut buf, ImageFormat::Png)?,
            ExportFormat::Jpeg => {
                // JPEG has no alpha channel.
                DynamicImage::ImageRgba8(self.surface.clone())
                    .to_rgb8()
                    .write_to(&mut buf, ImageFormat::Jpeg)?
            }
        }
        Ok(buf.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Snapshot;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn small() -> Canvas {
        Canvas::new(&CanvasConfig {
            width: 40,
            height: 40,
            background: Some(Color::WHITE),
        })
    }

    #[test]
    fn test_background_filled_once_at_creation() {
        let canvas = small();
        assert!(canvas.surface().pixels().all(|p| *p == WHITE));

        let bare = Canvas::new(&CanvasConfig {
            width: 4,
            height: 4,
            background: None,
        });
        assert!(bare.surface().pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn test_press_alone_paints_nothing() {
        let mut canvas = small();
        canvas.press(Point::new(10.0, 10.0));
        assert!(canvas.is_drawing());
        assert!(canvas.surface().pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn test_segment_is_drawn_with_round_caps() {
        let mut canvas = small();
        canvas.press(Point::new(10.0, 20.0));
        assert!(canvas.drag_to(Point::new(30.0, 20.0)));

        assert_eq!(*canvas.surface().get_pixel(20, 20), BLACK);
        // Round cap extends past the endpoint by the radius.
        assert_eq!(*canvas.surface().get_pixel(32, 19), BLACK);
        // Corner of the cap's bounding box stays untouched.
        assert_eq!(*canvas.surface().get_pixel(33, 24), WHITE);
        // Outside the stroke width.
        assert_eq!(*canvas.surface().get_pixel(20, 26), WHITE);
    }

    #[test]
    fn test_move_without_press_is_ignored() {
        let mut canvas = small();
        assert!(!canvas.drag_to(Point::new(5.0, 5.0)));
        canvas.press(Point::new(1.0, 1.0));
        canvas.release();
        assert!(!canvas.drag_to(Point::new(5.0, 5.0)));
        assert!(canvas.surface().pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn test_color_read_per_segment() {
        let mut canvas = small();
        canvas.press(Point::new(5.0, 5.0));
        canvas.drag_to(Point::new(5.0, 15.0));
        canvas.set_color(Color::RED);
        canvas.drag_to(Point::new(5.0, 35.0));

        assert_eq!(*canvas.surface().get_pixel(5, 8), BLACK);
        assert_eq!(*canvas.surface().get_pixel(5, 30), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_eraser_paints_background_at_eraser_width() {
        let mut canvas = small();
        canvas.press(Point::new(0.0, 20.0));
        canvas.drag_to(Point::new(40.0, 20.0));
        canvas.release();

        canvas.set_eraser(true);
        canvas.press(Point::new(20.0, 0.0));
        canvas.drag_to(Point::new(20.0, 40.0));
        assert_eq!(*canvas.surface().get_pixel(20, 20), WHITE);
        // Eraser is 10 wide, the brush line survives further out.
        assert_eq!(*canvas.surface().get_pixel(14, 20), WHITE);
        assert_eq!(*canvas.surface().get_pixel(8, 20), BLACK);
    }

    #[test]
    fn test_eraser_toggle_waits_for_next_gesture() {
        let mut canvas = small();
        canvas.press(Point::new(4.0, 24.0));
        canvas.drag_to(Point::new(20.0, 24.0));
        canvas.set_eraser(true);
        canvas.drag_to(Point::new(36.0, 24.0));
        canvas.release();
        assert_eq!(*canvas.surface().get_pixel(10, 24), BLACK);
        assert_eq!(*canvas.surface().get_pixel(30, 24), BLACK);

        // The next gesture erases.
        canvas.press(Point::new(30.0, 14.0));
        canvas.set_eraser(false);
        canvas.drag_to(Point::new(30.0, 34.0));
        assert_eq!(*canvas.surface().get_pixel(30, 24), WHITE);
        assert_eq!(*canvas.surface().get_pixel(10, 24), BLACK);
    }

    #[test]
    fn test_segments_off_canvas_are_clipped() {
        let mut canvas = small();
        canvas.press(Point::new(-100.0, -100.0));
        assert!(canvas.drag_to(Point::new(-50.0, -60.0)));
        assert!(canvas.surface().pixels().all(|p| *p == WHITE));

        canvas.drag_to(Point::new(1_000.0, 1_000.0));
        assert_eq!(*canvas.surface().get_pixel(20, 20), BLACK);
    }

    #[test]
    fn test_brush_width_validation() {
        let mut canvas = small();
        assert!(canvas.set_brush_width(12.0).is_ok());
        assert_eq!(canvas.style().width, 12.0);
        assert!(matches!(
            canvas.set_brush_width(60.0),
            Err(CanvasError::InvalidBrushWidth(_))
        ));
        assert_eq!(canvas.style().width, 12.0);
    }

    #[test]
    fn test_restore_replaces_surface() {
        let mut canvas = small();
        let before = Snapshot::encode(canvas.surface()).unwrap();
        canvas.press(Point::new(0.0, 0.0));
        canvas.drag_to(Point::new(39.0, 39.0));
        assert_ne!(canvas.surface(), &before.decode().unwrap());

        canvas.restore(&before.decode().unwrap());
        assert!(canvas.surface().pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn test_export_formats() {
        let canvas = small();
        let png = canvas.export(ExportFormat::Png).unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
        let jpeg = canvas.export(ExportFormat::Jpeg).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    }
}
