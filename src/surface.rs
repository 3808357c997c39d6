use image::{GrayImage, Luma};

use crate::{config::RecognizerConfig, error::Error};

/// Luminance raster the strokes are drawn on: dark ink over a white background.
pub type Bitmap = GrayImage;

pub const BACKGROUND: u8 = 255;
pub const INK: u8 = 0;

/// A coordinate in canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Screen offset of the drawing element, subtracted from client coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub left: f32,
    pub top: f32,
}

impl Bounds {
    pub fn new(left: f32, top: f32) -> Self {
        Self { left, top }
    }

    pub fn to_local(&self, client: Point) -> Point {
        Point::new(client.x - self.left, client.y - self.top)
    }
}

/// Raw pointer input in client (screen) coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    MouseDown(Point),
    MouseMove(Point),
    MouseUp,
    MouseLeave,
    /// Active touch points; only the first one draws.
    TouchStart(Vec<Point>),
    TouchMove(Vec<Point>),
    TouchEnd,
    TouchCancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventResponse {
    /// The platform's scroll and zoom gestures must be suppressed for this event.
    pub prevent_default: bool,
}

impl EventResponse {
    fn prevent_default() -> Self {
        Self {
            prevent_default: true,
        }
    }
}

/// Freehand drawing surface.
///
/// Strokes are rasterized with round caps and joins: a dot is a filled disc whose
/// diameter is the stroke width and a segment is the capsule swept by that disc.
/// Edges get one pixel of anti-aliased coverage, and overlapping ink never gets
/// lighter, so redrawing the same stroke leaves the raster unchanged.
#[derive(Debug, Clone)]
pub struct DrawingSurface {
    bitmap: Bitmap,
    stroke_width: f32,
    last: Option<Point>,
    empty: bool,
}

impl DrawingSurface {
    /// # Panics
    ///
    /// When the raster would be empty or `stroke_width` is not a positive number.
    pub fn new(width: u32, height: u32, stroke_width: f32) -> Self {
        assert!(
            width > 0 && height > 0,
            "Drawing surface must not be empty, got {width}x{height}"
        );
        assert!(
            stroke_width.is_finite() && stroke_width > 0.0,
            "Stroke width must be positive, got {stroke_width}"
        );

        Self {
            bitmap: GrayImage::from_pixel(width, height, Luma([BACKGROUND])),
            stroke_width,
            last: None,
            empty: true,
        }
    }

    /// Same as [`new`](Self::new), reporting bad dimensions as an error.
    pub fn try_new(width: u32, height: u32, stroke_width: f32) -> Result<Self, Error> {
        if width == 0 || height == 0 || !(stroke_width.is_finite() && stroke_width > 0.0) {
            return Err(Error::InvalidCanvas {
                width,
                height,
                stroke_width,
            });
        }

        Ok(Self::new(width, height, stroke_width))
    }

    pub fn from_config(config: &RecognizerConfig) -> Result<Self, Error> {
        Self::try_new(
            config.canvas_width,
            config.canvas_height,
            config.effective_stroke_width(),
        )
    }

    /// Begins a stroke at `point` and inks a single dot there.
    pub fn start(&mut self, point: Point) {
        self.empty = false;

        if !point.is_finite() {
            self.last = None;
            return;
        }

        self.last = Some(point);
        self.draw_segment(point, point);
    }

    /// Extends the active stroke to `point`.
    ///
    /// Returns `false` without drawing when no stroke is active.
    pub fn continue_stroke(&mut self, point: Point) -> bool {
        let Some(last) = self.last else {
            return false;
        };

        if !point.is_finite() {
            return false;
        }

        self.draw_segment(last, point);
        self.last = Some(point);

        true
    }

    pub fn end(&mut self) {
        self.last = None;
    }

    /// Resets the raster to the background and marks the surface empty.
    pub fn clear(&mut self) {
        self.bitmap
            .pixels_mut()
            .for_each(|pixel| *pixel = Luma([BACKGROUND]));
        self.last = None;
        self.empty = true;
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn is_drawing(&self) -> bool {
        self.last.is_some()
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn width(&self) -> u32 {
        self.bitmap.width()
    }

    pub fn height(&self) -> u32 {
        self.bitmap.height()
    }

    pub fn stroke_width(&self) -> f32 {
        self.stroke_width
    }

    /// Opaque RGBA copy of the raster, row-major, ready to be painted on a canvas.
    pub fn rgba_pixels(&self) -> Vec<u8> {
        self.bitmap
            .pixels()
            .flat_map(|Luma([value])| [*value, *value, *value, u8::MAX])
            .collect()
    }

    /// Applies one input event, with client coordinates relative to `bounds`.
    pub fn handle(&mut self, event: &PointerEvent, bounds: Bounds) -> EventResponse {
        match event {
            PointerEvent::MouseDown(client) => {
                self.start(bounds.to_local(*client));
                EventResponse::default()
            }
            PointerEvent::MouseMove(client) => {
                self.continue_stroke(bounds.to_local(*client));
                EventResponse::default()
            }
            PointerEvent::TouchStart(touches) => match touches.first() {
                Some(touch) => {
                    self.start(bounds.to_local(*touch));
                    EventResponse::prevent_default()
                }
                None => EventResponse::default(),
            },
            PointerEvent::TouchMove(touches) => {
                if !self.is_drawing() {
                    return EventResponse::default();
                }
                if let Some(touch) = touches.first() {
                    self.continue_stroke(bounds.to_local(*touch));
                }
                EventResponse::prevent_default()
            }
            PointerEvent::MouseUp
            | PointerEvent::MouseLeave
            | PointerEvent::TouchEnd
            | PointerEvent::TouchCancel => {
                self.end();
                EventResponse::default()
            }
        }
    }

    /// Subscribes to input for as long as the returned binding lives.
    pub fn bind(&mut self, bounds: Bounds) -> PointerBinding<'_> {
        PointerBinding {
            surface: self,
            bounds,
        }
    }

    fn draw_segment(&mut self, from: Point, to: Point) {
        let radius = self.stroke_width / 2.0;
        let (width, height) = self.bitmap.dimensions();

        // One extra pixel on each side for the anti-aliased edge.
        let margin = radius + 1.0;
        let x_start = (from.x.min(to.x) - margin).floor().max(0.0) as u32;
        let y_start = (from.y.min(to.y) - margin).floor().max(0.0) as u32;
        let x_end = (from.x.max(to.x) + margin).ceil().min(width as f32).max(0.0) as u32;
        let y_end = (from.y.max(to.y) + margin).ceil().min(height as f32).max(0.0) as u32;

        for y in y_start..y_end {
            for x in x_start..x_end {
                let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                let distance = distance_to_segment(center, from, to);
                let coverage = (radius + 0.5 - distance).clamp(0.0, 1.0);

                if coverage <= 0.0 {
                    continue;
                }

                let shade = (f32::from(BACKGROUND) * (1.0 - coverage)).round() as u8;
                let pixel = self.bitmap.get_pixel_mut(x, y);
                pixel.0[0] = pixel.0[0].min(shade);
            }
        }
    }
}

fn distance_to_segment(point: Point, from: Point, to: Point) -> f32 {
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    let length_squared = dx * dx + dy * dy;

    let t = if length_squared == 0.0 {
        0.0
    } else {
        (((point.x - from.x) * dx + (point.y - from.y) * dy) / length_squared).clamp(0.0, 1.0)
    };

    let (px, py) = (from.x + t * dx - point.x, from.y + t * dy - point.y);
    (px * px + py * py).sqrt()
}

/// Live input subscription on a [`DrawingSurface`].
///
/// Dropping the binding unsubscribes and terminates any stroke left active.
pub struct PointerBinding<'a> {
    surface: &'a mut DrawingSurface,
    bounds: Bounds,
}

impl PointerBinding<'_> {
    pub fn dispatch(&mut self, event: &PointerEvent) -> EventResponse {
        self.surface.handle(event, self.bounds)
    }

    /// Updates the element offset, e.g. after the page scrolled.
    pub fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
    }

    pub fn surface(&self) -> &DrawingSurface {
        self.surface
    }
}

impl Drop for PointerBinding<'_> {
    fn drop(&mut self) {
        self.surface.end();
    }
}
