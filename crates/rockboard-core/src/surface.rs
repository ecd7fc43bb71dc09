//! The local drawing surface laid over the live video.

use crate::event::is_laid_out;
use kurbo::{Point, Rect, Size};
use thiserror::Error;

/// Surface errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("Canvas has not been laid out yet")]
    ZeroDimensionCanvas,
}

/// Per-client canvas. Its pixel size belongs to this client alone and is
/// only known once the layout pass has measured it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocalCanvasSurface {
    size: Option<Size>,
}

impl LocalCanvasSurface {
    /// A surface that has not been measured yet.
    pub fn unmeasured() -> Self {
        Self::default()
    }

    /// A surface already laid out at `width` x `height`.
    pub fn with_size(width: f64, height: f64) -> Self {
        let mut surface = Self::default();
        surface.measure(width, height);
        surface
    }

    /// Record the layout result. Non-positive sizes leave the surface unmeasured.
    /// Returns whether the surface is now measured.
    pub fn measure(&mut self, width: f64, height: f64) -> bool {
        let size = Size::new(width, height);
        if is_laid_out(size) {
            self.size = Some(size);
            true
        } else {
            log::warn!("Ignoring canvas layout of {}x{}", width, height);
            self.size = None;
            false
        }
    }

    /// Check if the layout is known.
    pub fn is_measured(&self) -> bool {
        self.size.is_some()
    }

    /// Current pixel size.
    pub fn size(&self) -> Result<Size, SurfaceError> {
        self.size.ok_or(SurfaceError::ZeroDimensionCanvas)
    }

    /// Canvas bounds in local pixels.
    pub fn bounds(&self) -> Option<Rect> {
        self.size.map(|size| Rect::from_origin_size(Point::ORIGIN, size))
    }

    /// Whether a local point falls on the canvas.
    pub fn contains(&self, point: Point) -> bool {
        self.bounds().is_some_and(|rect| rect.contains(point))
    }
}
