use std::sync::Arc;

use arc_swap::ArcSwap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ViewTransformError {
    #[error("drawing surface must have a positive area")]
    EmptySurface,
}

/// Fixed logical size of the drawing surface, in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    width: u32,
    height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Result<Self, ViewTransformError> {
        if width == 0 || height == 0 {
            return Err(ViewTransformError::EmptySurface);
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Fit-center mapping of the surface into the display viewport.
///
/// The surface is scaled uniformly to the largest size that fits the viewport
/// without cropping and centered; the excess axis gets equal margins. The
/// scale is always positive, so the transform is always invertible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitCenterTransform {
    surface: SurfaceSize,
    viewport_width: f32,
    viewport_height: f32,
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl FitCenterTransform {
    pub fn recompute(surface: SurfaceSize, viewport_width: f32, viewport_height: f32) -> Self {
        let viewport_width = clamp_viewport_extent(viewport_width);
        let viewport_height = clamp_viewport_extent(viewport_height);
        let surface_width = surface.width as f32;
        let surface_height = surface.height as f32;

        let scale = (viewport_width / surface_width).min(viewport_height / surface_height);
        let offset_x = (viewport_width - surface_width * scale) * 0.5;
        let offset_y = (viewport_height - surface_height * scale) * 0.5;

        Self {
            surface,
            viewport_width,
            viewport_height,
            scale,
            offset_x,
            offset_y,
        }
    }

    /// Transform where the viewport matches the surface one to one.
    pub fn identity(surface: SurfaceSize) -> Self {
        Self::recompute(surface, surface.width as f32, surface.height as f32)
    }

    pub fn surface(&self) -> SurfaceSize {
        self.surface
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn offset_x(&self) -> f32 {
        self.offset_x
    }

    pub fn offset_y(&self) -> f32 {
        self.offset_y
    }

    pub fn viewport_size(&self) -> (f32, f32) {
        (self.viewport_width, self.viewport_height)
    }

    /// Display point to surface point. `None` when the point lands outside the
    /// surface rectangle (edges inclusive) or is not finite.
    pub fn to_surface(&self, display_x: f32, display_y: f32) -> Option<(f32, f32)> {
        if !display_x.is_finite() || !display_y.is_finite() {
            return None;
        }
        let surface_x = (display_x - self.offset_x) / self.scale;
        let surface_y = (display_y - self.offset_y) / self.scale;
        let inside = (0.0..=self.surface.width as f32).contains(&surface_x)
            && (0.0..=self.surface.height as f32).contains(&surface_y);
        inside.then_some((surface_x, surface_y))
    }

    pub fn to_display(&self, surface_x: f32, surface_y: f32) -> (f32, f32) {
        (
            surface_x * self.scale + self.offset_x,
            surface_y * self.scale + self.offset_y,
        )
    }

    /// Per-axis scale for a full-screen quad in normalized device coordinates
    /// that shows the surface with its aspect ratio preserved.
    pub fn ndc_scale(&self) -> (f32, f32) {
        (
            self.surface.width as f32 * self.scale / self.viewport_width,
            self.surface.height as f32 * self.scale / self.viewport_height,
        )
    }
}

fn clamp_viewport_extent(extent: f32) -> f32 {
    if extent.is_finite() && extent >= 1.0 {
        return extent;
    }
    log::debug!("degenerate viewport extent {extent}, clamping to 1");
    1.0
}

/// Owner of the current transform, shared between the input and render sides.
///
/// Resizes replace the whole transform atomically; readers take one snapshot
/// per event so scale and offsets always come from the same recompute.
#[derive(Debug)]
pub struct ViewportMapper {
    surface: SurfaceSize,
    current: ArcSwap<FitCenterTransform>,
}

impl ViewportMapper {
    pub fn new(surface: SurfaceSize) -> Self {
        Self {
            surface,
            current: ArcSwap::from_pointee(FitCenterTransform::identity(surface)),
        }
    }

    pub fn surface(&self) -> SurfaceSize {
        self.surface
    }

    pub fn recompute(&self, viewport_width: f32, viewport_height: f32) -> Arc<FitCenterTransform> {
        let transform = Arc::new(FitCenterTransform::recompute(
            self.surface,
            viewport_width,
            viewport_height,
        ));
        self.current.store(Arc::clone(&transform));
        transform
    }

    pub fn snapshot(&self) -> Arc<FitCenterTransform> {
        self.current.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_surface() -> SurfaceSize {
        SurfaceSize::new(1024, 800).expect("surface size")
    }

    #[test]
    fn fit_center_uses_smaller_axis_ratio_and_centers() {
        let transform = FitCenterTransform::recompute(reference_surface(), 600.0, 300.0);

        assert_eq!(transform.scale(), 0.375);
        assert_eq!(transform.offset_x(), 108.0);
        assert_eq!(transform.offset_y(), 0.0);
        assert_eq!(transform.to_display(512.0, 400.0), (300.0, 150.0));
        assert_eq!(transform.to_surface(300.0, 150.0), Some((512.0, 400.0)));
    }

    #[test]
    fn to_surface_rejects_points_in_margins() {
        let transform = FitCenterTransform::recompute(reference_surface(), 600.0, 300.0);

        assert_eq!(transform.to_surface(50.0, 150.0), None);
        assert_eq!(transform.to_surface(560.0, 150.0), None);
        assert_eq!(transform.to_surface(108.0, 0.0), Some((0.0, 0.0)));
        assert_eq!(transform.to_surface(492.0, 300.0), Some((1024.0, 800.0)));
        assert_eq!(transform.to_surface(f32::NAN, 10.0), None);
    }

    #[test]
    fn degenerate_viewport_is_clamped_to_one_pixel() {
        let transform = FitCenterTransform::recompute(reference_surface(), 0.0, -5.0);

        assert_eq!(transform.viewport_size(), (1.0, 1.0));
        assert!(transform.scale() > 0.0);
        let (display_x, display_y) = transform.to_display(1024.0, 800.0);
        let back = transform
            .to_surface(display_x, display_y)
            .expect("corner maps back inside");
        assert!((back.0 - 1024.0).abs() < 1e-2);
        assert!((back.1 - 800.0).abs() < 1e-2);
    }

    #[test]
    fn ndc_scale_limits_the_wider_axis() {
        let wide = FitCenterTransform::recompute(reference_surface(), 600.0, 300.0);
        let (scale_x, scale_y) = wide.ndc_scale();
        assert!((scale_x - 0.64).abs() < 1e-6);
        assert!((scale_y - 1.0).abs() < 1e-6);

        let tall = FitCenterTransform::recompute(reference_surface(), 512.0, 800.0);
        let (scale_x, scale_y) = tall.ndc_scale();
        assert!((scale_x - 1.0).abs() < 1e-6);
        assert!((scale_y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn empty_surface_is_rejected() {
        assert_eq!(
            SurfaceSize::new(0, 10),
            Err(ViewTransformError::EmptySurface)
        );
    }

    #[test]
    fn mapper_snapshot_survives_later_resize() {
        let mapper = ViewportMapper::new(reference_surface());
        assert_eq!(mapper.snapshot().scale(), 1.0);

        mapper.recompute(600.0, 300.0);
        let before = mapper.snapshot();
        mapper.recompute(2048.0, 1600.0);

        assert_eq!(before.scale(), 0.375);
        assert_eq!(mapper.snapshot().scale(), 2.0);
    }
}
