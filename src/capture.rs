//! Screenshots of the composited fluid.

use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::backend::{Filter, GraphicsBackend, TextureFormat};
use crate::context::FormatPair;
use crate::error::FluidResult;
use crate::framebuffer::{create_target, release_target};
use crate::simulation::SimulationContext;

/// Converts bottom-up float texels into a top-down 8-bit image.
pub fn texels_to_image(pixels: &[[f32; 4]], width: u32, height: u32) -> RgbaImage {
    let mut raw = Vec::with_capacity((width * height * 4) as usize);
    for row in (0..height as usize).rev() {
        let row_offset = row * width as usize;
        for col in 0..width as usize {
            let texel = pixels.get(row_offset + col).copied().unwrap_or([0.0; 4]);
            raw.extend(texel.iter().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8));
        }
    }
    RgbaImage::from_fn(width, height, |x, y| {
        let i = ((y * width + x) * 4) as usize;
        image::Rgba([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]])
    })
}

impl<B: GraphicsBackend> SimulationContext<B> {
    /// Renders the composite off screen at the capture resolution and reads it back.
    pub fn capture(&mut self) -> FluidResult<RgbaImage> {
        let (width, height) = self.resolution(self.config.capture_resolution);
        let target = create_target(
            &mut self.backend,
            "capture",
            width,
            height,
            FormatPair::new(TextureFormat::Rgba8Unorm),
            Filter::Nearest,
        )?;
        let pixels = self
            .render(Some(&target))
            .and_then(|_| self.backend.read_pixels(target.texture));
        release_target(&mut self.backend, &target);
        Ok(texels_to_image(&pixels?, width, height))
    }

    /// Writes a capture to `dir/fluid_<timestamp>.png` and returns the path.
    pub fn save_capture(&mut self, dir: &Path) -> anyhow::Result<PathBuf> {
        let image = self.capture()?;
        std::fs::create_dir_all(dir)?;
        let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S%.3f");
        let path = dir.join(format!("fluid_{timestamp}.png"));
        image.save(&path)?;
        log::info!("Saved capture {}x{} to {}", image.width(), image.height(), path.display());
        Ok(path)
    }
}
