//! Off-screen render targets and ping-pong pairs.

use crate::backend::{DrawCall, Filter, GraphicsBackend, Program, RenderTarget, TextureDesc, TextureFormat, TextureId};
use crate::context::FormatPair;
use crate::error::FluidResult;

#[derive(Debug, Clone, PartialEq)]
pub struct FramebufferTarget {
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
    pub texel_size: [f32; 2],
    pub format: TextureFormat,
    pub filter: Filter,
}

impl FramebufferTarget {
    pub fn render_target(&self) -> RenderTarget {
        RenderTarget::Texture(self.texture)
    }
}

/// Two identical targets; one is read while the other is written.
#[derive(Debug, Clone, PartialEq)]
pub struct DoubleBuffer {
    targets: [FramebufferTarget; 2],
    read: usize,
}

impl DoubleBuffer {
    pub fn new(first: FramebufferTarget, second: FramebufferTarget) -> Self {
        Self {
            targets: [first, second],
            read: 0,
        }
    }

    pub fn read(&self) -> &FramebufferTarget {
        &self.targets[self.read]
    }

    pub fn write(&self) -> &FramebufferTarget {
        &self.targets[1 - self.read]
    }

    /// Exchanges the read and write roles without touching texture data.
    pub fn swap(&mut self) {
        self.read = 1 - self.read;
    }

    pub fn width(&self) -> u32 {
        self.read().width
    }

    pub fn height(&self) -> u32 {
        self.read().height
    }

    pub fn texel_size(&self) -> [f32; 2] {
        self.read().texel_size
    }

    pub fn textures(&self) -> [TextureId; 2] {
        [self.targets[0].texture, self.targets[1].texture]
    }
}

/// Grid size for a resolution scalar on a surface of `width` x `height`.
///
/// The short side gets `round(resolution)` cells and the long side follows the
/// surface aspect ratio, so cells stay square on screen.
pub fn resolution_for(resolution: u32, width: u32, height: u32) -> (u32, u32) {
    let width = width.max(1);
    let height = height.max(1);
    let mut aspect = width as f32 / height as f32;
    if aspect < 1.0 {
        aspect = 1.0 / aspect;
    }
    let min = (resolution as f32).round() as u32;
    let max = (resolution as f32 * aspect).round() as u32;
    if width >= height {
        (max.max(1), min.max(1))
    } else {
        (min.max(1), max.max(1))
    }
}

/// Allocates a cleared target and leaves the viewport at its size.
pub fn create_target<B: GraphicsBackend>(
    backend: &mut B,
    label: &str,
    width: u32,
    height: u32,
    format: FormatPair,
    filter: Filter,
) -> FluidResult<FramebufferTarget> {
    let texture = backend.create_texture(&TextureDesc {
        label: label.to_string(),
        width,
        height,
        format: format.internal,
        filter,
    })?;
    backend.set_viewport(width, height);
    Ok(FramebufferTarget {
        texture,
        width,
        height,
        texel_size: [1.0 / width as f32, 1.0 / height as f32],
        format: format.internal,
        filter,
    })
}

pub fn create_double_buffer<B: GraphicsBackend>(
    backend: &mut B,
    label: &str,
    width: u32,
    height: u32,
    format: FormatPair,
    filter: Filter,
) -> FluidResult<DoubleBuffer> {
    let first = create_target(backend, &format!("{label} A"), width, height, format, filter)?;
    let second = match create_target(backend, &format!("{label} B"), width, height, format, filter) {
        Ok(target) => target,
        Err(err) => {
            backend.destroy_texture(first.texture);
            return Err(err);
        }
    };
    Ok(DoubleBuffer::new(first, second))
}

/// Resamples `existing` into a new pair of the given size with one copy pass
/// from its read side.
///
/// Returns `None` for a same-size request, meaning `existing` stays as is.
/// `existing` is never released here: the caller drops it once everything
/// that depends on the resize has succeeded. On error nothing new stays
/// allocated.
pub fn resize_double_buffer<B: GraphicsBackend>(
    backend: &mut B,
    label: &str,
    existing: &DoubleBuffer,
    width: u32,
    height: u32,
    format: FormatPair,
    filter: Filter,
) -> FluidResult<Option<DoubleBuffer>> {
    if existing.width() == width && existing.height() == height {
        return Ok(None);
    }
    log::debug!(
        "Resampling {label} {}x{} -> {width}x{height}",
        existing.width(),
        existing.height()
    );
    let resized = create_double_buffer(backend, label, width, height, format, filter)?;
    let copy = DrawCall::new(
        Program::Copy {
            source: existing.read().texture,
        },
        resized.read().render_target(),
    );
    if let Err(err) = backend.draw(&copy) {
        release_double_buffer(backend, &resized);
        return Err(err);
    }
    Ok(Some(resized))
}

pub fn release_target<B: GraphicsBackend>(backend: &mut B, target: &FramebufferTarget) {
    backend.destroy_texture(target.texture);
}

pub fn release_double_buffer<B: GraphicsBackend>(backend: &mut B, buffer: &DoubleBuffer) {
    for texture in buffer.textures() {
        backend.destroy_texture(texture);
    }
}
