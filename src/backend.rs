//! The drawing contract the simulation is written against.
//!
//! Every simulation pass is a full-screen draw of one [`Program`] into one
//! [`RenderTarget`]. A backend owns the textures and knows how to run each
//! program; the hardware implementation lives in [`crate::gpu`], the CPU
//! implementation in [`crate::software`].

use crate::error::FluidResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba16Float,
    Rg16Float,
    R16Float,
    Rgba8Unorm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    R,
    Rg,
    Rgba,
}

/// Storage type of a texel channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelType {
    HalfFloat,
    UnsignedByte,
}

impl TextureFormat {
    pub fn channels(self) -> ChannelLayout {
        match self {
            Self::Rgba16Float | Self::Rgba8Unorm => ChannelLayout::Rgba,
            Self::Rg16Float => ChannelLayout::Rg,
            Self::R16Float => ChannelLayout::R,
        }
    }

    pub fn texel_type(self) -> TexelType {
        match self {
            Self::Rgba8Unorm => TexelType::UnsignedByte,
            _ => TexelType::HalfFloat,
        }
    }

    pub fn bytes_per_texel(self) -> u32 {
        match self {
            Self::Rgba16Float => 8,
            Self::Rg16Float => 4,
            Self::R16Float => 2,
            Self::Rgba8Unorm => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Blend {
    Replace,
    /// `dst + src`, used when accumulating the bloom pyramid.
    Additive,
    /// `src + dst * (1 - src.a)`, used for the on-screen composite.
    PremultipliedOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub filter: Filter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    Screen,
    Texture(TextureId),
}

/// One full-screen shader pass and its uniforms.
#[derive(Debug, Clone, PartialEq)]
pub enum Program {
    Copy {
        source: TextureId,
    },
    /// `source * value`; with `value == 0` this clears.
    Clear {
        source: TextureId,
        value: f32,
    },
    Color {
        color: [f32; 4],
    },
    Checkerboard {
        aspect_ratio: f32,
    },
    Splat {
        target: TextureId,
        aspect_ratio: f32,
        point: [f32; 2],
        color: [f32; 3],
        radius: f32,
    },
    Curl {
        velocity: TextureId,
        texel_size: [f32; 2],
    },
    Vorticity {
        velocity: TextureId,
        curl: TextureId,
        texel_size: [f32; 2],
        curl_strength: f32,
        dt: f32,
    },
    Divergence {
        velocity: TextureId,
        texel_size: [f32; 2],
    },
    Pressure {
        pressure: TextureId,
        divergence: TextureId,
        texel_size: [f32; 2],
    },
    GradientSubtract {
        pressure: TextureId,
        velocity: TextureId,
        texel_size: [f32; 2],
    },
    /// Semi-Lagrangian advection. `source_texel_size` is set when the host
    /// cannot filter float textures and the pass must bilerp by hand.
    Advection {
        velocity: TextureId,
        source: TextureId,
        texel_size: [f32; 2],
        source_texel_size: Option<[f32; 2]>,
        dt: f32,
        dissipation: f32,
    },
    BloomPrefilter {
        source: TextureId,
        curve: [f32; 3],
        threshold: f32,
    },
    BloomBlur {
        source: TextureId,
        texel_size: [f32; 2],
    },
    BloomFinal {
        source: TextureId,
        texel_size: [f32; 2],
        intensity: f32,
    },
    SunraysMask {
        source: TextureId,
    },
    Sunrays {
        source: TextureId,
        weight: f32,
    },
    /// One direction of a separable blur; `texel_size` is the step vector.
    Blur {
        source: TextureId,
        texel_size: [f32; 2],
    },
    Display {
        dye: TextureId,
        bloom: Option<TextureId>,
        sunrays: Option<TextureId>,
        shading: bool,
        texel_size: [f32; 2],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Copy,
    Clear,
    Color,
    Checkerboard,
    Splat,
    Curl,
    Vorticity,
    Divergence,
    Pressure,
    GradientSubtract,
    Advection,
    BloomPrefilter,
    BloomBlur,
    BloomFinal,
    SunraysMask,
    Sunrays,
    Blur,
    Display,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 18] = [
        Self::Copy,
        Self::Clear,
        Self::Color,
        Self::Checkerboard,
        Self::Splat,
        Self::Curl,
        Self::Vorticity,
        Self::Divergence,
        Self::Pressure,
        Self::GradientSubtract,
        Self::Advection,
        Self::BloomPrefilter,
        Self::BloomBlur,
        Self::BloomFinal,
        Self::SunraysMask,
        Self::Sunrays,
        Self::Blur,
        Self::Display,
    ];

    /// Fragment entry point in the WGSL module.
    pub fn entry_point(self) -> &'static str {
        match self {
            Self::Copy => "fs_copy",
            Self::Clear => "fs_clear",
            Self::Color => "fs_color",
            Self::Checkerboard => "fs_checkerboard",
            Self::Splat => "fs_splat",
            Self::Curl => "fs_curl",
            Self::Vorticity => "fs_vorticity",
            Self::Divergence => "fs_divergence",
            Self::Pressure => "fs_pressure",
            Self::GradientSubtract => "fs_gradient_subtract",
            Self::Advection => "fs_advection",
            Self::BloomPrefilter => "fs_bloom_prefilter",
            Self::BloomBlur => "fs_bloom_blur",
            Self::BloomFinal => "fs_bloom_final",
            Self::SunraysMask => "fs_sunrays_mask",
            Self::Sunrays => "fs_sunrays",
            Self::Blur => "fs_blur",
            Self::Display => "fs_display",
        }
    }
}

impl Program {
    pub fn kind(&self) -> ProgramKind {
        match self {
            Self::Copy { .. } => ProgramKind::Copy,
            Self::Clear { .. } => ProgramKind::Clear,
            Self::Color { .. } => ProgramKind::Color,
            Self::Checkerboard { .. } => ProgramKind::Checkerboard,
            Self::Splat { .. } => ProgramKind::Splat,
            Self::Curl { .. } => ProgramKind::Curl,
            Self::Vorticity { .. } => ProgramKind::Vorticity,
            Self::Divergence { .. } => ProgramKind::Divergence,
            Self::Pressure { .. } => ProgramKind::Pressure,
            Self::GradientSubtract { .. } => ProgramKind::GradientSubtract,
            Self::Advection { .. } => ProgramKind::Advection,
            Self::BloomPrefilter { .. } => ProgramKind::BloomPrefilter,
            Self::BloomBlur { .. } => ProgramKind::BloomBlur,
            Self::BloomFinal { .. } => ProgramKind::BloomFinal,
            Self::SunraysMask { .. } => ProgramKind::SunraysMask,
            Self::Sunrays { .. } => ProgramKind::Sunrays,
            Self::Blur { .. } => ProgramKind::Blur,
            Self::Display { .. } => ProgramKind::Display,
        }
    }

    /// Textures bound to input slots 0..3, in shader order.
    pub fn inputs(&self) -> [Option<TextureId>; 3] {
        match *self {
            Self::Color { .. } | Self::Checkerboard { .. } => [None, None, None],
            Self::Copy { source }
            | Self::Clear { source, .. }
            | Self::BloomPrefilter { source, .. }
            | Self::BloomBlur { source, .. }
            | Self::BloomFinal { source, .. }
            | Self::SunraysMask { source }
            | Self::Sunrays { source, .. }
            | Self::Blur { source, .. } => [Some(source), None, None],
            Self::Splat { target, .. } => [Some(target), None, None],
            Self::Curl { velocity, .. } | Self::Divergence { velocity, .. } => [Some(velocity), None, None],
            Self::Vorticity { velocity, curl, .. } => [Some(velocity), Some(curl), None],
            Self::Pressure { pressure, divergence, .. } => [Some(pressure), Some(divergence), None],
            Self::GradientSubtract { pressure, velocity, .. } => [Some(pressure), Some(velocity), None],
            Self::Advection { velocity, source, .. } => [Some(velocity), Some(source), None],
            Self::Display { dye, bloom, sunrays, .. } => [Some(dye), bloom, sunrays],
        }
    }

    pub fn reads(&self, id: TextureId) -> bool {
        self.inputs().iter().any(|slot| *slot == Some(id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: Program,
    pub target: RenderTarget,
    pub blend: Blend,
}

impl DrawCall {
    pub fn new(program: Program, target: RenderTarget) -> Self {
        Self {
            program,
            target,
            blend: Blend::Replace,
        }
    }

    pub fn with_blend(mut self, blend: Blend) -> Self {
        self.blend = blend;
        self
    }
}

/// A created drawing context.
///
/// Draws are fire-and-forget; only `read_pixels` waits for the device.
pub trait GraphicsBackend {
    fn api_name(&self) -> &str;

    fn supports_linear_filtering(&self) -> bool;

    fn half_float_type(&self) -> TexelType;

    /// Creates a 4x4 scratch render target in `format` and reports whether it is complete.
    fn probe_render_target(&mut self, format: TextureFormat) -> bool;

    /// Current size of the presentation surface in pixels.
    fn drawing_size(&self) -> (u32, u32);

    /// Allocates a texture cleared to transparent black.
    fn create_texture(&mut self, desc: &TextureDesc) -> FluidResult<TextureId>;

    fn destroy_texture(&mut self, id: TextureId);

    fn set_viewport(&mut self, width: u32, height: u32);

    fn viewport(&self) -> (u32, u32);

    /// Runs one full-screen pass. The viewport becomes the target's size.
    fn draw(&mut self, call: &DrawCall) -> FluidResult<()>;

    fn read_pixels(&mut self, id: TextureId) -> FluidResult<Vec<[f32; 4]>>;

    /// Shows the screen target. Called once per frame.
    fn present(&mut self) -> FluidResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_follow_shader_slot_order() {
        let program = Program::GradientSubtract {
            pressure: TextureId(3),
            velocity: TextureId(7),
            texel_size: [0.1, 0.1],
        };
        assert_eq!(program.inputs(), [Some(TextureId(3)), Some(TextureId(7)), None]);
        assert!(program.reads(TextureId(7)));
        assert!(!program.reads(TextureId(4)));
    }

    #[test]
    fn every_kind_has_a_distinct_entry_point() {
        let mut names: Vec<_> = ProgramKind::ALL.iter().map(|k| k.entry_point()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ProgramKind::ALL.len());
    }
}
