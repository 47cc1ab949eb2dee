//! Drawing-context creation and render-target format negotiation.

use crate::backend::{ChannelLayout, GraphicsBackend, TexelType, TextureFormat};
use crate::error::{FluidError, FluidResult};

/// Context flavours, tried from most to least capable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiLevel {
    Primary,
    Fallback,
}

impl ApiLevel {
    pub const DESCENDING: [ApiLevel; 2] = [ApiLevel::Primary, ApiLevel::Fallback];
}

/// A host that can hand out drawing contexts.
pub trait ContextProvider {
    type Backend: GraphicsBackend;

    fn create_context(&mut self, level: ApiLevel) -> Option<Self::Backend>;
}

/// An internal storage format with its channel layout and texel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatPair {
    pub internal: TextureFormat,
    pub layout: ChannelLayout,
    pub texel_type: TexelType,
}

impl FormatPair {
    pub fn new(internal: TextureFormat) -> Self {
        Self {
            internal,
            layout: internal.channels(),
            texel_type: internal.texel_type(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_linear_filtering: bool,
    pub half_float_type: TexelType,
    pub rgba: Option<FormatPair>,
    pub rg: Option<FormatPair>,
    pub r: Option<FormatPair>,
}

const RGBA_CANDIDATES: [TextureFormat; 2] = [TextureFormat::Rgba16Float, TextureFormat::Rgba8Unorm];
const RG_CANDIDATES: [TextureFormat; 3] = [
    TextureFormat::Rg16Float,
    TextureFormat::Rgba16Float,
    TextureFormat::Rgba8Unorm,
];
const R_CANDIDATES: [TextureFormat; 4] = [
    TextureFormat::R16Float,
    TextureFormat::Rg16Float,
    TextureFormat::Rgba16Float,
    TextureFormat::Rgba8Unorm,
];

/// First candidate the backend can render into, in priority order.
pub fn supported_format<B: GraphicsBackend>(backend: &mut B, candidates: &[TextureFormat]) -> Option<FormatPair> {
    candidates
        .iter()
        .copied()
        .find(|&format| backend.probe_render_target(format))
        .map(FormatPair::new)
}

pub fn query_capabilities<B: GraphicsBackend>(backend: &mut B) -> Capabilities {
    let caps = Capabilities {
        supports_linear_filtering: backend.supports_linear_filtering(),
        half_float_type: backend.half_float_type(),
        rgba: supported_format(backend, &RGBA_CANDIDATES),
        rg: supported_format(backend, &RG_CANDIDATES),
        r: supported_format(backend, &R_CANDIDATES),
    };
    log::info!(
        "Capabilities on {}: linear filtering {}, rgba {:?}, rg {:?}, r {:?}",
        backend.api_name(),
        caps.supports_linear_filtering,
        caps.rgba.map(|f| f.internal),
        caps.rg.map(|f| f.internal),
        caps.r.map(|f| f.internal),
    );
    if caps.rgba.is_none() {
        log::warn!("No renderable RGBA format; framebuffers will not be allocated");
    }
    caps
}

/// Creates the most capable context the host offers and negotiates formats.
pub fn create_context<P: ContextProvider>(provider: &mut P) -> FluidResult<(P::Backend, Capabilities)> {
    for level in ApiLevel::DESCENDING {
        if let Some(mut backend) = provider.create_context(level) {
            log::info!("Created {:?} context: {}", level, backend.api_name());
            let caps = query_capabilities(&mut backend);
            return Ok((backend, caps));
        }
        log::debug!("{:?} context unavailable", level);
    }
    log::error!("No graphics context could be created");
    Err(FluidError::CapabilityMissing(
        "no hardware-accelerated graphics context available".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::{SoftwareCaps, SoftwareHost};

    #[test]
    fn prefers_half_float_formats() {
        let mut host = SoftwareHost::new(64, 64, SoftwareCaps::default());
        let (_backend, caps) = create_context(&mut host).unwrap();
        assert_eq!(caps.rgba, Some(FormatPair::new(TextureFormat::Rgba16Float)));
        assert_eq!(caps.rg, Some(FormatPair::new(TextureFormat::Rg16Float)));
        assert_eq!(caps.r, Some(FormatPair::new(TextureFormat::R16Float)));
        assert_eq!(caps.half_float_type, TexelType::HalfFloat);
    }

    #[test]
    fn single_channel_falls_back_through_wider_formats() {
        let caps = SoftwareCaps {
            renderable: vec![TextureFormat::Rgba16Float, TextureFormat::Rgba8Unorm],
            ..SoftwareCaps::default()
        };
        let mut host = SoftwareHost::new(64, 64, caps);
        let (_backend, caps) = create_context(&mut host).unwrap();
        assert_eq!(caps.r.map(|f| f.internal), Some(TextureFormat::Rgba16Float));
        assert_eq!(caps.rg.map(|f| f.layout), Some(ChannelLayout::Rgba));
    }

    #[test]
    fn rgba_falls_back_to_unorm() {
        let caps = SoftwareCaps {
            renderable: vec![TextureFormat::Rgba8Unorm],
            ..SoftwareCaps::default()
        };
        let mut host = SoftwareHost::new(64, 64, caps);
        let (_backend, caps) = create_context(&mut host).unwrap();
        assert_eq!(caps.rgba.map(|f| f.internal), Some(TextureFormat::Rgba8Unorm));
        assert_eq!(caps.rgba.map(|f| f.texel_type), Some(TexelType::UnsignedByte));
    }

    #[test]
    fn uses_fallback_api_when_primary_is_missing() {
        let caps = SoftwareCaps {
            primary_api: false,
            ..SoftwareCaps::default()
        };
        let mut host = SoftwareHost::new(64, 64, caps);
        let (backend, _caps) = create_context(&mut host).unwrap();
        assert_eq!(backend.api_name(), "software (fallback)");
    }

    #[test]
    fn no_context_is_a_capability_error() {
        let caps = SoftwareCaps {
            primary_api: false,
            fallback_api: false,
            ..SoftwareCaps::default()
        };
        let mut host = SoftwareHost::new(64, 64, caps);
        match create_context(&mut host) {
            Err(FluidError::CapabilityMissing(_)) => {}
            other => panic!("expected CapabilityMissing, got {:?}", other.map(|(_, caps)| caps)),
        }
    }
}
