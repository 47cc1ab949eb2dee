//! The simulation context and the render targets it owns.

use rand::{rngs::StdRng, SeedableRng};

use crate::backend::{Filter, GraphicsBackend, TextureId};
use crate::config::SimulationConfig;
use crate::context::{Capabilities, FormatPair};
use crate::error::{FluidError, FluidResult};
use crate::frame::FrameClock;
use crate::framebuffer::{
    create_double_buffer, create_target, resize_double_buffer, resolution_for, DoubleBuffer, FramebufferTarget,
};
use crate::pointer::Pointers;

/// Every render target the simulation draws into.
#[derive(Debug, Clone)]
pub struct FluidFields {
    pub dye: DoubleBuffer,
    pub velocity: DoubleBuffer,
    pub divergence: FramebufferTarget,
    pub curl: FramebufferTarget,
    pub pressure: DoubleBuffer,
    pub bloom: FramebufferTarget,
    pub bloom_chain: Vec<FramebufferTarget>,
    pub sunrays: FramebufferTarget,
    pub sunrays_temp: FramebufferTarget,
}

impl FluidFields {
    /// Every texture backing the fields.
    pub fn textures(&self) -> Vec<TextureId> {
        let mut textures = Vec::new();
        textures.extend(self.dye.textures());
        textures.extend(self.velocity.textures());
        textures.extend(self.pressure.textures());
        textures.extend([
            self.divergence.texture,
            self.curl.texture,
            self.bloom.texture,
            self.sunrays.texture,
            self.sunrays_temp.texture,
        ]);
        textures.extend(self.bloom_chain.iter().map(|level| level.texture));
        textures
    }
}

/// Formats resolved from the capability descriptor for one allocation round.
#[derive(Debug, Clone, Copy)]
struct FieldFormats {
    rgba: FormatPair,
    rg: FormatPair,
    r: FormatPair,
    filter: Filter,
}

/// Grid sizes for one allocation round.
#[derive(Debug, Clone, Copy)]
struct FieldSizes {
    sim: (u32, u32),
    dye: (u32, u32),
    bloom: (u32, u32),
    sunrays: (u32, u32),
}

/// Tracks the textures created during one allocation round so a failed round
/// can hand them all back.
struct Allocation<'a, B: GraphicsBackend> {
    backend: &'a mut B,
    created: Vec<TextureId>,
}

impl<'a, B: GraphicsBackend> Allocation<'a, B> {
    fn new(backend: &'a mut B) -> Self {
        Self {
            backend,
            created: Vec::new(),
        }
    }

    fn target(
        &mut self,
        label: &str,
        (width, height): (u32, u32),
        format: FormatPair,
        filter: Filter,
    ) -> FluidResult<FramebufferTarget> {
        let target = create_target(self.backend, label, width, height, format, filter)?;
        self.created.push(target.texture);
        Ok(target)
    }

    fn double(
        &mut self,
        label: &str,
        (width, height): (u32, u32),
        format: FormatPair,
        filter: Filter,
    ) -> FluidResult<DoubleBuffer> {
        let buffer = create_double_buffer(self.backend, label, width, height, format, filter)?;
        self.created.extend(buffer.textures());
        Ok(buffer)
    }

    /// A pair carrying over `previous`'s contents, or a fresh one.
    fn carried(
        &mut self,
        label: &str,
        previous: Option<&DoubleBuffer>,
        (width, height): (u32, u32),
        format: FormatPair,
        filter: Filter,
    ) -> FluidResult<DoubleBuffer> {
        let Some(previous) = previous else {
            return self.double(label, (width, height), format, filter);
        };
        match resize_double_buffer(self.backend, label, previous, width, height, format, filter)? {
            Some(resized) => {
                self.created.extend(resized.textures());
                Ok(resized)
            }
            None => Ok(previous.clone()),
        }
    }

    fn fields(
        &mut self,
        previous: Option<&FluidFields>,
        formats: FieldFormats,
        sizes: FieldSizes,
        bloom_iterations: u32,
    ) -> FluidResult<FluidFields> {
        let dye = self.carried("dye", previous.map(|f| &f.dye), sizes.dye, formats.rgba, formats.filter)?;
        let velocity = self.carried("velocity", previous.map(|f| &f.velocity), sizes.sim, formats.rg, formats.filter)?;
        let divergence = self.target("divergence", sizes.sim, formats.r, Filter::Nearest)?;
        let curl = self.target("curl", sizes.sim, formats.r, Filter::Nearest)?;
        let pressure = self.double("pressure", sizes.sim, formats.r, Filter::Nearest)?;

        let bloom = self.target("bloom", sizes.bloom, formats.rgba, formats.filter)?;
        let mut bloom_chain = Vec::new();
        for i in 0..bloom_iterations {
            let size = (sizes.bloom.0 >> (i + 1), sizes.bloom.1 >> (i + 1));
            if size.0 < 2 || size.1 < 2 {
                break;
            }
            bloom_chain.push(self.target(&format!("bloom level {i}"), size, formats.rgba, formats.filter)?);
        }

        let sunrays = self.target("sunrays", sizes.sunrays, formats.r, formats.filter)?;
        let sunrays_temp = self.target("sunrays temp", sizes.sunrays, formats.r, formats.filter)?;

        Ok(FluidFields {
            dye,
            velocity,
            divergence,
            curl,
            pressure,
            bloom,
            bloom_chain,
            sunrays,
            sunrays_temp,
        })
    }

    fn rollback(self) {
        for texture in self.created {
            self.backend.destroy_texture(texture);
        }
    }
}

/// Owns the graphics context and all simulation state.
pub struct SimulationContext<B: GraphicsBackend> {
    pub(crate) backend: B,
    pub(crate) caps: Capabilities,
    pub config: SimulationConfig,
    pub(crate) fields: Option<FluidFields>,
    pub pointers: Pointers,
    pub(crate) splat_stack: Vec<u32>,
    pub(crate) clock: FrameClock,
    pub(crate) color_update_timer: f32,
    pub(crate) drawing_size: (u32, u32),
    pub(crate) rng: StdRng,
}

impl<B: GraphicsBackend> SimulationContext<B> {
    pub fn new(backend: B, caps: Capabilities, config: SimulationConfig) -> Self {
        Self::with_rng(backend, caps, config, StdRng::from_entropy())
    }

    /// Deterministic random splats and colors, for reproducible runs.
    pub fn with_seed(backend: B, caps: Capabilities, config: SimulationConfig, seed: u64) -> Self {
        Self::with_rng(backend, caps, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(backend: B, caps: Capabilities, mut config: SimulationConfig, rng: StdRng) -> Self {
        config.sanitize();
        config.apply_capabilities(&caps);
        let drawing_size = backend.drawing_size();
        Self {
            backend,
            caps,
            config,
            fields: None,
            pointers: Pointers::default(),
            splat_stack: Vec::new(),
            clock: FrameClock::new(),
            color_update_timer: 0.0,
            drawing_size,
            rng,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn fields(&self) -> Option<&FluidFields> {
        self.fields.as_ref()
    }

    pub fn drawing_size(&self) -> (u32, u32) {
        self.drawing_size
    }

    /// Width over height of the drawing surface.
    pub fn aspect_ratio(&self) -> f32 {
        self.drawing_size.0.max(1) as f32 / self.drawing_size.1.max(1) as f32
    }

    pub fn resolution(&self, resolution: u32) -> (u32, u32) {
        resolution_for(resolution, self.drawing_size.0, self.drawing_size.1)
    }

    /// Queues a burst of `amount` random splats for the next frame.
    pub fn queue_splats(&mut self, amount: u32) {
        self.splat_stack.push(amount);
    }

    pub fn toggle_pause(&mut self) {
        self.config.paused = !self.config.paused;
        log::info!("Simulation {}", if self.config.paused { "paused" } else { "resumed" });
    }

    fn field_formats(&self) -> FluidResult<FieldFormats> {
        let missing = |what: &str| {
            log::warn!("Skipping framebuffer allocation: no renderable {what} format");
            FluidError::CapabilityMissing(format!("no renderable {what} float texture format"))
        };
        Ok(FieldFormats {
            rgba: self.caps.rgba.ok_or_else(|| missing("RGBA"))?,
            rg: self.caps.rg.ok_or_else(|| missing("RG"))?,
            r: self.caps.r.ok_or_else(|| missing("R"))?,
            filter: if self.caps.supports_linear_filtering {
                Filter::Linear
            } else {
                Filter::Nearest
            },
        })
    }

    /// Allocates every target, or resamples dye and velocity to the current size.
    ///
    /// Without a renderable RGBA format nothing is allocated and
    /// [`FluidError::CapabilityMissing`] is returned. A failed round releases
    /// whatever it created and leaves the previous fields in place.
    pub fn init_framebuffers(&mut self) -> FluidResult<()> {
        let formats = self.field_formats()?;
        let sizes = FieldSizes {
            sim: self.resolution(self.config.sim_resolution),
            dye: self.resolution(self.config.dye_resolution),
            bloom: self.resolution(self.config.bloom_resolution),
            sunrays: self.resolution(self.config.sunrays_resolution),
        };

        let mut allocation = Allocation::new(&mut self.backend);
        let fields = match allocation.fields(self.fields.as_ref(), formats, sizes, self.config.bloom_iterations) {
            Ok(fields) => fields,
            Err(err) => {
                allocation.rollback();
                log::error!(
                    "Cannot allocate framebuffers for a {}x{} surface (sim {}x{}, dye {}x{}): {err}",
                    self.drawing_size.0,
                    self.drawing_size.1,
                    sizes.sim.0,
                    sizes.sim.1,
                    sizes.dye.0,
                    sizes.dye.1
                );
                return Err(err);
            }
        };

        log::info!(
            "Framebuffers: sim {}x{}, dye {}x{}, bloom levels {}",
            sizes.sim.0,
            sizes.sim.1,
            sizes.dye.0,
            sizes.dye.1,
            fields.bloom_chain.len()
        );

        let kept = fields.textures();
        if let Some(old) = self.fields.replace(fields) {
            for texture in old.textures() {
                if !kept.contains(&texture) {
                    self.backend.destroy_texture(texture);
                }
            }
        }
        Ok(())
    }
}

/// Error for passes issued before [`SimulationContext::init_framebuffers`] succeeded.
pub(crate) fn not_allocated() -> FluidError {
    FluidError::CapabilityMissing("framebuffers were not allocated".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TextureFormat;
    use crate::context::create_context;
    use crate::software::{SoftwareBackend, SoftwareCaps, SoftwareHost};

    fn context(width: u32, height: u32, caps: SoftwareCaps) -> SimulationContext<SoftwareBackend> {
        let mut host = SoftwareHost::new(width, height, caps);
        let (backend, caps) = create_context(&mut host).unwrap();
        let config = SimulationConfig {
            sim_resolution: 16,
            dye_resolution: 32,
            bloom_resolution: 32,
            sunrays_resolution: 16,
            ..Default::default()
        };
        SimulationContext::with_seed(backend, caps, config, 7)
    }

    #[test]
    fn allocates_fields_at_policy_resolution() {
        let mut ctx = context(200, 100, SoftwareCaps::default());
        ctx.init_framebuffers().unwrap();
        let fields = ctx.fields().unwrap();
        assert_eq!((fields.velocity.width(), fields.velocity.height()), (32, 16));
        assert_eq!((fields.dye.width(), fields.dye.height()), (64, 32));
        assert_eq!(fields.pressure.read().format, TextureFormat::R16Float);
        assert_eq!(fields.curl.filter, Filter::Nearest);
        assert_eq!(fields.bloom_chain.len(), 4);
        assert_eq!(fields.bloom_chain[0].width, 32);
    }

    #[test]
    fn reinit_does_not_leak_textures() {
        let mut ctx = context(64, 64, SoftwareCaps::default());
        ctx.init_framebuffers().unwrap();
        let live = ctx.backend().live_textures();
        ctx.backend_mut().resize_surface(128, 64);
        ctx.drawing_size = ctx.backend().drawing_size();
        ctx.init_framebuffers().unwrap();
        assert_eq!(ctx.backend().live_textures(), live);
        assert_eq!(ctx.fields().unwrap().velocity.width(), 32);
    }

    #[test]
    fn failed_reinit_keeps_previous_fields() {
        let caps = SoftwareCaps {
            max_texture_size: 600,
            ..SoftwareCaps::default()
        };
        let mut ctx = context(64, 64, caps);
        ctx.config.bloom_resolution = 64;
        ctx.init_framebuffers().unwrap();
        let textures = ctx.fields().unwrap().textures();
        let live = ctx.backend().live_textures();

        // dye and velocity resample fine at 16:1, the bloom target does not
        ctx.backend_mut().resize_surface(1024, 64);
        ctx.drawing_size = ctx.backend().drawing_size();
        match ctx.init_framebuffers() {
            Err(FluidError::AllocationFailure { label, .. }) => assert_eq!(label, "bloom"),
            other => panic!("expected AllocationFailure, got {other:?}"),
        }
        assert_eq!(ctx.fields().unwrap().textures(), textures);
        assert_eq!(ctx.fields().unwrap().dye.width(), 32);
        assert_eq!(ctx.backend().live_textures(), live);
    }

    #[test]
    fn missing_rgba_skips_allocation() {
        let caps = SoftwareCaps {
            renderable: vec![TextureFormat::R16Float, TextureFormat::Rg16Float],
            ..SoftwareCaps::default()
        };
        let mut ctx = context(64, 64, caps);
        assert!(ctx.capabilities().rgba.is_none());
        assert!(matches!(ctx.init_framebuffers(), Err(FluidError::CapabilityMissing(_))));
        assert!(ctx.fields().is_none());
        assert_eq!(ctx.backend().live_textures(), 0);
    }

    #[test]
    fn nearest_only_hosts_get_low_quality_settings() {
        let caps = SoftwareCaps {
            linear_filtering: false,
            ..SoftwareCaps::default()
        };
        let ctx = context(64, 64, caps);
        assert!(!ctx.config.bloom && !ctx.config.sunrays && !ctx.config.shading);
    }
}
