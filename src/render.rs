//! Post-processing and the final composite.

use crate::backend::{Blend, DrawCall, GraphicsBackend, Program, RenderTarget};
use crate::config::SimulationConfig;
use crate::error::FluidResult;
use crate::framebuffer::FramebufferTarget;
use crate::simulation::{not_allocated, FluidFields, SimulationContext};

impl<B: GraphicsBackend> SimulationContext<B> {
    /// Composites the dye into `target`, or onto the surface when `None`.
    ///
    /// Bloom and sunrays are recomputed from the current dye first. The sunrays
    /// mask borrows the dye write buffer as scratch; the read buffer is never
    /// touched, so rendering does not change the simulation state.
    pub fn render(&mut self, target: Option<&FramebufferTarget>) -> FluidResult<()> {
        let fields = self.fields.as_ref().ok_or_else(not_allocated)?;
        let backend = &mut self.backend;
        let config = &self.config;

        if config.bloom {
            apply_bloom(backend, config, fields)?;
        }
        if config.sunrays {
            apply_sunrays(backend, config, fields)?;
            blur(backend, &fields.sunrays, &fields.sunrays_temp, 1)?;
        }

        let output = target.map_or(RenderTarget::Screen, FramebufferTarget::render_target);
        let (width, height) = match target {
            Some(t) => (t.width, t.height),
            None => backend.drawing_size(),
        };
        let blend = if target.is_none() || !config.transparent {
            Blend::PremultipliedOver
        } else {
            Blend::Replace
        };

        if !config.transparent {
            backend.draw(
                &DrawCall::new(
                    Program::Color {
                        color: config.back_color.normalized(),
                    },
                    output,
                )
                .with_blend(blend),
            )?;
        }
        if target.is_none() && config.transparent {
            backend.draw(
                &DrawCall::new(
                    Program::Checkerboard {
                        aspect_ratio: width.max(1) as f32 / height.max(1) as f32,
                    },
                    output,
                )
                .with_blend(blend),
            )?;
        }

        let display = Program::Display {
            dye: fields.dye.read().texture,
            bloom: config.bloom.then_some(fields.bloom.texture),
            sunrays: config.sunrays.then_some(fields.sunrays.texture),
            shading: config.shading,
            texel_size: [1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32],
        };
        backend.draw(&DrawCall::new(display, output).with_blend(blend))
    }
}

/// Thresholds the dye, walks down the mip chain and back up additively,
/// and leaves the result in `fields.bloom`.
fn apply_bloom<B: GraphicsBackend>(backend: &mut B, config: &SimulationConfig, fields: &FluidFields) -> FluidResult<()> {
    let chain = &fields.bloom_chain;
    if chain.len() < 2 {
        return Ok(());
    }

    backend.draw(&DrawCall::new(
        Program::BloomPrefilter {
            source: fields.dye.read().texture,
            curve: config.bloom_curve(),
            threshold: config.bloom_threshold,
        },
        fields.bloom.render_target(),
    ))?;

    let mut last = &fields.bloom;
    for level in chain {
        backend.draw(&DrawCall::new(
            Program::BloomBlur {
                source: last.texture,
                texel_size: last.texel_size,
            },
            level.render_target(),
        ))?;
        last = level;
    }

    for level in chain.iter().rev().skip(1) {
        backend.draw(
            &DrawCall::new(
                Program::BloomBlur {
                    source: last.texture,
                    texel_size: last.texel_size,
                },
                level.render_target(),
            )
            .with_blend(Blend::Additive),
        )?;
        last = level;
    }

    backend.draw(&DrawCall::new(
        Program::BloomFinal {
            source: last.texture,
            texel_size: last.texel_size,
            intensity: config.bloom_intensity,
        },
        fields.bloom.render_target(),
    ))
}

fn apply_sunrays<B: GraphicsBackend>(backend: &mut B, config: &SimulationConfig, fields: &FluidFields) -> FluidResult<()> {
    let mask = fields.dye.write();
    backend.draw(&DrawCall::new(
        Program::SunraysMask {
            source: fields.dye.read().texture,
        },
        mask.render_target(),
    ))?;
    backend.draw(&DrawCall::new(
        Program::Sunrays {
            source: mask.texture,
            weight: config.sunrays_weight,
        },
        fields.sunrays.render_target(),
    ))
}

/// Separable blur of `target` in place, using `temp` for the horizontal half.
fn blur<B: GraphicsBackend>(
    backend: &mut B,
    target: &FramebufferTarget,
    temp: &FramebufferTarget,
    iterations: u32,
) -> FluidResult<()> {
    for _ in 0..iterations {
        backend.draw(&DrawCall::new(
            Program::Blur {
                source: target.texture,
                texel_size: [target.texel_size[0], 0.0],
            },
            temp.render_target(),
        ))?;
        backend.draw(&DrawCall::new(
            Program::Blur {
                source: temp.texture,
                texel_size: [0.0, target.texel_size[1]],
            },
            target.render_target(),
        ))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::backend::GraphicsBackend;
    use crate::config::{BackColor, SimulationConfig};
    use crate::context::create_context;
    use crate::simulation::SimulationContext;
    use crate::software::{SoftwareBackend, SoftwareCaps, SoftwareHost};

    fn context(config: SimulationConfig) -> SimulationContext<SoftwareBackend> {
        let mut host = SoftwareHost::new(32, 32, SoftwareCaps::default());
        let (backend, caps) = create_context(&mut host).unwrap();
        let mut ctx = SimulationContext::with_seed(backend, caps, config, 5);
        ctx.init_framebuffers().unwrap();
        ctx
    }

    fn small() -> SimulationConfig {
        SimulationConfig {
            sim_resolution: 16,
            dye_resolution: 32,
            bloom_resolution: 32,
            sunrays_resolution: 16,
            ..Default::default()
        }
    }

    #[test]
    fn empty_dye_shows_the_back_color() {
        let mut ctx = context(SimulationConfig {
            bloom: false,
            sunrays: false,
            back_color: BackColor { r: 255.0, g: 0.0, b: 0.0 },
            ..small()
        });
        ctx.render(None).unwrap();
        assert!(ctx.backend().screen_pixels().iter().all(|p| p[0] == 1.0 && p[1] == 0.0));
        assert_eq!(ctx.backend().screen_draws(), 2);
    }

    #[test]
    fn transparent_screen_draws_checkerboard() {
        let mut ctx = context(SimulationConfig {
            bloom: false,
            sunrays: false,
            transparent: true,
            ..small()
        });
        ctx.render(None).unwrap();
        let pixels = ctx.backend().screen_pixels();
        assert!(pixels.iter().all(|p| p[0] >= 0.79 && p[0] <= 0.91));
        assert!(pixels.iter().any(|p| p[0] > 0.85));
        assert!(pixels.iter().any(|p| p[0] < 0.85));
    }

    #[test]
    fn post_processing_leaves_dye_read_buffer_alone() {
        let mut ctx = context(small());
        ctx.apply_multiple_splats(4).unwrap();
        let dye = ctx.fields().unwrap().dye.read().texture;
        let before = ctx.backend_mut().read_pixels(dye).unwrap();
        ctx.render(None).unwrap();
        assert_eq!(ctx.fields().unwrap().dye.read().texture, dye);
        assert_eq!(ctx.backend_mut().read_pixels(dye).unwrap(), before);
    }

    #[test]
    fn bloom_pass_count_follows_chain_length() {
        let mut ctx = context(SimulationConfig { sunrays: false, ..small() });
        let levels = ctx.fields().unwrap().bloom_chain.len();
        let before = ctx.backend().draw_count();
        ctx.render(None).unwrap();
        // prefilter + down + up + final, then background and display
        let expected = 1 + levels + (levels - 1) + 1 + 2;
        assert_eq!(ctx.backend().draw_count() - before, expected);
    }
}
