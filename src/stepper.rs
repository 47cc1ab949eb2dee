//! One explicit time step of the fluid.

use crate::backend::{DrawCall, GraphicsBackend, Program};
use crate::error::FluidResult;
use crate::frame::MAX_DELTA_TIME;
use crate::simulation::{not_allocated, SimulationContext};

impl<B: GraphicsBackend> SimulationContext<B> {
    /// Advances velocity and dye by `dt` seconds (at most [`MAX_DELTA_TIME`]).
    ///
    /// Pass order: curl, vorticity confinement, divergence, pressure solve,
    /// gradient subtraction, velocity advection, dye advection.
    pub fn step(&mut self, dt: f32) -> FluidResult<()> {
        let dt = dt.clamp(0.0, MAX_DELTA_TIME);
        let manual_filtering = !self.caps.supports_linear_filtering;
        let config = &self.config;
        let backend = &mut self.backend;
        let fields = self.fields.as_mut().ok_or_else(not_allocated)?;

        let texel_size = fields.velocity.texel_size();

        backend.draw(&DrawCall::new(
            Program::Curl {
                velocity: fields.velocity.read().texture,
                texel_size,
            },
            fields.curl.render_target(),
        ))?;

        backend.draw(&DrawCall::new(
            Program::Vorticity {
                velocity: fields.velocity.read().texture,
                curl: fields.curl.texture,
                texel_size,
                curl_strength: config.curl,
                dt,
            },
            fields.velocity.write().render_target(),
        ))?;
        fields.velocity.swap();

        backend.draw(&DrawCall::new(
            Program::Divergence {
                velocity: fields.velocity.read().texture,
                texel_size,
            },
            fields.divergence.render_target(),
        ))?;

        // Scaled previous pressure seeds the solve; 0 starts from rest.
        backend.draw(&DrawCall::new(
            Program::Clear {
                source: fields.pressure.read().texture,
                value: config.pressure,
            },
            fields.pressure.write().render_target(),
        ))?;
        fields.pressure.swap();

        for _ in 0..config.pressure_iterations {
            backend.draw(&DrawCall::new(
                Program::Pressure {
                    pressure: fields.pressure.read().texture,
                    divergence: fields.divergence.texture,
                    texel_size,
                },
                fields.pressure.write().render_target(),
            ))?;
            fields.pressure.swap();
        }

        backend.draw(&DrawCall::new(
            Program::GradientSubtract {
                pressure: fields.pressure.read().texture,
                velocity: fields.velocity.read().texture,
                texel_size,
            },
            fields.velocity.write().render_target(),
        ))?;
        fields.velocity.swap();

        let velocity = fields.velocity.read().texture;
        backend.draw(&DrawCall::new(
            Program::Advection {
                velocity,
                source: velocity,
                texel_size,
                source_texel_size: manual_filtering.then_some(texel_size),
                dt,
                dissipation: config.velocity_dissipation,
            },
            fields.velocity.write().render_target(),
        ))?;
        fields.velocity.swap();

        backend.draw(&DrawCall::new(
            Program::Advection {
                velocity: fields.velocity.read().texture,
                source: fields.dye.read().texture,
                texel_size,
                source_texel_size: manual_filtering.then_some(fields.dye.texel_size()),
                dt,
                dissipation: config.density_dissipation,
            },
            fields.dye.write().render_target(),
        ))?;
        fields.dye.swap();

        Ok(())
    }
}
