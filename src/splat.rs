//! Force and dye injection.

use rand::Rng;

use crate::backend::{DrawCall, GraphicsBackend, Program};
use crate::error::FluidResult;
use crate::pointer::Pointer;
use crate::simulation::{not_allocated, SimulationContext};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splat {
    /// Normalized position, origin bottom-left.
    pub position: [f32; 2],
    /// Velocity impulse added at the centre.
    pub impulse: [f32; 2],
    pub color: [f32; 3],
    /// Gaussian radius in normalized units, already aspect-corrected.
    pub radius: f32,
}

impl Splat {
    /// True when applying the splat would not change either field.
    pub fn is_null(&self) -> bool {
        self.radius <= 0.0 || (self.impulse == [0.0; 2] && self.color == [0.0; 3])
    }
}

/// Widens the splat on landscape surfaces so it stays circular on screen.
pub fn correct_radius(radius: f32, aspect_ratio: f32) -> f32 {
    if aspect_ratio > 1.0 {
        radius * aspect_ratio
    } else {
        radius
    }
}

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    match (i as i32).rem_euclid(6) {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

/// A saturated random hue, dimmed so repeated splats don't blow out.
pub fn generate_color<R: Rng>(rng: &mut R) -> [f32; 3] {
    hsv_to_rgb(rng.gen::<f32>(), 1.0, 1.0).map(|c| c * 0.15)
}

impl<B: GraphicsBackend> SimulationContext<B> {
    /// Splat radius from the configured size for the current surface.
    pub fn splat_radius(&self) -> f32 {
        correct_radius(self.config.splat_radius / 100.0, self.aspect_ratio())
    }

    /// Adds a Gaussian impulse to velocity and dye, then swaps both.
    pub fn apply_splat(&mut self, splat: &Splat) -> FluidResult<()> {
        if splat.is_null() {
            return Ok(());
        }
        let aspect_ratio = self.aspect_ratio();
        let fields = self.fields.as_mut().ok_or_else(not_allocated)?;

        self.backend.draw(&DrawCall::new(
            Program::Splat {
                target: fields.velocity.read().texture,
                aspect_ratio,
                point: splat.position,
                color: [splat.impulse[0], splat.impulse[1], 0.0],
                radius: splat.radius,
            },
            fields.velocity.write().render_target(),
        ))?;
        fields.velocity.swap();

        self.backend.draw(&DrawCall::new(
            Program::Splat {
                target: fields.dye.read().texture,
                aspect_ratio,
                point: splat.position,
                color: splat.color,
                radius: splat.radius,
            },
            fields.dye.write().render_target(),
        ))?;
        fields.dye.swap();
        Ok(())
    }

    /// Random burst used at startup and on demand.
    pub fn apply_multiple_splats(&mut self, amount: u32) -> FluidResult<()> {
        log::debug!("Applying {amount} random splats");
        let radius = self.splat_radius();
        for _ in 0..amount {
            let color = generate_color(&mut self.rng).map(|c| c * 10.0);
            let position = [self.rng.gen::<f32>(), self.rng.gen::<f32>()];
            let impulse = [
                1000.0 * (self.rng.gen::<f32>() - 0.5),
                1000.0 * (self.rng.gen::<f32>() - 0.5),
            ];
            self.apply_splat(&Splat {
                position,
                impulse,
                color,
                radius,
            })?;
        }
        Ok(())
    }

    pub(crate) fn splat_pointer(&mut self, pointer: &Pointer) -> FluidResult<()> {
        let force = self.config.splat_force;
        let splat = Splat {
            position: pointer.texcoord,
            impulse: [pointer.delta[0] * force, pointer.delta[1] * force],
            color: pointer.color,
            radius: self.splat_radius(),
        };
        self.apply_splat(&splat)
    }

    /// Fresh pointer color drawn from the simulation's generator.
    pub fn next_color(&mut self) -> [f32; 3] {
        generate_color(&mut self.rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    use crate::config::SimulationConfig;
    use crate::context::create_context;
    use crate::software::{splat_falloff, SoftwareBackend, SoftwareCaps, SoftwareHost};

    fn context() -> SimulationContext<SoftwareBackend> {
        let mut host = SoftwareHost::new(32, 32, SoftwareCaps::default());
        let (backend, caps) = create_context(&mut host).unwrap();
        let config = SimulationConfig {
            sim_resolution: 16,
            dye_resolution: 32,
            bloom_resolution: 16,
            sunrays_resolution: 16,
            ..Default::default()
        };
        let mut ctx = SimulationContext::with_seed(backend, caps, config, 3);
        ctx.init_framebuffers().unwrap();
        ctx
    }

    /// Gaussian weight the splat gives the centre of texel `index` on a `width` x `height` grid.
    fn weight(splat: &Splat, index: usize, width: u32, height: u32) -> f32 {
        let x = (index as u32 % width) as f32;
        let y = (index as u32 / width) as f32;
        let px = (x + 0.5) / width as f32 - splat.position[0];
        let py = (y + 0.5) / height as f32 - splat.position[1];
        splat_falloff(px * px + py * py, splat.radius)
    }

    #[test]
    fn radius_widens_only_on_landscape() {
        assert_eq!(correct_radius(0.01, 2.0), 0.02);
        assert_eq!(correct_radius(0.01, 0.5), 0.01);
    }

    #[test]
    fn hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [1.0, 0.0, 0.0]);
        let green = hsv_to_rgb(1.0 / 3.0, 1.0, 1.0);
        assert!(green[1] == 1.0 && green[0] < 1e-5 && green[2] < 1e-5);
        assert_eq!(hsv_to_rgb(0.5, 0.0, 0.4), [0.4, 0.4, 0.4]);
    }

    #[test]
    fn generated_colors_are_dim() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..32 {
            let c = generate_color(&mut rng);
            assert!(c.iter().all(|&x| (0.0..=0.15 + 1e-6).contains(&x)));
            assert!(c.iter().any(|&x| (x - 0.15).abs() < 1e-6));
        }
    }

    #[test]
    fn null_splats() {
        let base = Splat {
            position: [0.5, 0.5],
            impulse: [1.0, 0.0],
            color: [0.1, 0.1, 0.1],
            radius: 0.01,
        };
        assert!(!base.is_null());
        assert!(Splat { radius: 0.0, ..base }.is_null());
        assert!(Splat {
            impulse: [0.0; 2],
            color: [0.0; 3],
            ..base
        }
        .is_null());
    }

    #[test]
    fn splat_adds_onto_existing_fields() {
        let mut ctx = context();
        let (velocity, dye) = {
            let fields = ctx.fields().unwrap();
            (fields.velocity.read().texture, fields.dye.read().texture)
        };
        ctx.backend_mut().fill_texture(velocity, [2.0, -1.0, 0.0, 1.0]).unwrap();
        ctx.backend_mut().fill_texture(dye, [0.25, 0.5, 0.125, 1.0]).unwrap();

        let splat = Splat {
            position: [0.25, 0.75],
            impulse: [40.0, -20.0],
            color: [1.0, 0.5, 0.0],
            radius: 0.01,
        };
        ctx.apply_splat(&splat).unwrap();

        let fields = ctx.fields().unwrap().clone();
        let velocity_after = ctx.backend_mut().read_pixels(fields.velocity.read().texture).unwrap();
        let dye_after = ctx.backend_mut().read_pixels(fields.dye.read().texture).unwrap();

        let mut untouched = 0;
        for (i, p) in velocity_after.iter().enumerate() {
            let f = weight(&splat, i, fields.velocity.width(), fields.velocity.height());
            assert!((p[0] - (2.0 + f * 40.0)).abs() < 1e-4, "velocity x at {i}");
            assert!((p[1] - (-1.0 - f * 20.0)).abs() < 1e-4, "velocity y at {i}");
            if f < 1e-9 {
                assert_eq!(*p, [2.0, -1.0, 0.0, 1.0]);
                untouched += 1;
            }
        }
        assert!(untouched > 0);
        assert!(velocity_after.iter().any(|p| p[0] > 2.0 + 0.5 * 40.0));

        for (i, p) in dye_after.iter().enumerate() {
            let f = weight(&splat, i, fields.dye.width(), fields.dye.height());
            let expected = [0.25 + f, 0.5 + 0.5 * f, 0.125, 1.0];
            for c in 0..4 {
                assert!((p[c] - expected[c]).abs() < 1e-4, "dye channel {c} at {i}");
            }
            if f < 1e-9 {
                assert_eq!(*p, [0.25, 0.5, 0.125, 1.0]);
            }
        }
    }
}
