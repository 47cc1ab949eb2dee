//! The per-frame driver: timing, resize detection, input and the loop itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::backend::GraphicsBackend;
use crate::error::FluidResult;
use crate::pointer::PointerEvent;
use crate::simulation::SimulationContext;
use crate::splat::generate_color;

/// Largest step the solver takes, whatever the wall clock says.
pub const MAX_DELTA_TIME: f32 = 1.0 / 60.0;

#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    last_update: Instant,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last_update: Instant::now(),
        }
    }

    /// Seconds since the previous call, clamped to [`MAX_DELTA_TIME`].
    pub fn calc_delta_time(&mut self, now: Instant) -> f32 {
        let dt = now.saturating_duration_since(self.last_update).as_secs_f32();
        self.last_update = now;
        dt.min(MAX_DELTA_TIME)
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

fn wrap(value: f32, min: f32, max: f32) -> f32 {
    let range = max - min;
    if range == 0.0 {
        return min;
    }
    (value - min).rem_euclid(range) + min
}

impl<B: GraphicsBackend> SimulationContext<B> {
    /// Picks up a new surface size. Returns true when it changed.
    pub fn resize_canvas(&mut self) -> bool {
        let size = self.backend.drawing_size();
        if size == self.drawing_size {
            return false;
        }
        log::debug!(
            "Surface resized {}x{} -> {}x{}",
            self.drawing_size.0,
            self.drawing_size.1,
            size.0,
            size.1
        );
        self.drawing_size = size;
        true
    }

    /// Cycles pointer colors when `colorful` is on.
    pub fn update_colors(&mut self, dt: f32) {
        if !self.config.colorful {
            return;
        }
        self.color_update_timer += dt * self.config.color_update_speed;
        if self.color_update_timer >= 1.0 {
            self.color_update_timer = wrap(self.color_update_timer, 0.0, 1.0);
            for pointer in self.pointers.iter_mut() {
                pointer.color = generate_color(&mut self.rng);
            }
        }
    }

    /// Drains one queued burst and splats every pointer that moved.
    pub fn apply_inputs(&mut self) -> FluidResult<()> {
        if let Some(amount) = self.splat_stack.pop() {
            self.apply_multiple_splats(amount)?;
        }
        for pointer in self.pointers.take_moved() {
            self.splat_pointer(&pointer)?;
        }
        Ok(())
    }

    /// Feeds a pointer event measured in surface pixels.
    pub fn handle_pointer(&mut self, event: PointerEvent) {
        let (width, height) = self.drawing_size;
        let rng = &mut self.rng;
        self.pointers.handle(event, width, height, || generate_color(rng));
    }

    /// Runs one frame using the wall clock.
    pub fn frame(&mut self) -> FluidResult<()> {
        let dt = self.clock.calc_delta_time(Instant::now());
        self.advance(dt)
    }

    /// Runs one frame with an explicit time step.
    ///
    /// When the targets cannot be reallocated for a new surface size the
    /// previous fields stay in use and the resize is retried next frame.
    pub fn advance(&mut self, dt: f32) -> FluidResult<()> {
        let previous_size = self.drawing_size;
        let resized = self.resize_canvas();
        if resized || self.fields.is_none() {
            if let Err(err) = self.init_framebuffers() {
                self.drawing_size = previous_size;
                return Err(err);
            }
        }
        self.update_colors(dt);
        self.apply_inputs()?;
        if !self.config.paused {
            self.step(dt)?;
        }
        self.render(None)?;
        self.backend.present()
    }

    /// Loops until `running` is cleared or a frame fails.
    pub fn run(&mut self, running: &AtomicBool) -> FluidResult<()> {
        while running.load(Ordering::Relaxed) {
            self.frame()?;
        }
        log::info!("Render loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::SimulationConfig;
    use crate::context::create_context;
    use crate::pointer::MOUSE_POINTER_ID;
    use crate::software::{SoftwareBackend, SoftwareCaps, SoftwareHost};

    fn context() -> SimulationContext<SoftwareBackend> {
        let mut host = SoftwareHost::new(32, 32, SoftwareCaps::default());
        let (backend, caps) = create_context(&mut host).unwrap();
        let config = SimulationConfig {
            sim_resolution: 16,
            dye_resolution: 16,
            bloom_resolution: 16,
            sunrays_resolution: 16,
            ..Default::default()
        };
        SimulationContext::with_seed(backend, caps, config, 11)
    }

    #[test]
    fn long_gap_is_clamped() {
        let start = Instant::now();
        let mut clock = FrameClock { last_update: start };
        assert_eq!(clock.calc_delta_time(start + Duration::from_secs(10)), MAX_DELTA_TIME);
        let dt = clock.calc_delta_time(start + Duration::from_secs(10) + Duration::from_millis(5));
        assert!((dt - 0.005).abs() < 1e-4);
    }

    #[test]
    fn clock_never_goes_backwards() {
        let start = Instant::now();
        let mut clock = FrameClock { last_update: start + Duration::from_secs(1) };
        assert_eq!(clock.calc_delta_time(start), 0.0);
    }

    #[test]
    fn wrap_keeps_values_in_range() {
        assert!((wrap(1.25, 0.0, 1.0) - 0.25).abs() < 1e-6);
        assert!((wrap(-0.25, 0.0, 1.0) - 0.75).abs() < 1e-6);
        assert_eq!(wrap(3.0, 2.0, 2.0), 2.0);
    }

    #[test]
    fn first_frame_allocates_and_presents() {
        let mut ctx = context();
        ctx.advance(MAX_DELTA_TIME).unwrap();
        assert!(ctx.fields().is_some());
        assert_eq!(ctx.backend().presented_frames(), 1);
        assert!(ctx.backend().screen_draws() > 0);
    }

    #[test]
    fn resize_is_detected_once() {
        let mut ctx = context();
        assert!(!ctx.resize_canvas());
        ctx.backend_mut().resize_surface(64, 32);
        assert!(ctx.resize_canvas());
        assert!(!ctx.resize_canvas());
        assert_eq!(ctx.drawing_size(), (64, 32));
    }

    #[test]
    fn colorful_mode_recolors_pointers() {
        let mut ctx = context();
        ctx.config.colorful = true;
        ctx.config.color_update_speed = 10.0;
        ctx.handle_pointer(PointerEvent::Down {
            id: MOUSE_POINTER_ID,
            x: 1.0,
            y: 1.0,
        });
        let before = ctx.pointers.get(MOUSE_POINTER_ID).unwrap().color;
        ctx.update_colors(0.05);
        assert_eq!(ctx.pointers.get(MOUSE_POINTER_ID).unwrap().color, before);
        ctx.update_colors(0.06);
        assert_ne!(ctx.pointers.get(MOUSE_POINTER_ID).unwrap().color, before);
        assert!(ctx.color_update_timer < 1.0);
    }

    #[test]
    fn queued_burst_is_consumed_by_one_frame() {
        let mut ctx = context();
        ctx.init_framebuffers().unwrap();
        ctx.queue_splats(3);
        let draws = ctx.backend().draw_count();
        ctx.apply_inputs().unwrap();
        assert_eq!(ctx.backend().draw_count() - draws, 6);
        ctx.apply_inputs().unwrap();
        assert_eq!(ctx.backend().draw_count() - draws, 6);
    }

    #[test]
    fn dragging_pointer_splats_once_per_move() {
        let mut ctx = context();
        ctx.init_framebuffers().unwrap();
        ctx.handle_pointer(PointerEvent::Down { id: 2, x: 8.0, y: 8.0 });
        ctx.handle_pointer(PointerEvent::Move { id: 2, x: 12.0, y: 8.0 });
        let draws = ctx.backend().draw_count();
        ctx.apply_inputs().unwrap();
        assert_eq!(ctx.backend().draw_count() - draws, 2);
        ctx.apply_inputs().unwrap();
        assert_eq!(ctx.backend().draw_count() - draws, 2);
    }

    #[test]
    fn run_returns_when_flag_is_clear() {
        let mut ctx = context();
        let running = AtomicBool::new(false);
        ctx.run(&running).unwrap();
        assert_eq!(ctx.backend().presented_frames(), 0);
    }
}
