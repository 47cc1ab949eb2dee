use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use winit::event::{ElementState, Event, KeyEvent, MouseButton, Touch, TouchPhase, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};

use splatflow::gpu::{WgpuBackend, WgpuHost};
use splatflow::{create_context, FluidError, PointerEvent, SimulationConfig, SimulationContext, MOUSE_POINTER_ID};

const CAPTURE_DIR: &str = "captures";
const FPS_LOG_INTERVAL_SECS: f32 = 5.0;

fn random_burst() -> u32 {
    rand::thread_rng().gen_range(5..25)
}

struct FpsCounter {
    frames: u32,
    since: Instant,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            frames: 0,
            since: Instant::now(),
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        let elapsed = self.since.elapsed().as_secs_f32();
        if elapsed >= FPS_LOG_INTERVAL_SECS {
            log::info!("{:.1} fps", self.frames as f32 / elapsed);
            self.frames = 0;
            self.since = Instant::now();
        }
    }
}

fn handle_key(sim: &mut SimulationContext<WgpuBackend>, key: KeyCode) {
    match key {
        KeyCode::KeyP => sim.toggle_pause(),
        KeyCode::Space => sim.queue_splats(random_burst()),
        KeyCode::KeyC => {
            if let Err(err) = sim.save_capture(Path::new(CAPTURE_DIR)) {
                log::error!("Capture failed: {err:?}");
            }
        }
        _ => {}
    }
}

fn touch_event(touch: &Touch) -> PointerEvent {
    let id = touch.id as i64;
    let (x, y) = (touch.location.x as f32, touch.location.y as f32);
    match touch.phase {
        TouchPhase::Started => PointerEvent::Down { id, x, y },
        TouchPhase::Moved => PointerEvent::Move { id, x, y },
        TouchPhase::Ended | TouchPhase::Cancelled => PointerEvent::Up { id },
    }
}

fn main() {
    use env_logger::Env;
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        log::error!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        event_loop.create_window(
            winit::window::WindowAttributes::default()
                .with_title("splatflow")
                .with_inner_size(winit::dpi::LogicalSize::new(1280, 720)),
        )?,
    );

    let mut host = WgpuHost::new(window.clone());
    let (backend, caps) = match create_context(&mut host) {
        Ok(pair) => pair,
        Err(err) => {
            log::error!("Cannot start the simulation: {err}");
            return Ok(());
        }
    };

    let config = SimulationConfig::load_or_default(&SimulationConfig::default_path());
    let mut sim = SimulationContext::new(backend, caps, config);
    sim.init_framebuffers()?;
    sim.queue_splats(random_burst());

    let mut cursor = (0.0f32, 0.0f32);
    let mut fps = FpsCounter::new();

    event_loop.run(move |event, target| match event {
        Event::WindowEvent { event, window_id } if window_id == window.id() => match event {
            WindowEvent::CloseRequested => target.exit(),
            WindowEvent::Resized(size) => sim.backend_mut().resize_surface(size.width, size.height),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if key == KeyCode::Escape {
                    target.exit();
                } else {
                    handle_key(&mut sim, key);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                cursor = (position.x as f32, position.y as f32);
                sim.handle_pointer(PointerEvent::Move {
                    id: MOUSE_POINTER_ID,
                    x: cursor.0,
                    y: cursor.1,
                });
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let event = match state {
                    ElementState::Pressed => PointerEvent::Down {
                        id: MOUSE_POINTER_ID,
                        x: cursor.0,
                        y: cursor.1,
                    },
                    ElementState::Released => PointerEvent::Up { id: MOUSE_POINTER_ID },
                };
                sim.handle_pointer(event);
            }
            WindowEvent::Touch(touch) => sim.handle_pointer(touch_event(&touch)),
            WindowEvent::RedrawRequested => match sim.frame() {
                Ok(()) => fps.tick(),
                Err(err) if !err.is_fatal() => log::debug!("Skipped frame: {err}"),
                Err(err @ FluidError::AllocationFailure { .. }) if sim.fields().is_some() => {
                    log::warn!("Keeping the previous resolution: {err}");
                }
                Err(err) => {
                    log::error!("Frame failed: {err}");
                    target.exit();
                }
            },
            _ => {}
        },
        Event::AboutToWait => window.request_redraw(),
        _ => {}
    })?;
    Ok(())
}
