//! Runs the fluid without a window on the CPU backend and saves the last frame.
//!
//! Usage: `splatflow_headless [frames] [output dir]`

use std::path::PathBuf;

use splatflow::software::{SoftwareCaps, SoftwareHost};
use splatflow::{create_context, SimulationConfig, SimulationContext, MAX_DELTA_TIME};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 180;
const DEFAULT_FRAMES: usize = 60;
const SEED: u64 = 0x5eed;

fn main() -> anyhow::Result<()> {
    use env_logger::Env;
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let frames = match args.next() {
        Some(arg) => arg.parse()?,
        None => DEFAULT_FRAMES,
    };
    let out_dir = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("captures"));

    let mut host = SoftwareHost::new(WIDTH, HEIGHT, SoftwareCaps::default());
    let (backend, caps) = create_context(&mut host)?;

    let config = SimulationConfig {
        sim_resolution: 64,
        dye_resolution: 256,
        bloom_resolution: 128,
        sunrays_resolution: 96,
        capture_resolution: HEIGHT,
        ..SimulationConfig::load_or_default(&SimulationConfig::default_path())
    };
    let mut sim = SimulationContext::with_seed(backend, caps, config, SEED);
    sim.init_framebuffers()?;
    sim.queue_splats(12);

    log::info!("Running {frames} frames at {WIDTH}x{HEIGHT}");
    for _ in 0..frames {
        sim.advance(MAX_DELTA_TIME)?;
    }

    let path = sim.save_capture(&out_dir)?;
    println!("{}", path.display());
    Ok(())
}
