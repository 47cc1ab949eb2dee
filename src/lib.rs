//! Interactive 2D dye fluid on the GPU.
//!
//! A [`SimulationContext`] owns a drawing backend and every field of the
//! fluid. Each frame it injects splats from pointers, advances the fluid one
//! explicit step, and composites the dye with optional bloom and sunrays.
//! [`gpu::WgpuBackend`] draws through wgpu; [`software::SoftwareBackend`]
//! runs the same passes on the CPU.

pub mod backend;
pub mod capture;
pub mod config;
pub mod context;
pub mod error;
pub mod frame;
pub mod framebuffer;
pub mod gpu;
pub mod pointer;
mod render;
pub mod simulation;
pub mod software;
pub mod splat;
mod stepper;

pub use backend::{Blend, DrawCall, GraphicsBackend, Program, RenderTarget, TextureFormat, TextureId};
pub use config::{BackColor, SimulationConfig};
pub use context::{create_context, ApiLevel, Capabilities, ContextProvider, FormatPair};
pub use error::{FluidError, FluidResult};
pub use frame::{FrameClock, MAX_DELTA_TIME};
pub use framebuffer::{DoubleBuffer, FramebufferTarget};
pub use pointer::{PointerEvent, MOUSE_POINTER_ID};
pub use simulation::{FluidFields, SimulationContext};
pub use splat::Splat;
