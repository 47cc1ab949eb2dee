//! Tunable simulation settings and their JSON persistence.

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::context::Capabilities;

pub const SETTINGS_FILE_NAME: &str = "splatflow_settings.json";

/// Dye resolution used when the host cannot linearly filter float textures.
const LOW_QUALITY_DYE_RESOLUTION: u32 = 512;

/// Background color in 0..=255 channel units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BackColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl BackColor {
    pub fn normalized(&self) -> [f32; 4] {
        [self.r / 255.0, self.g / 255.0, self.b / 255.0, 1.0]
    }
}

impl Default for BackColor {
    fn default() -> Self {
        Self { r: 0.0, g: 0.0, b: 0.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub sim_resolution: u32,
    pub dye_resolution: u32,
    pub capture_resolution: u32,
    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    /// Fraction of last frame's pressure kept as the Jacobi starting guess (0 = cold start).
    pub pressure: f32,
    pub pressure_iterations: u32,
    pub curl: f32,
    pub splat_radius: f32,
    pub splat_force: f32,
    pub shading: bool,
    pub colorful: bool,
    pub color_update_speed: f32,
    pub paused: bool,
    pub back_color: BackColor,
    pub transparent: bool,
    pub bloom: bool,
    pub bloom_iterations: u32,
    pub bloom_resolution: u32,
    pub bloom_intensity: f32,
    pub bloom_threshold: f32,
    pub bloom_soft_knee: f32,
    pub sunrays: bool,
    pub sunrays_resolution: u32,
    pub sunrays_weight: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sim_resolution: 128,
            dye_resolution: 1024,
            capture_resolution: 512,
            density_dissipation: 1.0,
            velocity_dissipation: 0.2,
            pressure: 0.55,
            pressure_iterations: 20,
            curl: 15.0,
            splat_radius: 0.25,
            splat_force: 6000.0,
            shading: true,
            colorful: false,
            color_update_speed: 10.0,
            paused: false,
            back_color: BackColor::default(),
            transparent: false,
            bloom: true,
            bloom_iterations: 8,
            bloom_resolution: 256,
            bloom_intensity: 0.8,
            bloom_threshold: 0.6,
            bloom_soft_knee: 0.7,
            sunrays: true,
            sunrays_resolution: 196,
            sunrays_weight: 1.0,
        }
    }
}

impl SimulationConfig {
    pub fn default_path() -> PathBuf {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(SETTINGS_FILE_NAME)
    }

    pub fn load_from_disk(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&data)?;
        config.sanitize();
        Ok(config)
    }

    pub fn save_to_disk(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Loads `path` when it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            log::info!("No settings at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load_from_disk(path) {
            Ok(config) => {
                log::info!("Loaded settings from {}", path.display());
                config
            }
            Err(err) => {
                log::warn!("Failed to load settings {}: {err:?}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn sanitize(&mut self) {
        self.sim_resolution = self.sim_resolution.clamp(8, 1024);
        self.dye_resolution = self.dye_resolution.clamp(8, 4096);
        self.capture_resolution = self.capture_resolution.clamp(8, 4096);
        self.density_dissipation = self.density_dissipation.clamp(0.0, 10.0);
        self.velocity_dissipation = self.velocity_dissipation.clamp(0.0, 10.0);
        self.pressure = self.pressure.clamp(0.0, 1.0);
        self.pressure_iterations = self.pressure_iterations.clamp(1, 200);
        self.curl = self.curl.clamp(0.0, 100.0);
        self.splat_radius = self.splat_radius.clamp(0.0, 2.0);
        self.splat_force = self.splat_force.clamp(0.0, 50_000.0);
        self.color_update_speed = self.color_update_speed.clamp(0.0, 100.0);
        self.back_color.r = self.back_color.r.clamp(0.0, 255.0);
        self.back_color.g = self.back_color.g.clamp(0.0, 255.0);
        self.back_color.b = self.back_color.b.clamp(0.0, 255.0);
        self.bloom_iterations = self.bloom_iterations.clamp(1, 16);
        self.bloom_resolution = self.bloom_resolution.clamp(8, 2048);
        self.bloom_intensity = self.bloom_intensity.clamp(0.0, 5.0);
        self.bloom_threshold = self.bloom_threshold.clamp(0.0, 1.0);
        self.bloom_soft_knee = self.bloom_soft_knee.clamp(0.0, 1.0);
        self.sunrays_resolution = self.sunrays_resolution.clamp(8, 2048);
        self.sunrays_weight = self.sunrays_weight.clamp(0.0, 5.0);
    }

    /// Downgrades quality settings the host cannot support.
    pub fn apply_capabilities(&mut self, caps: &Capabilities) {
        if caps.supports_linear_filtering {
            return;
        }
        log::warn!("Linear filtering of float textures unsupported; lowering quality");
        self.dye_resolution = self.dye_resolution.min(LOW_QUALITY_DYE_RESOLUTION);
        self.shading = false;
        self.bloom = false;
        self.sunrays = false;
    }

    /// Soft-knee curve for the bloom prefilter: `(threshold - knee, 2 * knee, 0.25 / knee)`.
    pub fn bloom_curve(&self) -> [f32; 3] {
        let knee = self.bloom_threshold * self.bloom_soft_knee + 0.0001;
        [self.bloom_threshold - knee, knee * 2.0, 0.25 / knee]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{TexelType, TextureFormat};
    use crate::context::FormatPair;

    #[test]
    fn missing_fields_take_defaults() {
        let config: SimulationConfig = serde_json::from_str(r#"{ "curl": 42.0 }"#).unwrap();
        assert_eq!(config.curl, 42.0);
        assert_eq!(config.pressure_iterations, 20);
        assert_eq!(config.dye_resolution, 1024);
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut config = SimulationConfig {
            pressure: 3.0,
            pressure_iterations: 0,
            bloom_threshold: -1.0,
            ..Default::default()
        };
        config.sanitize();
        assert_eq!(config.pressure, 1.0);
        assert_eq!(config.pressure_iterations, 1);
        assert_eq!(config.bloom_threshold, 0.0);
    }

    #[test]
    fn no_linear_filtering_disables_post_processing() {
        let caps = Capabilities {
            supports_linear_filtering: false,
            half_float_type: TexelType::HalfFloat,
            rgba: Some(FormatPair::new(TextureFormat::Rgba16Float)),
            rg: Some(FormatPair::new(TextureFormat::Rg16Float)),
            r: Some(FormatPair::new(TextureFormat::R16Float)),
        };
        let mut config = SimulationConfig::default();
        config.apply_capabilities(&caps);
        assert_eq!(config.dye_resolution, 512);
        assert!(!config.shading && !config.bloom && !config.sunrays);
    }

    #[test]
    fn settings_survive_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let config = SimulationConfig {
            paused: true,
            back_color: BackColor { r: 10.0, g: 20.0, b: 30.0 },
            ..Default::default()
        };
        config.save_to_disk(&path).unwrap();
        assert_eq!(SimulationConfig::load_from_disk(&path).unwrap(), config);
    }

    #[test]
    fn missing_settings_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SimulationConfig::load_or_default(&dir.path().join("absent.json"));
        assert_eq!(config, SimulationConfig::default());
    }
}
