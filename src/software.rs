//! CPU implementation of the drawing contract.
//!
//! Runs every program with the same math as the WGSL module, texel by texel.
//! Used for headless runs and for tests; [`SoftwareCaps`] lets a caller take
//! capabilities away to exercise the degraded paths.

use std::collections::BTreeMap;

use crate::backend::{
    Blend, ChannelLayout, DrawCall, Filter, GraphicsBackend, Program, RenderTarget, TexelType, TextureDesc,
    TextureFormat, TextureId,
};
use crate::context::{ApiLevel, ContextProvider};
use crate::error::{FluidError, FluidResult};

const SUNRAYS_ITERATIONS: usize = 16;
const SUNRAYS_DENSITY: f32 = 0.3;
const SUNRAYS_DECAY: f32 = 0.95;
const SUNRAYS_EXPOSURE: f32 = 0.7;
const CHECKERBOARD_SCALE: f32 = 25.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SoftwareCaps {
    pub primary_api: bool,
    pub fallback_api: bool,
    pub renderable: Vec<TextureFormat>,
    pub linear_filtering: bool,
    pub half_float_type: TexelType,
    pub max_texture_size: u32,
}

impl Default for SoftwareCaps {
    fn default() -> Self {
        Self {
            primary_api: true,
            fallback_api: true,
            renderable: vec![
                TextureFormat::Rgba16Float,
                TextureFormat::Rg16Float,
                TextureFormat::R16Float,
                TextureFormat::Rgba8Unorm,
            ],
            linear_filtering: true,
            half_float_type: TexelType::HalfFloat,
            max_texture_size: 4096,
        }
    }
}

/// Hands out software contexts for a surface of a fixed starting size.
pub struct SoftwareHost {
    width: u32,
    height: u32,
    caps: SoftwareCaps,
}

impl SoftwareHost {
    pub fn new(width: u32, height: u32, caps: SoftwareCaps) -> Self {
        Self { width, height, caps }
    }
}

impl ContextProvider for SoftwareHost {
    type Backend = SoftwareBackend;

    fn create_context(&mut self, level: ApiLevel) -> Option<SoftwareBackend> {
        let available = match level {
            ApiLevel::Primary => self.caps.primary_api,
            ApiLevel::Fallback => self.caps.fallback_api,
        };
        if !available {
            return None;
        }
        let mut backend = SoftwareBackend::new(self.width, self.height, self.caps.clone());
        if level == ApiLevel::Fallback {
            backend.api = "software (fallback)";
        }
        Some(backend)
    }
}

#[derive(Debug, Clone)]
struct SoftTexture {
    width: u32,
    height: u32,
    format: TextureFormat,
    filter: Filter,
    data: Vec<[f32; 4]>,
}

impl SoftTexture {
    fn new(width: u32, height: u32, format: TextureFormat, filter: Filter) -> Self {
        let mut texture = Self {
            width,
            height,
            format,
            filter,
            data: vec![[0.0; 4]; (width * height) as usize],
        };
        let blank = texture.store([0.0; 4]);
        texture.data.iter_mut().for_each(|p| *p = blank);
        texture
    }

    /// Applies the format's channel layout and precision to a shaded value.
    fn store(&self, value: [f32; 4]) -> [f32; 4] {
        let mut v = match self.format.channels() {
            ChannelLayout::R => [value[0], 0.0, 0.0, 1.0],
            ChannelLayout::Rg => [value[0], value[1], 0.0, 1.0],
            ChannelLayout::Rgba => value,
        };
        if self.format == TextureFormat::Rgba8Unorm {
            for c in v.iter_mut() {
                *c = (c.clamp(0.0, 1.0) * 255.0).round() / 255.0;
            }
        }
        v
    }

    fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.data[y * self.width as usize + x]
    }

    fn sample_nearest(&self, uv: [f32; 2]) -> [f32; 4] {
        let x = (uv[0] * self.width as f32).floor() as i64;
        let y = (uv[1] * self.height as f32).floor() as i64;
        self.texel(x, y)
    }

    fn sample_linear(&self, uv: [f32; 2]) -> [f32; 4] {
        let x = uv[0] * self.width as f32 - 0.5;
        let y = uv[1] * self.height as f32 - 0.5;
        let (x0, y0) = (x.floor(), y.floor());
        let (fx, fy) = (x - x0, y - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);
        let a = self.texel(x0, y0);
        let b = self.texel(x0 + 1, y0);
        let c = self.texel(x0, y0 + 1);
        let d = self.texel(x0 + 1, y0 + 1);
        mix(mix(a, b, fx), mix(c, d, fx), fy)
    }
}

pub struct SoftwareBackend {
    api: &'static str,
    caps: SoftwareCaps,
    textures: BTreeMap<TextureId, SoftTexture>,
    next_id: u32,
    screen: SoftTexture,
    viewport: (u32, u32),
    draw_count: usize,
    screen_draws: usize,
    presented_frames: usize,
}

impl SoftwareBackend {
    pub fn new(width: u32, height: u32, caps: SoftwareCaps) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            api: "software",
            caps,
            textures: BTreeMap::new(),
            next_id: 1,
            screen: SoftTexture::new(width, height, TextureFormat::Rgba8Unorm, Filter::Nearest),
            viewport: (width, height),
            draw_count: 0,
            screen_draws: 0,
            presented_frames: 0,
        }
    }

    /// Host-side resize of the presentation surface.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        self.screen = SoftTexture::new(width.max(1), height.max(1), TextureFormat::Rgba8Unorm, Filter::Nearest);
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn draw_count(&self) -> usize {
        self.draw_count
    }

    pub fn screen_draws(&self) -> usize {
        self.screen_draws
    }

    pub fn presented_frames(&self) -> usize {
        self.presented_frames
    }

    pub fn screen_pixels(&self) -> &[[f32; 4]] {
        &self.screen.data
    }

    pub fn write_pixels(&mut self, id: TextureId, pixels: &[[f32; 4]]) -> FluidResult<()> {
        let texture = self
            .textures
            .get_mut(&id)
            .ok_or_else(|| FluidError::Backend(format!("unknown texture {id:?}")))?;
        if pixels.len() != texture.data.len() {
            return Err(FluidError::Backend(format!(
                "expected {} texels, got {}",
                texture.data.len(),
                pixels.len()
            )));
        }
        for (dst, src) in texture.data.iter_mut().zip(pixels) {
            *dst = *src;
        }
        let stored: Vec<_> = texture.data.iter().map(|p| texture.store(*p)).collect();
        texture.data = stored;
        Ok(())
    }

    pub fn fill_texture(&mut self, id: TextureId, value: [f32; 4]) -> FluidResult<()> {
        let len = self
            .textures
            .get(&id)
            .map(|t| t.data.len())
            .ok_or_else(|| FluidError::Backend(format!("unknown texture {id:?}")))?;
        self.write_pixels(id, &vec![value; len])
    }

    fn input(&self, id: Option<TextureId>) -> FluidResult<Option<&SoftTexture>> {
        match id {
            None => Ok(None),
            Some(id) => self
                .textures
                .get(&id)
                .map(Some)
                .ok_or_else(|| FluidError::Backend(format!("draw reads unknown texture {id:?}"))),
        }
    }

    fn sample(&self, texture: &SoftTexture, uv: [f32; 2]) -> [f32; 4] {
        if texture.filter == Filter::Linear && self.caps.linear_filtering {
            texture.sample_linear(uv)
        } else {
            texture.sample_nearest(uv)
        }
    }

    fn shade(&self, program: &Program, inputs: [Option<&SoftTexture>; 3], uv: [f32; 2]) -> [f32; 4] {
        let t0 = inputs[0];
        let t1 = inputs[1];
        let s0 = |p: [f32; 2]| t0.map(|t| self.sample(t, p)).unwrap_or([0.0; 4]);
        let s1 = |p: [f32; 2]| t1.map(|t| self.sample(t, p)).unwrap_or([0.0; 4]);
        let neighbours = |texel: [f32; 2]| {
            (
                [uv[0] - texel[0], uv[1]],
                [uv[0] + texel[0], uv[1]],
                [uv[0], uv[1] + texel[1]],
                [uv[0], uv[1] - texel[1]],
            )
        };

        match program {
            Program::Copy { .. } => s0(uv),
            Program::Clear { value, .. } => scale(s0(uv), *value),
            Program::Color { color } => *color,
            Program::Checkerboard { aspect_ratio } => {
                let x = (uv[0] * CHECKERBOARD_SCALE * aspect_ratio).floor();
                let y = (uv[1] * CHECKERBOARD_SCALE).floor();
                let v = (x + y).rem_euclid(2.0) * 0.1 + 0.8;
                [v, v, v, 1.0]
            }
            Program::Splat {
                aspect_ratio,
                point,
                color,
                radius,
                ..
            } => {
                let base = s0(uv);
                let px = (uv[0] - point[0]) * aspect_ratio;
                let py = uv[1] - point[1];
                let falloff = splat_falloff(px * px + py * py, *radius);
                [
                    base[0] + falloff * color[0],
                    base[1] + falloff * color[1],
                    base[2] + falloff * color[2],
                    base[3],
                ]
            }
            Program::Curl { texel_size, .. } => {
                let (l, r, t, b) = neighbours(*texel_size);
                let vorticity = s0(r)[1] - s0(l)[1] - s0(t)[0] + s0(b)[0];
                [0.5 * vorticity, 0.0, 0.0, 1.0]
            }
            Program::Vorticity {
                texel_size,
                curl_strength,
                dt,
                ..
            } => {
                let (l, r, t, b) = neighbours(*texel_size);
                let (cl, cr, ct, cb) = (s1(l)[0], s1(r)[0], s1(t)[0], s1(b)[0]);
                let c = s1(uv)[0];
                let mut force = [0.5 * (ct.abs() - cb.abs()), 0.5 * (cr.abs() - cl.abs())];
                let len = (force[0] * force[0] + force[1] * force[1]).sqrt() + 0.0001;
                force = [force[0] / len * curl_strength * c, -force[1] / len * curl_strength * c];
                let v = s0(uv);
                [
                    (v[0] + force[0] * dt).clamp(-1000.0, 1000.0),
                    (v[1] + force[1] * dt).clamp(-1000.0, 1000.0),
                    0.0,
                    1.0,
                ]
            }
            Program::Divergence { texel_size, .. } => {
                let (l, r, t, b) = neighbours(*texel_size);
                let c = s0(uv);
                let vl = if l[0] < 0.0 { -c[0] } else { s0(l)[0] };
                let vr = if r[0] > 1.0 { -c[0] } else { s0(r)[0] };
                let vt = if t[1] > 1.0 { -c[1] } else { s0(t)[1] };
                let vb = if b[1] < 0.0 { -c[1] } else { s0(b)[1] };
                [0.5 * (vr - vl + vt - vb), 0.0, 0.0, 1.0]
            }
            Program::Pressure { texel_size, .. } => {
                let (l, r, t, b) = neighbours(*texel_size);
                let divergence = s1(uv)[0];
                let p = (s0(l)[0] + s0(r)[0] + s0(b)[0] + s0(t)[0] - divergence) * 0.25;
                [p, 0.0, 0.0, 1.0]
            }
            Program::GradientSubtract { texel_size, .. } => {
                let (l, r, t, b) = neighbours(*texel_size);
                let v = s1(uv);
                [
                    v[0] - (s0(r)[0] - s0(l)[0]),
                    v[1] - (s0(t)[0] - s0(b)[0]),
                    0.0,
                    1.0,
                ]
            }
            Program::Advection {
                texel_size,
                source_texel_size,
                dt,
                dissipation,
                ..
            } => {
                let result = match (source_texel_size, t0, t1) {
                    (Some(source_texel), Some(velocity), Some(source)) => {
                        let v = bilerp(velocity, uv, *texel_size);
                        let coord = [uv[0] - dt * v[0] * texel_size[0], uv[1] - dt * v[1] * texel_size[1]];
                        bilerp(source, coord, *source_texel)
                    }
                    _ => {
                        let v = s0(uv);
                        let coord = [uv[0] - dt * v[0] * texel_size[0], uv[1] - dt * v[1] * texel_size[1]];
                        s1(coord)
                    }
                };
                scale(result, 1.0 / (1.0 + dissipation * dt))
            }
            Program::BloomPrefilter { curve, threshold, .. } => {
                let c = s0(uv);
                let br = c[0].max(c[1]).max(c[2]);
                let rq = (br - curve[0]).clamp(0.0, curve[1]);
                let rq = curve[2] * rq * rq;
                let k = rq.max(br - threshold) / br.max(0.0001);
                [c[0] * k, c[1] * k, c[2] * k, 0.0]
            }
            Program::BloomBlur { texel_size, .. } => {
                let (l, r, t, b) = neighbours(*texel_size);
                scale(add4(add4(s0(l), s0(r)), add4(s0(t), s0(b))), 0.25)
            }
            Program::BloomFinal {
                texel_size, intensity, ..
            } => {
                let (l, r, t, b) = neighbours(*texel_size);
                scale(add4(add4(s0(l), s0(r)), add4(s0(t), s0(b))), 0.25 * intensity)
            }
            Program::SunraysMask { .. } => {
                let c = s0(uv);
                let br = c[0].max(c[1]).max(c[2]);
                [c[0], c[1], c[2], 1.0 - (br * 20.0).max(0.0).min(0.8)]
            }
            Program::Sunrays { weight, .. } => {
                let step = 1.0 / SUNRAYS_ITERATIONS as f32 * SUNRAYS_DENSITY;
                let dir = [(uv[0] - 0.5) * step, (uv[1] - 0.5) * step];
                let mut coord = uv;
                let mut decay = 1.0;
                let mut color = s0(uv)[3];
                for _ in 0..SUNRAYS_ITERATIONS {
                    coord = [coord[0] - dir[0], coord[1] - dir[1]];
                    color += s0(coord)[3] * decay * weight;
                    decay *= SUNRAYS_DECAY;
                }
                [color * SUNRAYS_EXPOSURE, 0.0, 0.0, 1.0]
            }
            Program::Blur { texel_size, .. } => {
                let offset = [texel_size[0] * 1.333_333_3, texel_size[1] * 1.333_333_3];
                let l = s0([uv[0] - offset[0], uv[1] - offset[1]]);
                let r = s0([uv[0] + offset[0], uv[1] + offset[1]]);
                add4(scale(s0(uv), 0.294_117_64), scale(add4(l, r), 0.352_941_17))
            }
            Program::Display {
                shading,
                texel_size,
                ..
            } => {
                let mut c = rgb(s0(uv));
                if *shading {
                    let (l, r, t, b) = neighbours(*texel_size);
                    let dx = length3(rgb(s0(r))) - length3(rgb(s0(l)));
                    let dy = length3(rgb(s0(t))) - length3(rgb(s0(b)));
                    let n = normalize3([dx, dy, (texel_size[0] * texel_size[0] + texel_size[1] * texel_size[1]).sqrt()]);
                    let diffuse = (n[2] + 0.7).clamp(0.7, 1.0);
                    c = c.map(|x| x * diffuse);
                }
                let mut bloom = inputs[1].map(|t| rgb(self.sample(t, uv)));
                if let Some(sunrays) = inputs[2] {
                    let s = self.sample(sunrays, uv)[0];
                    c = c.map(|x| x * s);
                    bloom = bloom.map(|b| b.map(|x| x * s));
                }
                if let Some(bloom) = bloom {
                    let bloom = bloom.map(linear_to_gamma);
                    c = [c[0] + bloom[0], c[1] + bloom[1], c[2] + bloom[2]];
                }
                let a = c[0].max(c[1]).max(c[2]);
                [c[0], c[1], c[2], a]
            }
        }
    }
}

impl GraphicsBackend for SoftwareBackend {
    fn api_name(&self) -> &str {
        self.api
    }

    fn supports_linear_filtering(&self) -> bool {
        self.caps.linear_filtering
    }

    fn half_float_type(&self) -> TexelType {
        self.caps.half_float_type
    }

    fn probe_render_target(&mut self, format: TextureFormat) -> bool {
        let desc = TextureDesc {
            label: "format probe".into(),
            width: 4,
            height: 4,
            format,
            filter: Filter::Nearest,
        };
        match self.create_texture(&desc) {
            Ok(id) => {
                self.destroy_texture(id);
                true
            }
            Err(_) => false,
        }
    }

    fn drawing_size(&self) -> (u32, u32) {
        (self.screen.width, self.screen.height)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> FluidResult<TextureId> {
        if !self.caps.renderable.contains(&desc.format) {
            return Err(FluidError::allocation(
                &desc.label,
                desc.width,
                desc.height,
                format!("{:?} is not renderable", desc.format),
            ));
        }
        let max = self.caps.max_texture_size;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(FluidError::allocation(
                &desc.label,
                desc.width,
                desc.height,
                format!("size outside 1..={max}"),
            ));
        }
        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.textures
            .insert(id, SoftTexture::new(desc.width, desc.height, desc.format, desc.filter));
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    fn draw(&mut self, call: &DrawCall) -> FluidResult<()> {
        if let RenderTarget::Texture(id) = call.target {
            if call.program.reads(id) {
                return Err(FluidError::Backend(format!(
                    "{:?} pass reads and writes {id:?}",
                    call.program.kind()
                )));
            }
        }

        let ids = call.program.inputs();
        let inputs = [self.input(ids[0])?, self.input(ids[1])?, self.input(ids[2])?];
        let target = match call.target {
            RenderTarget::Screen => &self.screen,
            RenderTarget::Texture(id) => self
                .textures
                .get(&id)
                .ok_or_else(|| FluidError::Backend(format!("draw targets unknown texture {id:?}")))?,
        };
        let (width, height) = (target.width, target.height);

        let mut out = Vec::with_capacity(target.data.len());
        for y in 0..height {
            for x in 0..width {
                let uv = [(x as f32 + 0.5) / width as f32, (y as f32 + 0.5) / height as f32];
                let src = self.shade(&call.program, inputs, uv);
                let dst = target.data[(y * width + x) as usize];
                out.push(target.store(blend(call.blend, src, dst)));
            }
        }

        match call.target {
            RenderTarget::Screen => {
                self.screen.data = out;
                self.screen_draws += 1;
            }
            RenderTarget::Texture(id) => {
                if let Some(texture) = self.textures.get_mut(&id) {
                    texture.data = out;
                }
            }
        }
        self.viewport = (width, height);
        self.draw_count += 1;
        Ok(())
    }

    fn read_pixels(&mut self, id: TextureId) -> FluidResult<Vec<[f32; 4]>> {
        self.textures
            .get(&id)
            .map(|t| t.data.clone())
            .ok_or_else(|| FluidError::Backend(format!("unknown texture {id:?}")))
    }

    fn present(&mut self) -> FluidResult<()> {
        self.presented_frames += 1;
        Ok(())
    }
}

/// Gaussian weight of a splat; a non-positive radius contributes nothing.
pub fn splat_falloff(distance_sq: f32, radius: f32) -> f32 {
    if radius <= 0.0 {
        return 0.0;
    }
    (-distance_sq / radius).exp()
}

fn blend(mode: Blend, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    match mode {
        Blend::Replace => src,
        Blend::Additive => add4(src, dst),
        Blend::PremultipliedOver => add4(src, scale(dst, 1.0 - src[3])),
    }
}

fn bilerp(texture: &SoftTexture, uv: [f32; 2], texel: [f32; 2]) -> [f32; 4] {
    let st = [uv[0] / texel[0] - 0.5, uv[1] / texel[1] - 0.5];
    let i = [st[0].floor(), st[1].floor()];
    let f = [st[0] - i[0], st[1] - i[1]];
    let at = |dx: f32, dy: f32| texture.sample_nearest([(i[0] + dx) * texel[0], (i[1] + dy) * texel[1]]);
    let a = at(0.5, 0.5);
    let b = at(1.5, 0.5);
    let c = at(0.5, 1.5);
    let d = at(1.5, 1.5);
    mix(mix(a, b, f[0]), mix(c, d, f[0]), f[1])
}

fn linear_to_gamma(x: f32) -> f32 {
    let x = x.max(0.0);
    (1.055 * x.powf(0.416_666_67) - 0.055).max(0.0)
}

fn mix(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}

fn add4(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]]
}

fn scale(a: [f32; 4], s: f32) -> [f32; 4] {
    a.map(|x| x * s)
}

fn rgb(a: [f32; 4]) -> [f32; 3] {
    [a[0], a[1], a[2]]
}

fn length3(v: [f32; 3]) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

fn normalize3(v: [f32; 3]) -> [f32; 3] {
    let len = length3(v);
    if len == 0.0 {
        return v;
    }
    v.map(|x| x / len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SoftwareBackend {
        SoftwareBackend::new(16, 16, SoftwareCaps::default())
    }

    fn texture(backend: &mut SoftwareBackend, w: u32, h: u32, format: TextureFormat) -> TextureId {
        backend
            .create_texture(&TextureDesc {
                label: "test".into(),
                width: w,
                height: h,
                format,
                filter: Filter::Linear,
            })
            .unwrap()
    }

    #[test]
    fn unrenderable_format_fails_allocation() {
        let mut backend = SoftwareBackend::new(
            16,
            16,
            SoftwareCaps {
                renderable: vec![TextureFormat::Rgba8Unorm],
                ..SoftwareCaps::default()
            },
        );
        assert!(!backend.probe_render_target(TextureFormat::R16Float));
        assert!(backend.probe_render_target(TextureFormat::Rgba8Unorm));
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn pass_cannot_read_its_own_target() {
        let mut backend = backend();
        let id = texture(&mut backend, 4, 4, TextureFormat::Rgba16Float);
        let call = DrawCall::new(Program::Copy { source: id }, RenderTarget::Texture(id));
        assert!(matches!(backend.draw(&call), Err(FluidError::Backend(_))));
    }

    #[test]
    fn single_channel_targets_drop_extra_channels() {
        let mut backend = backend();
        let src = texture(&mut backend, 2, 2, TextureFormat::Rgba16Float);
        let dst = texture(&mut backend, 2, 2, TextureFormat::R16Float);
        backend.fill_texture(src, [0.3, 0.6, 0.9, 0.5]).unwrap();
        backend
            .draw(&DrawCall::new(Program::Copy { source: src }, RenderTarget::Texture(dst)))
            .unwrap();
        assert!(backend.read_pixels(dst).unwrap().iter().all(|p| *p == [0.3, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn additive_blend_accumulates() {
        let mut backend = backend();
        let src = texture(&mut backend, 2, 2, TextureFormat::Rgba16Float);
        let dst = texture(&mut backend, 2, 2, TextureFormat::Rgba16Float);
        backend.fill_texture(src, [0.25, 0.0, 0.0, 0.0]).unwrap();
        backend.fill_texture(dst, [0.5, 0.0, 0.0, 0.0]).unwrap();
        let call = DrawCall::new(Program::Copy { source: src }, RenderTarget::Texture(dst)).with_blend(Blend::Additive);
        backend.draw(&call).unwrap();
        assert!(backend.read_pixels(dst).unwrap().iter().all(|p| (p[0] - 0.75).abs() < 1e-6));
    }

    #[test]
    fn splat_peaks_at_its_point() {
        let mut backend = backend();
        let src = texture(&mut backend, 8, 8, TextureFormat::Rgba16Float);
        let dst = texture(&mut backend, 8, 8, TextureFormat::Rgba16Float);
        let splat = Program::Splat {
            target: src,
            aspect_ratio: 1.0,
            point: [0.5625, 0.5625],
            color: [1.0, 0.0, 0.0],
            radius: 0.01,
        };
        backend.draw(&DrawCall::new(splat, RenderTarget::Texture(dst))).unwrap();
        let pixels = backend.read_pixels(dst).unwrap();
        let centre = pixels[4 * 8 + 4][0];
        assert!((centre - 1.0).abs() < 1e-6);
        assert!(pixels.iter().all(|p| p[0] <= centre));
        assert!(pixels[0][0] < 0.01);
    }

    #[test]
    fn falloff_with_zero_radius_is_zero() {
        assert_eq!(splat_falloff(0.0, 0.0), 0.0);
        assert_eq!(splat_falloff(0.3, -1.0), 0.0);
        assert!((splat_falloff(0.0, 0.5) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unorm_targets_clamp_and_quantise() {
        let mut backend = backend();
        let src = texture(&mut backend, 1, 1, TextureFormat::Rgba16Float);
        let dst = texture(&mut backend, 1, 1, TextureFormat::Rgba8Unorm);
        backend.fill_texture(src, [2.0, -1.0, 0.5, 1.0]).unwrap();
        backend
            .draw(&DrawCall::new(Program::Copy { source: src }, RenderTarget::Texture(dst)))
            .unwrap();
        let p = backend.read_pixels(dst).unwrap()[0];
        assert_eq!(p[0], 1.0);
        assert_eq!(p[1], 0.0);
        assert!((p[2] - 128.0 / 255.0).abs() < 1e-6);
    }
}
