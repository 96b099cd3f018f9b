//! Sample pass coordination: compiles scripts, drives the compute backend and
//! accumulates passes into the films.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::config::RenderConfig;
use crate::film::Film;
use crate::graph::{GraphContext, MaterialRef, SceneGraph};
use crate::integrator::{HitTest, NoGeometry};
use crate::model::{Command, Object};
use crate::sdf::CommandHitTest;
use crate::util::hash::pixel_seed;
use crate::util::Semaphore;
use crate::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    /// Few unjittered passes while the user interacts.
    Preview,
    Normal,
}

/// Target of one pass, one color per pixel in row major order.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    pub resolution: UVec2,
    pub pixels: Vec<Vec4>,
}

/// Everything a backend needs to evaluate one full frame.
pub struct SamplePass {
    pub graph: Arc<SceneGraph>,
    pub hit_test: Arc<dyn HitTest>,
    pub buffer: SampleBuffer,
    pub sample_index: u32,
    pub seed: u64,
    pub jitter: bool,
    pub active_material: Option<MaterialRef>,
}

pub trait ComputeBackend: Send + Sync {
    fn allocate(&self, size: UVec2) -> Result<SampleBuffer, RenderError>;
    fn submit(&self, pass: SamplePass) -> Result<SampleBuffer, RenderError>;
}

/// Evaluates passes on the CPU, pixels in parallel.
#[derive(Clone, Debug, Default)]
pub struct CpuBackend {
    /// Largest buffer `allocate` hands out, in pixels. Unlimited if `None`.
    pub max_pixels: Option<usize>,
}

impl CpuBackend {
    pub fn render_pixel(pass: &SamplePass, pixel: UVec2) -> Vec4 {
        let res = pass.buffer.resolution;
        let size = res.as_vec2();
        let seed = pixel_seed(pixel, pass.sample_index) ^ pass.seed;
        let mut ctx = GraphContext::new(size, seed);
        ctx.cam_offset = if pass.jitter {
            vec2(ctx.rng.gen(), ctx.rng.gen())
        } else {
            Vec2::splat(0.5)
        };
        // uv (0, 0) maps to the upper right corner
        ctx.uv = vec2(
            (res.x - 1 - pixel.x) as f32 / size.x,
            pixel.y as f32 / size.y,
        );
        pass.graph
            .execute_sample_with(&mut ctx, pass.hit_test.as_ref(), pass.active_material);
        ctx.out_color
    }
}

impl ComputeBackend for CpuBackend {
    fn allocate(&self, size: UVec2) -> Result<SampleBuffer, RenderError> {
        let n = (size.x * size.y) as usize;
        if n == 0 || self.max_pixels.map_or(false, |max| n > max) {
            return Err(RenderError::ResourceUnavailable(format!(
                "cannot allocate a {}x{} sample buffer",
                size.x, size.y
            )));
        }
        Ok(SampleBuffer {
            resolution: size,
            pixels: vec![Vec4::ZERO; n],
        })
    }

    fn submit(&self, pass: SamplePass) -> Result<SampleBuffer, RenderError> {
        let width = pass.buffer.resolution.x;
        let pixels = (0..pass.buffer.pixels.len())
            .into_par_iter()
            .map(|i| {
                let i = i as u32;
                Self::render_pixel(&pass, uvec2(i % width, i / width))
            })
            .collect();
        Ok(SampleBuffer {
            resolution: pass.buffer.resolution,
            pixels,
        })
    }
}

struct IconJob {
    command: Command,
    hit_test: Arc<dyn HitTest>,
}

pub struct RenderPipeline<B: ComputeBackend = CpuBackend> {
    backend: B,
    config: RenderConfig,
    graph: RwLock<Option<Arc<SceneGraph>>>,
    hit_test: Arc<dyn HitTest>,
    film: Film,
    icon_film: Film,
    semaphore: Semaphore,
    cancelled: AtomicBool,
    needs_restart: AtomicBool,
    mode: RenderMode,
    current_material: Option<MaterialRef>,
    icon_queue: VecDeque<IconJob>,
    finished_icons: Vec<(Uuid, image::RgbaImage)>,
}

impl RenderPipeline<CpuBackend> {
    pub fn cpu(config: RenderConfig) -> Self {
        Self::new(CpuBackend::default(), config)
    }
}

impl<B: ComputeBackend> RenderPipeline<B> {
    pub fn new(backend: B, config: RenderConfig) -> Self {
        Self {
            backend,
            film: Film::new(uvec2(config.width, config.height)),
            icon_film: Film::new(UVec2::splat(config.icon_size)),
            config,
            graph: RwLock::new(None),
            hit_test: Arc::new(NoGeometry),
            semaphore: Semaphore::new(1),
            cancelled: AtomicBool::new(false),
            needs_restart: AtomicBool::new(false),
            mode: RenderMode::Normal,
            current_material: None,
            icon_queue: VecDeque::new(),
            finished_icons: vec![],
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Replaces the graph if `source` compiles. On failure the previous graph
    /// keeps rendering.
    pub fn compile(&self, source: &str) -> Result<(), CompileError> {
        let graph = match SceneGraph::compile(source) {
            Ok(g) => g,
            Err(e) => {
                log::warn!("script rejected: {}", e);
                return Err(e);
            }
        };
        *self.graph.write() = Some(Arc::new(graph));
        self.restart();
        Ok(())
    }

    pub fn graph(&self) -> Option<Arc<SceneGraph>> {
        self.graph.read().clone()
    }

    pub fn set_objects(&mut self, objects: &[Object]) {
        self.set_hit_test(Arc::new(CommandHitTest::new(objects)));
    }

    pub fn set_hit_test(&mut self, hit_test: Arc<dyn HitTest>) {
        self.hit_test = hit_test;
        self.restart();
    }

    /// Clears the main film before the next pass.
    pub fn restart(&self) {
        self.needs_restart.store(true, Ordering::Release);
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }
    pub fn set_mode(&mut self, mode: RenderMode) {
        if self.mode != mode {
            log::debug!("render mode {:?}", mode);
            self.mode = mode;
            self.restart();
        }
    }

    /// Material applied where the graph does not name one. Defaults to the
    /// first material of the script.
    pub fn current_material(&self) -> Option<MaterialRef> {
        self.current_material
    }
    pub fn set_current_material(&mut self, material: Option<MaterialRef>) {
        self.current_material = material;
        self.restart();
    }

    /// Stops at the next sample boundary; the pass in flight still lands.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
    pub fn resume(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn film(&self) -> &Film {
        &self.film
    }

    pub fn max_samples(&self) -> u32 {
        match self.mode {
            RenderMode::Preview => self.config.preview_samples,
            RenderMode::Normal => self.config.main_samples,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.needs_restart.load(Ordering::Acquire)
            && self.film.samples() >= self.max_samples()
            && self.icon_queue.is_empty()
    }

    /// Queues a thumbnail of a single command.
    pub fn queue_icon(&mut self, command: Command) {
        let mut obj = Object::new(command.name.clone());
        obj.commands = vec![command.clone()];
        self.icon_queue.push_back(IconJob {
            command,
            hit_test: Arc::new(CommandHitTest::new(&[obj])),
        });
    }
    pub fn pending_icons(&self) -> usize {
        self.icon_queue.len()
    }
    pub fn take_finished_icons(&mut self) -> Vec<(Uuid, image::RgbaImage)> {
        std::mem::take(&mut self.finished_icons)
    }

    fn run_pass(
        &self,
        graph: Arc<SceneGraph>,
        hit_test: Arc<dyn HitTest>,
        size: UVec2,
        sample_index: u32,
    ) -> Result<SampleBuffer, RenderError> {
        let _permit = self.semaphore.acquire();
        let buffer = self.backend.allocate(size)?;
        let active_material = self.current_material.or(graph.default_material());
        let pass = SamplePass {
            graph,
            hit_test,
            buffer,
            sample_index,
            seed: StdRng::seed_from_u64(self.config.seed ^ sample_index as u64).gen(),
            jitter: self.mode == RenderMode::Normal,
            active_material,
        };
        self.backend.submit(pass)
    }

    /// Renders one main pass and one icon pass if either has work left.
    /// Returns whether anything was rendered.
    pub fn render_sample(&mut self) -> Result<bool, RenderError> {
        if self.is_cancelled() {
            return Ok(false);
        }
        let graph = self.graph().ok_or(RenderError::NoGraph)?;
        if self.needs_restart.swap(false, Ordering::AcqRel) {
            self.film.clear();
        }
        let mut rendered = false;

        if self.film.samples() < self.max_samples() {
            let buffer = self.run_pass(
                graph.clone(),
                self.hit_test.clone(),
                self.film.resolution(),
                self.film.samples(),
            )?;
            self.film.accumulate(&buffer.pixels)?;
            rendered = true;
        }

        if let Some(job) = self.icon_queue.front() {
            let buffer = self.run_pass(
                graph,
                job.hit_test.clone(),
                self.icon_film.resolution(),
                self.icon_film.samples(),
            )?;
            self.icon_film.accumulate(&buffer.pixels)?;
            rendered = true;
            if self.icon_film.samples() >= self.config.icon_samples {
                if let Some(job) = self.icon_queue.pop_front() {
                    log::debug!("icon for `{}` finished", job.command.name);
                    self.finished_icons
                        .push((job.command.id, self.icon_film.to_rgba_image()));
                }
                self.icon_film.clear();
            }
        }
        Ok(rendered)
    }

    /// Renders until the films are complete or the pipeline is cancelled.
    /// Returns the number of passes rendered.
    pub fn run(&mut self) -> Result<u32, RenderError> {
        let mut passes = 0;
        while !self.is_complete() && self.render_sample()? {
            passes += 1;
            if passes % 50 == 0 {
                log::info!("{} / {} samples", self.film.samples(), self.max_samples());
            }
        }
        Ok(passes)
    }
}
