//! Camera dragging. Orbits are applied to the live graph immediately; the new
//! origin is written back into the script only once the drag has been idle for
//! the debounce period.

use std::time::{Duration, Instant};

use crate::graph::script::replace_option;
use crate::pipeline::{ComputeBackend, RenderMode, RenderPipeline};
use crate::*;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DebounceState {
    Idle,
    PendingCommit { deadline: Instant, origin: Vec3 },
}

/// Holds back camera commits until no drag event arrived for `delay`.
#[derive(Clone, Debug)]
pub struct DragDebouncer {
    state: DebounceState,
    delay: Duration,
}

impl DragDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: DebounceState::Idle,
            delay,
        }
    }
    pub fn state(&self) -> DebounceState {
        self.state
    }
    /// Every drag event restarts the timer.
    pub fn drag(&mut self, origin: Vec3, now: Instant) {
        self.state = DebounceState::PendingCommit {
            deadline: now + self.delay,
            origin,
        };
    }
    /// Returns the origin to commit once the deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<Vec3> {
        match self.state {
            DebounceState::PendingCommit { deadline, origin } if now >= deadline => {
                self.state = DebounceState::Idle;
                Some(origin)
            }
            _ => None,
        }
    }
}

/// Drives camera orbits from pointer input.
pub struct CameraController {
    debouncer: DragDebouncer,
    last_pos: Option<Vec2>,
    scale: f32,
}

impl CameraController {
    pub fn new(delay: Duration, scale: f32) -> Self {
        Self {
            debouncer: DragDebouncer::new(delay),
            last_pos: None,
            scale,
        }
    }

    pub fn from_config<B: ComputeBackend>(pipeline: &RenderPipeline<B>) -> Self {
        let config = pipeline.config();
        Self::new(Duration::from_millis(config.debounce_ms), config.drag_scale)
    }

    pub fn debouncer(&self) -> &DragDebouncer {
        &self.debouncer
    }

    pub fn touch_down(&mut self, pos: Vec2) {
        self.last_pos = Some(pos);
    }

    /// Orbits the camera of the current graph by the pointer movement and
    /// switches the pipeline to preview rendering.
    pub fn touch_move<B: ComputeBackend>(
        &mut self,
        pos: Vec2,
        pipeline: &mut RenderPipeline<B>,
        now: Instant,
    ) -> Option<Vec3> {
        let last = self.last_pos.replace(pos)?;
        let delta = (last - pos) * self.scale;
        let graph = pipeline.graph()?;
        let res = pipeline.film().resolution().as_vec2();
        let origin = graph.camera()?.orbit(delta.x, delta.y, res.x / res.y)?;
        self.debouncer.drag(origin, now);
        pipeline.set_mode(RenderMode::Preview);
        pipeline.restart();
        Some(origin)
    }

    pub fn touch_up<B: ComputeBackend>(&mut self, pipeline: &mut RenderPipeline<B>) {
        self.last_pos = None;
        pipeline.set_mode(RenderMode::Normal);
    }

    /// Writes a due camera origin back into the script and recompiles. Returns
    /// whether a commit happened.
    pub fn poll<B: ComputeBackend>(&mut self, pipeline: &RenderPipeline<B>, now: Instant) -> bool {
        let Some(origin) = self.debouncer.poll(now) else {
            return false;
        };
        let Some(graph) = pipeline.graph() else {
            return false;
        };
        let params = Value::from_vec3(origin).format_parameters();
        let Some(source) = replace_option(graph.source(), "PinholeCamera", "origin", &params)
        else {
            log::warn!("no camera block to write the origin to");
            return false;
        };
        match pipeline.compile(&source) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("camera commit failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::RenderConfig;

    #[test]
    fn commits_only_after_idle() {
        let t0 = Instant::now();
        let ms = Duration::from_millis;
        let mut d = DragDebouncer::new(ms(200));
        assert_eq!(d.poll(t0), None);
        d.drag(Vec3::X, t0);
        d.drag(Vec3::Y, t0 + ms(150));
        assert_eq!(d.poll(t0 + ms(250)), None);
        assert!(matches!(d.state(), DebounceState::PendingCommit { .. }));
        assert_eq!(d.poll(t0 + ms(350)), Some(Vec3::Y));
        assert_eq!(d.state(), DebounceState::Idle);
        assert_eq!(d.poll(t0 + ms(1000)), None);
    }

    #[test]
    fn drag_rewrites_script() {
        let config = RenderConfig {
            width: 4,
            height: 4,
            ..Default::default()
        };
        let mut pipeline = RenderPipeline::cpu(config);
        pipeline
            .compile("PinholeCamera {\n    origin: 0, 0, -5\n}\n")
            .unwrap();
        let mut cam = CameraController::from_config(&pipeline);
        let t0 = Instant::now();

        cam.touch_down(vec2(100.0, 100.0));
        let moved = cam.touch_move(vec2(50.0, 100.0), &mut pipeline, t0).unwrap();
        assert_eq!(pipeline.mode(), RenderMode::Preview);
        assert!(!cam.poll(&pipeline, t0 + Duration::from_millis(100)));
        assert!(pipeline.graph().unwrap().source().contains("origin: 0, 0, -5"));

        assert!(cam.poll(&pipeline, t0 + Duration::from_millis(300)));
        let graph = pipeline.graph().unwrap();
        assert!(!graph.source().contains("origin: 0, 0, -5"));
        let origin = graph.camera().unwrap().origin.read().try_vec3().unwrap();
        assert!((origin - moved).length() < 1e-3);

        cam.touch_up(&mut pipeline);
        assert_eq!(pipeline.mode(), RenderMode::Normal);
    }

    #[test]
    fn commit_into_brace_attached_camera() {
        let config = RenderConfig {
            width: 4,
            height: 4,
            ..Default::default()
        };
        let mut pipeline = RenderPipeline::cpu(config);
        pipeline
            .compile("PinholeCamera{\n    origin: 0, 0, -5\n}\n")
            .unwrap();
        let mut cam = CameraController::from_config(&pipeline);
        let t0 = Instant::now();
        cam.touch_down(vec2(100.0, 100.0));
        cam.touch_move(vec2(50.0, 100.0), &mut pipeline, t0).unwrap();
        assert!(cam.poll(&pipeline, t0 + Duration::from_millis(300)));
        let source = pipeline.graph().unwrap().source().to_string();
        assert!(source.starts_with("PinholeCamera{\n    origin: "));
        assert!(!source.contains("origin: 0, 0, -5"));
    }
}
