use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::bsdf::Material;
use crate::integrator::HitTest;
use crate::value::ValueHandle;
use crate::*;

pub mod analytical;
pub mod camera;
pub mod registry;
pub mod render;
pub mod script;
pub mod sky;

pub use analytical::{AnalyticalDome, AnalyticalGroundPlane};
pub use camera::PinholeCamera;
pub use registry::{NodeDescriptor, NodeOptions, NodeRegistry, OptionDescriptor};
pub use render::PrincipledRender;
pub use sky::DefaultSky;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    Sky,
    Camera,
    Analytical,
    Render,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRole {
    None,
    Analytical,
    Utility,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeResult {
    Success,
    Failure,
}

/// Material of a hit: either declared in the graph script or owned by the external
/// geometry evaluator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialRef {
    Graph(usize),
    External(usize),
}

/// Per sample execution state. Never shared between samples.
#[derive(Clone, Debug)]
pub struct GraphContext {
    pub ray_origin: Vec3,
    pub ray_direction: Vec3,
    pub analytical_dist: f32,
    pub analytical_normal: Vec3,
    pub analytical_material: Option<MaterialRef>,
    pub active_material: Option<MaterialRef>,
    pub out_color: Vec4,
    pub view_size: Vec2,
    /// Sub pixel jitter in pixels.
    pub cam_offset: Vec2,
    /// Normalized image plane coordinate; (0, 0) is the upper right corner of the
    /// image and (1, 1) the lower left.
    pub uv: Vec2,
    pub rng: StdRng,
}

impl GraphContext {
    pub fn new(view_size: Vec2, seed: u64) -> Self {
        Self {
            ray_origin: Vec3::ZERO,
            ray_direction: Vec3::Z,
            analytical_dist: NO_HIT,
            analytical_normal: Vec3::ZERO,
            analytical_material: None,
            active_material: None,
            out_color: vec4(0.0, 0.0, 0.0, 1.0),
            view_size,
            cam_offset: Vec2::ZERO,
            uv: Vec2::ZERO,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Clears everything a sample writes. View size, pixel coordinate, jitter and
    /// the random stream are set up by the caller and survive.
    pub fn reset(&mut self, active_material: Option<MaterialRef>) {
        self.ray_origin = Vec3::ZERO;
        self.ray_direction = Vec3::Z;
        self.reset_analytical();
        self.active_material = active_material;
        self.out_color = vec4(0.0, 0.0, 0.0, 1.0);
    }

    pub fn reset_analytical(&mut self) {
        self.analytical_dist = NO_HIT;
        self.analytical_normal = Vec3::ZERO;
        self.analytical_material = None;
    }

    pub fn has_analytical_hit(&self) -> bool {
        self.analytical_dist < NO_HIT
    }

    /// Records an analytical intersection if it is in front of the ray and
    /// strictly nearer than the best one so far.
    pub fn offer_analytical(&mut self, t: f32, normal: Vec3, material: Option<MaterialRef>) -> bool {
        if t > 0.0 && t < self.analytical_dist {
            self.analytical_dist = t;
            self.analytical_normal = normal;
            self.analytical_material = material;
            true
        } else {
            false
        }
    }

    pub fn ray(&self) -> Ray {
        Ray::spawn(self.ray_origin, self.ray_direction)
    }

    pub fn set_ray(&mut self, ray: &Ray) {
        self.ray_origin = ray.o;
        self.ray_direction = ray.d;
    }
}

/// What a node may reach besides the context: the graph it belongs to and the
/// external hit test.
pub struct ExecEnv<'a> {
    pub scene: &'a SceneGraph,
    pub hit_test: &'a dyn HitTest,
}

/// Input to the code generation hook.
#[derive(Clone, Copy, Debug, Default)]
pub struct CodeContext {
    pub material_index: Option<usize>,
}

impl CodeContext {
    pub fn material_index(&self) -> i64 {
        self.material_index.map_or(-1, |i| i as i64)
    }
}

#[derive(Debug)]
pub enum GraphNode {
    PinholeCamera(PinholeCamera),
    GroundPlane(AnalyticalGroundPlane),
    Dome(AnalyticalDome),
    DefaultSky(DefaultSky),
    Render(PrincipledRender),
}

impl GraphNode {
    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }
    pub fn category(&self) -> NodeCategory {
        self.descriptor().category
    }
    pub fn role(&self) -> NodeRole {
        self.descriptor().role
    }
    pub fn descriptor(&self) -> &'static NodeDescriptor {
        match self {
            GraphNode::PinholeCamera(_) => &camera::PINHOLE_CAMERA,
            GraphNode::GroundPlane(_) => &analytical::GROUND_PLANE,
            GraphNode::Dome(_) => &analytical::DOME,
            GraphNode::DefaultSky(_) => &sky::DEFAULT_SKY,
            GraphNode::Render(_) => &render::PRINCIPLED_BSDF,
        }
    }

    pub fn options(&self) -> Vec<(&'static str, ValueHandle)> {
        match self {
            GraphNode::PinholeCamera(n) => n.options(),
            GraphNode::GroundPlane(n) => n.options(),
            GraphNode::Dome(n) => n.options(),
            GraphNode::DefaultSky(n) => n.options(),
            GraphNode::Render(n) => n.options(),
        }
    }

    pub fn execute(&self, ctx: &mut GraphContext, env: &ExecEnv) -> NodeResult {
        match self {
            GraphNode::PinholeCamera(n) => n.execute(ctx),
            GraphNode::GroundPlane(n) => n.execute(ctx),
            GraphNode::Dome(n) => n.execute(ctx),
            GraphNode::DefaultSky(n) => n.execute(ctx),
            GraphNode::Render(n) => n.execute(ctx, env),
        }
    }

    /// Kernel source fragments keyed by insertion slot. Pure: the same node
    /// state always produces the same map.
    pub fn generate_code(&self, code: &CodeContext) -> BTreeMap<String, String> {
        match self {
            GraphNode::PinholeCamera(n) => n.generate_code(),
            GraphNode::GroundPlane(n) => n.generate_code(code),
            GraphNode::Dome(n) => n.generate_code(code),
            GraphNode::DefaultSky(_) | GraphNode::Render(_) => BTreeMap::new(),
        }
    }
}

/// A material block of the script. Parameters are values and may be bound to
/// expressions, so they are resolved per use.
#[derive(Debug)]
pub struct GraphMaterial {
    pub name: String,
    pub options: Vec<(&'static str, ValueHandle)>,
}

impl GraphMaterial {
    pub fn resolve(&self) -> Material {
        let mut mat = Material::default();
        for (name, handle) in &self.options {
            match handle.read().try_vec3() {
                Ok(v) => {
                    mat.set(name, v);
                }
                Err(fault) => expr::report_fault(name, &fault),
            }
        }
        mat
    }
}

#[derive(Debug, Default)]
pub struct MaterialLibrary {
    materials: Vec<GraphMaterial>,
}

impl MaterialLibrary {
    pub fn add(&mut self, material: GraphMaterial) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }
    pub fn get(&self, index: usize) -> Option<&GraphMaterial> {
        self.materials.get(index)
    }
    pub fn find(&self, name: &str) -> Option<usize> {
        self.materials.iter().position(|m| m.name == name)
    }
    pub fn len(&self) -> usize {
        self.materials.len()
    }
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &GraphMaterial> {
        self.materials.iter()
    }
}

/// A compiled script: nodes in pipeline order plus the materials and variables
/// their options refer to.
#[derive(Debug)]
pub struct SceneGraph {
    pub(crate) nodes: Vec<GraphNode>,
    pub(crate) materials: MaterialLibrary,
    pub(crate) variables: VariableContainer,
    pub(crate) source: String,
}

impl SceneGraph {
    pub fn compile(source: &str) -> Result<Self, CompileError> {
        script::compile(source, registry::nodes())
    }
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }
    pub fn materials(&self) -> &MaterialLibrary {
        &self.materials
    }
    pub fn variables(&self) -> &VariableContainer {
        &self.variables
    }
    pub fn source(&self) -> &str {
        &self.source
    }
    pub fn default_material(&self) -> Option<MaterialRef> {
        if self.materials.is_empty() {
            None
        } else {
            Some(MaterialRef::Graph(0))
        }
    }
    pub fn camera(&self) -> Option<&PinholeCamera> {
        self.nodes.iter().find_map(|n| match n {
            GraphNode::PinholeCamera(c) => Some(c),
            _ => None,
        })
    }
    pub fn sky(&self) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.category() == NodeCategory::Sky)
    }
    pub fn has_render_node(&self) -> bool {
        self.nodes.iter().any(|n| n.category() == NodeCategory::Render)
    }

    pub fn resolve_material(&self, r: MaterialRef, hit_test: &dyn HitTest) -> Option<Material> {
        match r {
            MaterialRef::Graph(i) => self.materials.get(i).map(|m| m.resolve()),
            MaterialRef::External(i) => hit_test.material(i),
        }
    }

    /// Runs the analytical nodes against the context ray, in pipeline order.
    pub fn run_analytical(&self, ctx: &mut GraphContext, env: &ExecEnv) {
        for node in &self.nodes {
            if node.category() == NodeCategory::Analytical {
                node.execute(ctx, env);
            }
        }
    }

    pub fn execute_sample(&self, ctx: &mut GraphContext, hit_test: &dyn HitTest) -> NodeResult {
        self.execute_sample_with(ctx, hit_test, self.default_material())
    }

    /// One sample: reset the context, then run every node in declaration order.
    /// Sky nodes are skipped here; the render node queries them on a miss. A graph
    /// without render node falls back to running the sky when nothing was hit.
    pub fn execute_sample_with(
        &self,
        ctx: &mut GraphContext,
        hit_test: &dyn HitTest,
        active_material: Option<MaterialRef>,
    ) -> NodeResult {
        ctx.reset(active_material);
        let env = ExecEnv {
            scene: self,
            hit_test,
        };
        let mut rendered = false;
        for node in &self.nodes {
            match node.category() {
                NodeCategory::Sky => continue,
                NodeCategory::Render => rendered = true,
                _ => {}
            }
            if node.execute(ctx, &env) == NodeResult::Failure {
                log::debug!("node `{}` failed", node.name());
                return NodeResult::Failure;
            }
        }
        if !rendered && !ctx.has_analytical_hit() && hit_test.hit(&ctx.ray()).is_miss() {
            if let Some(sky) = self.sky() {
                return sky.execute(ctx, &env);
            }
        }
        NodeResult::Success
    }

    /// Code fragments of every node, concatenated per slot in pipeline order.
    pub fn generate_code(&self) -> BTreeMap<String, String> {
        let mut out: BTreeMap<String, String> = BTreeMap::new();
        for node in &self.nodes {
            let code = CodeContext {
                material_index: match node {
                    GraphNode::GroundPlane(n) => n.material_index(),
                    GraphNode::Dome(n) => n.material_index(),
                    _ => None,
                }
                .or(self.default_material().and_then(|m| match m {
                    MaterialRef::Graph(i) => Some(i),
                    MaterialRef::External(_) => None,
                })),
            };
            for (slot, fragment) in node.generate_code(&code) {
                out.entry(slot).or_default().push_str(&fragment);
            }
        }
        out
    }
}

/// Reads a vector option, reporting a runtime fault instead of failing.
pub(crate) fn read_vec3(handle: &ValueHandle, what: &str) -> Option<Vec3> {
    match handle.read().try_vec3() {
        Ok(v) => Some(v),
        Err(fault) => {
            expr::report_fault(what, &fault);
            None
        }
    }
}

pub(crate) fn read_f32(handle: &ValueHandle, what: &str) -> Option<f32> {
    match handle.read().try_f32() {
        Ok(v) => Some(v),
        Err(fault) => {
            expr::report_fault(what, &fault);
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::integrator::NoGeometry;

    #[test]
    fn offer_is_strict() {
        let mut ctx = GraphContext::new(vec2(1.0, 1.0), 0);
        assert!(ctx.offer_analytical(2.0, Vec3::Y, Some(MaterialRef::Graph(0))));
        assert!(!ctx.offer_analytical(2.0, Vec3::X, Some(MaterialRef::Graph(1))));
        assert_eq!(ctx.analytical_normal, Vec3::Y);
        assert_eq!(ctx.analytical_material, Some(MaterialRef::Graph(0)));
        assert!(!ctx.offer_analytical(-1.0, Vec3::X, None));
        assert!(!ctx.offer_analytical(3.0, Vec3::X, None));
        assert!(ctx.offer_analytical(1.0, Vec3::Z, None));
        assert_eq!(ctx.analytical_dist, 1.0);
    }

    #[test]
    fn reset_clears_sample_state() {
        let mut ctx = GraphContext::new(vec2(4.0, 2.0), 0);
        ctx.uv = vec2(0.5, 0.5);
        ctx.offer_analytical(1.0, Vec3::Y, None);
        ctx.out_color = Vec4::ONE;
        ctx.reset(Some(MaterialRef::Graph(2)));
        assert!(!ctx.has_analytical_hit());
        assert_eq!(ctx.analytical_dist, NO_HIT);
        assert_eq!(ctx.out_color, vec4(0.0, 0.0, 0.0, 1.0));
        assert_eq!(ctx.active_material, Some(MaterialRef::Graph(2)));
        assert_eq!(ctx.uv, vec2(0.5, 0.5));
        assert_eq!(ctx.view_size, vec2(4.0, 2.0));
    }

    #[test]
    fn sky_fallback_without_render_node() {
        let graph = SceneGraph::compile(
            "PinholeCamera {\n    origin: 0, 0, -5\n}\nDefaultSky {\n}\n",
        )
        .unwrap();
        let mut ctx = GraphContext::new(vec2(8.0, 8.0), 0);
        ctx.uv = vec2(0.5, 0.9);
        assert_eq!(graph.execute_sample(&mut ctx, &NoGeometry), NodeResult::Success);
        assert!(ctx.out_color.x > 0.0);
        assert_eq!(ctx.out_color.w, 1.0);
    }

    #[test]
    fn code_is_deterministic() {
        let src = "Material \"m\" {\n    albedo: 1, 0, 0\n}\nanalyticalGroundPlane {\n    height: -1\n}\n";
        let graph = SceneGraph::compile(src).unwrap();
        let a = graph.generate_code();
        let b = graph.generate_code();
        assert_eq!(a, b);
        let analytical = &a["analytical"];
        assert!(analytical.contains("-1"));
        assert!(analytical.contains("analyticalMap = float4(groundT, 0, -1, 0)"));
    }
}
