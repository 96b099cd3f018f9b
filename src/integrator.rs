use crate::bsdf::{DisneyBsdf, Material};
use crate::graph::{ExecEnv, GraphContext, MaterialRef, NodeResult};
use crate::*;

/// Result of an external hit test. Materials are indices into the evaluator's
/// own material table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    pub distance: f32,
    pub normal: Vec3,
    pub material: Option<usize>,
}

impl Hit {
    pub const MISS: Hit = Hit {
        distance: NO_HIT,
        normal: Vec3::ZERO,
        material: None,
    };
    pub fn is_miss(&self) -> bool {
        self.distance >= NO_HIT
    }
}

/// Geometry the graph does not own, e.g. the modeled command stack.
pub trait HitTest: Send + Sync {
    fn hit(&self, ray: &Ray) -> Hit;
    fn material(&self, id: usize) -> Option<Material>;
}

/// Empty scene.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoGeometry;

impl HitTest for NoGeometry {
    fn hit(&self, _ray: &Ray) -> Hit {
        Hit::MISS
    }
    fn material(&self, _id: usize) -> Option<Material> {
        None
    }
}

/// Closest surface seen by a path vertex, either analytical or external.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceHit {
    pub distance: f32,
    pub normal: Vec3,
    pub material: Option<MaterialRef>,
}

pub trait DirectLighting: Send + Sync {
    /// Light arriving at `hit` directly from emitters, towards `-ray.d`.
    fn sample(&self, ray: &Ray, hit: &SurfaceHit, mat: &Material) -> Vec3;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoDirectLight;

impl DirectLighting for NoDirectLight {
    fn sample(&self, _ray: &Ray, _hit: &SurfaceHit, _mat: &Material) -> Vec3 {
        Vec3::ZERO
    }
}

/// Picks the nearer of the context's analytical hit and the external one. The
/// analytical hit wins ties.
pub fn nearest_hit(ctx: &GraphContext, hit_test: &dyn HitTest, ray: &Ray) -> Option<SurfaceHit> {
    let external = hit_test.hit(ray);
    if ctx.has_analytical_hit() && ctx.analytical_dist <= external.distance {
        return Some(SurfaceHit {
            distance: ctx.analytical_dist,
            normal: ctx.analytical_normal,
            material: ctx.analytical_material,
        });
    }
    if external.is_miss() {
        return None;
    }
    Some(SurfaceHit {
        distance: external.distance,
        normal: external.normal,
        material: external.material.map(MaterialRef::External),
    })
}

/// Traces the context ray through at most `max_depth` surfaces and writes the
/// gamma corrected radiance to `ctx.out_color`.
///
/// The analytical hit already recorded in `ctx` is used for the first vertex;
/// later vertices rerun the analytical nodes of the graph for the bounced ray.
pub fn integrate(
    ctx: &mut GraphContext,
    env: &ExecEnv,
    max_depth: u32,
    light: &dyn DirectLighting,
) -> NodeResult {
    let mut ray = ctx.ray();
    let mut radiance = Vec3::ZERO;
    let mut throughput = Vec3::ONE;

    for depth in 0..max_depth.max(1) {
        ctx.set_ray(&ray);
        if depth > 0 {
            ctx.reset_analytical();
            env.scene.run_analytical(ctx, env);
        }
        let Some(hit) = nearest_hit(ctx, env.hit_test, &ray) else {
            if let Some(sky) = env.scene.sky() {
                if sky.execute(ctx, env) == NodeResult::Success {
                    radiance += ctx.out_color.xyz() * throughput;
                }
            }
            break;
        };

        let mat = hit
            .material
            .or(ctx.active_material)
            .and_then(|r| env.scene.resolve_material(r, env.hit_test))
            .unwrap_or_default();
        radiance += mat.emission * throughput;
        radiance += light.sample(&ray, &hit, &mat) * throughput;

        if depth + 1 >= max_depth {
            break;
        }
        let v = -ray.d;
        let bsdf = DisneyBsdf::new(&mat, hit.normal, v, hit.distance);
        let Some(sample) = bsdf.sample(v, &mut ctx.rng) else {
            break;
        };
        throughput *= sample.f * sample.wi.dot(bsdf.frame.N).abs() / sample.pdf;
        if !throughput.is_finite() || throughput.max_element() <= 0.0 {
            break;
        }
        ray = Ray::spawn_offset(ray.at(hit.distance), hit.normal, sample.wi);
    }

    let radiance = radiance.max(Vec3::ZERO);
    ctx.out_color = radiance.powf(1.0 / 2.2).extend(1.0);
    NodeResult::Success
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::SceneGraph;

    struct Wall {
        distance: f32,
    }

    impl HitTest for Wall {
        fn hit(&self, ray: &Ray) -> Hit {
            if ray.d.y < 0.0 {
                Hit {
                    distance: self.distance,
                    normal: Vec3::Y,
                    material: Some(0),
                }
            } else {
                Hit::MISS
            }
        }
        fn material(&self, id: usize) -> Option<Material> {
            (id == 0).then(|| Material {
                emission: vec3(0.0, 1.0, 0.0),
                ..Default::default()
            })
        }
    }

    const GLOWING_FLOOR: &str = "Material \"glow\" {\n    emission: 1, 0.5, 0\n}\nanalyticalGroundPlane {\n    height: -1\n}\nrenderPrincipledBSDF {\n}\n";

    fn shade(src: &str, hit_test: &dyn HitTest, dir: Vec3, max_depth: u32) -> Vec4 {
        let graph = SceneGraph::compile(src).unwrap();
        let mut ctx = GraphContext::new(vec2(1.0, 1.0), 7);
        ctx.reset(graph.default_material());
        ctx.set_ray(&Ray::spawn(Vec3::ZERO, dir));
        let env = ExecEnv {
            scene: &graph,
            hit_test,
        };
        graph.run_analytical(&mut ctx, &env);
        assert_eq!(
            integrate(&mut ctx, &env, max_depth, &NoDirectLight),
            NodeResult::Success
        );
        ctx.out_color
    }

    #[test]
    fn emission_is_gamma_corrected() {
        let c = shade(GLOWING_FLOOR, &NoGeometry, -Vec3::Y, 1);
        assert!((c.x - 1.0).abs() < 1e-5);
        assert!((c.y - 0.5f32.powf(1.0 / 2.2)).abs() < 1e-5);
        assert_eq!(c.z, 0.0);
        assert_eq!(c.w, 1.0);
    }

    #[test]
    fn miss_without_sky_is_black() {
        let c = shade(GLOWING_FLOOR, &NoGeometry, Vec3::Y, 1);
        assert_eq!(c, vec4(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn miss_shows_sky() {
        let src = "DefaultSky {\n}\nrenderPrincipledBSDF {\n}\n";
        let c = shade(src, &NoGeometry, Vec3::Y, 1);
        let sky = crate::graph::DefaultSky::color(
            Vec3::Y,
            vec3(0.243, 0.075, 0.512),
            Vec3::splat(0.966),
            vec3(0.852, 0.591, 0.367),
        )
        .powf(1.0 / 2.2);
        assert!((c.xyz() - sky).length() < 1e-4);
    }

    #[test]
    fn nearer_external_hit_wins() {
        let c = shade(GLOWING_FLOOR, &Wall { distance: 0.5 }, -Vec3::Y, 1);
        assert_eq!(c.x, 0.0);
        assert!((c.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn analytical_wins_ties() {
        let c = shade(GLOWING_FLOOR, &Wall { distance: 1.0 }, -Vec3::Y, 1);
        assert!((c.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn bounces_stay_finite() {
        let src = "Material \"white\" {\n    albedo: 0.9\n}\nDefaultSky {\n}\nanalyticalGroundPlane {\n    height: -1\n}\nrenderPrincipledBSDF {\n    maxDepth: 4\n}\n";
        for i in 0..16 {
            let dir = vec3(0.1 * i as f32 - 0.8, -1.0, 0.3).normalize();
            let c = shade(src, &NoGeometry, dir, 4);
            assert!(c.is_finite());
            assert!(c.min_element() >= 0.0);
        }
    }
}
