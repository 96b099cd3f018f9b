use super::*;

pub static DEFAULT_SKY: NodeDescriptor = NodeDescriptor {
    name: "DefaultSky",
    category: NodeCategory::Sky,
    role: NodeRole::None,
    help: "A sky gradient with a sun disc.",
    options: &[
        OptionDescriptor {
            name: "sunDirection",
            ty: ValueType::Float3,
            default: "0.243, 0.075, 0.512",
            help: "Direction towards the sun.",
        },
        OptionDescriptor {
            name: "sunColor",
            ty: ValueType::Float3,
            default: "0.966, 0.966, 0.966",
            help: "Color of the sun.",
        },
        OptionDescriptor {
            name: "horizonColor",
            ty: ValueType::Float3,
            default: "0.852, 0.591, 0.367",
            help: "Color of the sky near the horizon.",
        },
        OptionDescriptor {
            name: "sunStrength",
            ty: ValueType::Float1,
            default: "5",
            help: "Strength of the sun.",
        },
    ],
    build: |opts| {
        Ok(GraphNode::DefaultSky(DefaultSky {
            sun_direction: opts.handle("sunDirection")?,
            sun_color: opts.handle("sunColor")?,
            horizon_color: opts.handle("horizonColor")?,
            sun_strength: opts.handle("sunStrength")?,
        }))
    },
};

const SKY_COLOR: Vec3 = Vec3::new(0.38, 0.6, 1.0);

#[derive(Debug)]
pub struct DefaultSky {
    pub sun_direction: ValueHandle,
    pub sun_color: ValueHandle,
    pub horizon_color: ValueHandle,
    /// Exposed for the kernel; the CPU gradient does not scale by it.
    pub sun_strength: ValueHandle,
}

impl DefaultSky {
    pub fn options(&self) -> Vec<(&'static str, ValueHandle)> {
        vec![
            ("sunDirection", self.sun_direction.clone()),
            ("sunColor", self.sun_color.clone()),
            ("horizonColor", self.horizon_color.clone()),
            ("sunStrength", self.sun_strength.clone()),
        ]
    }

    pub fn color(dir: Vec3, sun_dir: Vec3, sun_color: Vec3, horizon_color: Vec3) -> Vec3 {
        let sun = dir.dot(sun_dir.normalize_or_zero()).max(0.0);
        let hor = (1.0 - dir.y.max(0.0)).powi(3);
        let mut col = mix(SKY_COLOR, sun_color, Vec3::splat(sun * 0.5));
        col = mix(col, horizon_color, Vec3::splat(hor));
        col += 0.25 * vec3(1.0, 0.7, 0.4) * sun.powf(5.0);
        col += 0.25 * vec3(1.0, 0.8, 0.6) * sun.powf(5.0);
        col += 0.15 * vec3(1.0, 0.9, 0.7) * sun.powf(512.0).max(0.25);
        col
    }

    /// Sky radiance seen along `dir`.
    pub fn radiance(&self, dir: Vec3) -> Option<Vec3> {
        Some(Self::color(
            dir,
            read_vec3(&self.sun_direction, "sun direction")?,
            read_vec3(&self.sun_color, "sun color")?,
            read_vec3(&self.horizon_color, "horizon color")?,
        ))
    }

    pub fn execute(&self, ctx: &mut GraphContext) -> NodeResult {
        if let Some(col) = self.radiance(ctx.ray_direction) {
            ctx.out_color = col.extend(1.0);
        }
        NodeResult::Success
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zenith_and_horizon() {
        let sun = vec3(0.243, 0.075, 0.512);
        let white = Vec3::splat(0.966);
        let horizon = vec3(0.852, 0.591, 0.367);
        // straight up, away from the sun: pure sky color plus the sun floor term
        let up = DefaultSky::color(Vec3::Y, sun, white, horizon);
        let sun_dot = Vec3::Y.dot(sun.normalize());
        assert!(sun_dot > 0.0);
        assert!(up.z > up.x);
        // looking down the horizon term dominates
        let down = DefaultSky::color(-Vec3::Y, vec3(0.0, 1.0, 0.0), white, horizon);
        let expected = horizon + 0.15 * vec3(1.0, 0.9, 0.7) * 0.25;
        assert!((down - expected).length() < 1e-5);
    }

    #[test]
    fn execute_writes_opaque_color() {
        let graph = SceneGraph::compile("DefaultSky {\n}\n").unwrap();
        let mut ctx = GraphContext::new(vec2(1.0, 1.0), 0);
        ctx.ray_direction = Vec3::Y;
        let sky = graph.sky().unwrap();
        let env = ExecEnv {
            scene: &graph,
            hit_test: &crate::integrator::NoGeometry,
        };
        assert_eq!(sky.execute(&mut ctx, &env), NodeResult::Success);
        assert_eq!(ctx.out_color.w, 1.0);
        assert!(ctx.out_color.z > 0.5);
    }
}
