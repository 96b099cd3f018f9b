use std::collections::BTreeMap;

use super::*;

pub static PINHOLE_CAMERA: NodeDescriptor = NodeDescriptor {
    name: "PinholeCamera",
    category: NodeCategory::Camera,
    role: NodeRole::None,
    help: "A standard pinhole camera.",
    options: &[
        OptionDescriptor {
            name: "origin",
            ty: ValueType::Float3,
            default: "0, 0, -5",
            help: "The camera origin (viewer position).",
        },
        OptionDescriptor {
            name: "lookat",
            ty: ValueType::Float3,
            default: "0, 0, 0",
            help: "The position the camera is looking at.",
        },
        OptionDescriptor {
            name: "fov",
            ty: ValueType::Float1,
            default: "80",
            help: "The horizontal field of view in degrees.",
        },
    ],
    build: |opts| {
        Ok(GraphNode::PinholeCamera(PinholeCamera {
            origin: opts.handle("origin")?,
            lookat: opts.handle("lookat")?,
            fov: opts.handle("fov")?,
        }))
    },
};

const UP: Vec3 = Vec3::Y;

#[derive(Debug)]
pub struct PinholeCamera {
    pub origin: ValueHandle,
    pub lookat: ValueHandle,
    pub fov: ValueHandle,
}

impl PinholeCamera {
    pub fn options(&self) -> Vec<(&'static str, ValueHandle)> {
        vec![
            ("origin", self.origin.clone()),
            ("lookat", self.lookat.clone()),
            ("fov", self.fov.clone()),
        ]
    }

    /// Direction through the image plane for a normalized pixel coordinate `uv`
    /// and a jitter `offset` given in pixels.
    pub fn generate_ray(
        origin: Vec3,
        lookat: Vec3,
        fov: f32,
        view_size: Vec2,
        offset: Vec2,
        uv: Vec2,
    ) -> Ray {
        let ratio = view_size.x / view_size.y;
        let pixel_size = Vec2::ONE / view_size;

        let half_width = (fov.to_radians() * 0.5).tan();
        let half_height = half_width / ratio;

        let w = (origin - lookat).normalize();
        let u = UP.cross(w);
        let v = w.cross(u);

        let lower_left = origin - half_width * u - (half_height * v - w);
        let horizontal = u * half_width * 2.0;
        let vertical = v * half_height * 2.0;

        let mut dir = lower_left - origin;
        dir += horizontal * (pixel_size.x * offset.x + uv.x);
        dir += vertical * (pixel_size.y * offset.y + uv.y);
        Ray::spawn(origin, (-dir).normalize())
    }

    pub fn execute(&self, ctx: &mut GraphContext) -> NodeResult {
        let (Some(origin), Some(lookat), Some(fov)) = (
            read_vec3(&self.origin, "camera origin"),
            read_vec3(&self.lookat, "camera lookat"),
            read_f32(&self.fov, "camera fov"),
        ) else {
            return NodeResult::Success;
        };
        let ray = Self::generate_ray(origin, lookat, fov, ctx.view_size, ctx.cam_offset, ctx.uv);
        ctx.set_ray(&ray);
        NodeResult::Success
    }

    /// Rotates the origin around the look-at point. `dx` turns the azimuth
    /// (scaled by the viewport aspect), `dy` the elevation, both in units of pi.
    /// The new origin is written back as a literal and returned.
    pub fn orbit(&self, dx: f32, dy: f32, aspect: f32) -> Option<Vec3> {
        let origin = read_vec3(&self.origin, "camera origin")?;
        let lookat = read_vec3(&self.lookat, "camera lookat")?;
        let new_origin = orbit_origin(origin, lookat, dx, dy, aspect);
        *self.origin.write() = Value::from_vec3(new_origin);
        Some(new_origin)
    }

    pub fn generate_code(&self) -> BTreeMap<String, String> {
        let mut code = BTreeMap::new();
        code.insert(
            "camera".to_string(),
            format!(
                "\nfloat3 camOrigin = float3({});\nfloat3 camLookAt = float3({});\nfloat camFov = {};\n",
                self.origin.read().format_parameters(),
                self.lookat.read().format_parameters(),
                self.fov.read().format_parameters(),
            ),
        );
        code
    }
}

pub fn orbit_origin(origin: Vec3, lookat: Vec3, dx: f32, dy: f32, aspect: f32) -> Vec3 {
    let offset = origin - lookat;
    let radius = offset.length();
    if radius == 0.0 {
        return origin;
    }
    const LIMIT: f32 = FRAC_PI_2 - 0.01;
    let azimuth = offset.x.atan2(offset.z) + dx * aspect * PI;
    let elevation = ((offset.y / radius).clamp(-1.0, 1.0).asin() + dy * PI).clamp(-LIMIT, LIMIT);
    lookat
        + radius
            * vec3(
                elevation.cos() * azimuth.sin(),
                elevation.sin(),
                elevation.cos() * azimuth.cos(),
            )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn center_ray_points_at_lookat() {
        let ray = PinholeCamera::generate_ray(
            vec3(0.0, 0.0, -1.0),
            Vec3::ZERO,
            90.0,
            vec2(640.0, 480.0),
            Vec2::ZERO,
            vec2(0.5, 0.5),
        );
        assert!(ray.d.cross(Vec3::Z).length() < 1e-4);
        assert!(ray.d.dot(Vec3::Z) > 0.0);
        assert_eq!(ray.o, vec3(0.0, 0.0, -1.0));
    }

    #[test]
    fn corners_spread_with_fov() {
        let narrow = PinholeCamera::generate_ray(
            vec3(0.0, 0.0, -5.0),
            Vec3::ZERO,
            30.0,
            vec2(100.0, 100.0),
            Vec2::ZERO,
            Vec2::ZERO,
        );
        let wide = PinholeCamera::generate_ray(
            vec3(0.0, 0.0, -5.0),
            Vec3::ZERO,
            90.0,
            vec2(100.0, 100.0),
            Vec2::ZERO,
            Vec2::ZERO,
        );
        assert!(wide.d.z < narrow.d.z);
        // uv (0, 0) is the upper right corner of the image
        assert!(wide.d.y > 0.0);
        assert!(wide.d.x < 0.0);
    }

    #[test]
    fn fov_spans_the_width() {
        let gen = |uv| {
            PinholeCamera::generate_ray(
                vec3(0.0, 0.0, -1.0),
                Vec3::ZERO,
                90.0,
                vec2(200.0, 100.0),
                Vec2::ZERO,
                uv,
            )
            .d
        };
        let side = gen(vec2(0.0, 0.5));
        assert!(side.y.abs() < 1e-5);
        assert!((side.x.abs() - side.z).abs() < 1e-5);
        let top = gen(vec2(0.5, 0.0));
        assert!(top.x.abs() < 1e-5);
        assert!((top.y.abs() / top.z - 0.5).abs() < 1e-5);
    }

    #[test]
    fn execute_writes_ray() {
        let graph = SceneGraph::compile(
            "PinholeCamera {\n    origin: 0, 0, -1\n    fov: 90\n}\n",
        )
        .unwrap();
        let mut ctx = GraphContext::new(vec2(9.0, 9.0), 0);
        ctx.uv = vec2(0.5, 0.5);
        let cam = graph.camera().unwrap();
        assert_eq!(cam.execute(&mut ctx), NodeResult::Success);
        assert!((ctx.ray_direction - Vec3::Z).length() < 1e-4);
    }

    #[test]
    fn orbit_keeps_distance() {
        let origin = vec3(0.0, 0.0, -5.0);
        let moved = orbit_origin(origin, Vec3::ZERO, 0.1, 0.05, 1.5);
        assert!((moved.length() - 5.0).abs() < 1e-4);
        assert!(moved != origin);
        // elevation is clamped below the pole
        let top = orbit_origin(origin, Vec3::ZERO, 0.0, 10.0, 1.0);
        assert!(top.y < 5.0);
        assert!(top.y > 4.9);
        assert!(orbit_origin(origin, Vec3::ZERO, 0.0, 0.0, 1.0).distance(origin) < 1e-4);
    }

    #[test]
    fn orbit_writes_literal_origin() {
        let graph = SceneGraph::compile("Float3 o = 0, 0, -5\nPinholeCamera {\n    origin: o\n}\n").unwrap();
        let cam = graph.camera().unwrap();
        let moved = cam.orbit(0.25, 0.0, 1.0).unwrap();
        assert!(cam.origin.read().is_literal());
        assert_eq!(cam.origin.read().try_vec3().unwrap(), moved);
    }
}
