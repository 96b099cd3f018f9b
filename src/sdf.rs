//! Sphere traced hit test over the command stacks of modeled objects.

use crate::bsdf::Material;
use crate::integrator::{Hit, HitTest};
use crate::model::{Action, Command, Object, Primitive, Role};
use crate::*;

const MAX_STEPS: usize = 256;
const MAX_DIST: f32 = 100.0;
const HIT_EPS: f32 = 1e-4;
const NORMAL_EPS: f32 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    Sphere { center: Vec3, radius: f32 },
    /// `size` holds the half extents.
    Box { center: Vec3, size: Vec3 },
}

impl Shape {
    pub fn distance(&self, p: Vec3) -> f32 {
        match *self {
            Shape::Sphere { center, radius } => (p - center).length() - radius,
            Shape::Box { center, size } => {
                let q = (p - center).abs() - size;
                q.max(Vec3::ZERO).length() + q.max_element().min(0.0)
            }
        }
    }

    pub fn from_command(cmd: &Command) -> Self {
        let center = cmd.data.get_vec3("position").unwrap_or(Vec3::ZERO);
        match cmd.primitive {
            Primitive::Sphere => Shape::Sphere {
                center,
                radius: cmd
                    .data
                    .get_f32("radius")
                    .or_else(|| cmd.data.get_f32("size"))
                    .unwrap_or(0.5),
            },
            Primitive::Box => Shape::Box {
                center,
                size: cmd.data.get_vec3("size").unwrap_or(Vec3::splat(0.5)),
            },
        }
    }
}

#[derive(Clone, Debug)]
struct Element {
    shape: Shape,
    action: Action,
}

/// Union of all `Add` commands minus all `Subtract` commands, in stack order.
/// The material of a point is that of the last added shape closest to it.
#[derive(Clone, Debug, Default)]
pub struct CommandHitTest {
    elements: Vec<Element>,
    materials: Vec<Material>,
}

impl CommandHitTest {
    pub fn new(objects: &[Object]) -> Self {
        let mut hit_test = Self::default();
        for obj in objects {
            for cmd in obj.flatten_commands() {
                hit_test.push(cmd);
            }
        }
        log::debug!("command hit test with {} shapes", hit_test.elements.len());
        hit_test
    }

    fn push(&mut self, cmd: &Command) {
        if cmd.role != Role::Geometry || cmd.action == Action::None {
            return;
        }
        self.elements.push(Element {
            shape: Shape::from_command(cmd),
            action: cmd.action,
        });
        self.materials.push(cmd.material);
        for sub in &cmd.sub_commands {
            self.push(sub);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Signed distance to the combined surface and the index of the shape that
    /// owns it.
    pub fn map(&self, p: Vec3) -> (f32, Option<usize>) {
        let mut d = NO_HIT;
        let mut id = None;
        for (i, e) in self.elements.iter().enumerate() {
            let s = e.shape.distance(p);
            match e.action {
                Action::Add => {
                    if s < d {
                        d = s;
                        id = Some(i);
                    }
                }
                Action::Subtract => d = d.max(-s),
                Action::None => {}
            }
        }
        (d, id)
    }

    pub fn normal(&self, p: Vec3) -> Vec3 {
        let dx = Vec3::X * NORMAL_EPS;
        let dy = Vec3::Y * NORMAL_EPS;
        let dz = Vec3::Z * NORMAL_EPS;
        let n = vec3(
            self.map(p + dx).0 - self.map(p - dx).0,
            self.map(p + dy).0 - self.map(p - dy).0,
            self.map(p + dz).0 - self.map(p - dz).0,
        );
        n.normalize_or_zero()
    }
}

impl HitTest for CommandHitTest {
    fn hit(&self, ray: &Ray) -> Hit {
        if self.elements.is_empty() {
            return Hit::MISS;
        }
        let mut t = ray.tmin;
        let t_max = ray.tmax.min(MAX_DIST);
        for _ in 0..MAX_STEPS {
            if t > t_max {
                break;
            }
            let p = ray.at(t);
            let (d, id) = self.map(p);
            if d.abs() < HIT_EPS * t.max(1.0) {
                return Hit {
                    distance: t,
                    normal: self.normal(p),
                    material: id,
                };
            }
            t += d.abs();
        }
        Hit::MISS
    }

    fn material(&self, id: usize) -> Option<Material> {
        self.materials.get(id).copied()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::CommandData;

    fn sphere(center: Vec3, radius: f32, action: Action) -> Command {
        Command::new(
            "Sphere",
            Role::Geometry,
            action,
            Primitive::Sphere,
            CommandData::new(vec![
                CommandData::float3("position", center),
                CommandData::float1("radius", radius),
            ]),
        )
    }

    #[test]
    fn distances() {
        let s = Shape::Sphere {
            center: Vec3::ZERO,
            radius: 1.0,
        };
        assert!((s.distance(vec3(3.0, 0.0, 0.0)) - 2.0).abs() < 1e-6);
        assert!((s.distance(Vec3::ZERO) + 1.0).abs() < 1e-6);
        let b = Shape::Box {
            center: Vec3::ZERO,
            size: Vec3::ONE,
        };
        assert!((b.distance(vec3(2.0, 0.0, 0.0)) - 1.0).abs() < 1e-6);
        assert!((b.distance(vec3(2.0, 2.0, 1.0)) - 2f32.sqrt()).abs() < 1e-5);
        assert!((b.distance(Vec3::ZERO) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn hits_sphere() {
        let mut obj = Object::new("ball");
        obj.commands = vec![sphere(vec3(0.0, 0.0, 5.0), 1.0, Action::Add)];
        let ht = CommandHitTest::new(&[obj]);
        let hit = ht.hit(&Ray::spawn(Vec3::ZERO, Vec3::Z));
        assert!(!hit.is_miss());
        assert!((hit.distance - 4.0).abs() < 1e-3);
        assert!((hit.normal - -Vec3::Z).length() < 1e-2);
        assert_eq!(hit.material, Some(0));
        assert!(ht.material(0).is_some());
        assert!(ht.hit(&Ray::spawn(Vec3::ZERO, -Vec3::Z)).is_miss());
    }

    #[test]
    fn subtraction_carves() {
        let mut obj = Object::new("ball");
        obj.commands = vec![
            sphere(vec3(0.0, 0.0, 5.0), 1.0, Action::Add),
            sphere(vec3(0.0, 0.0, 4.0), 0.5, Action::Subtract),
        ];
        let ht = CommandHitTest::new(&[obj]);
        let hit = ht.hit(&Ray::spawn(Vec3::ZERO, Vec3::Z));
        assert!((hit.distance - 4.5).abs() < 1e-3);
    }

    #[test]
    fn base_box_and_empty() {
        let ht = CommandHitTest::new(&[Object::new("box")]);
        let hit = ht.hit(&Ray::spawn(vec3(0.0, 5.0, 0.0), -Vec3::Y));
        // top face of the base box sits at -0.4
        assert!((hit.distance - 5.4).abs() < 1e-3);
        assert!((hit.normal - Vec3::Y).length() < 1e-2);
        assert!(CommandHitTest::default().hit(&Ray::spawn(Vec3::ZERO, Vec3::X)).is_miss());
    }
}
