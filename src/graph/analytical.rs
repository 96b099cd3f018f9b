use std::collections::BTreeMap;

use super::*;

pub static GROUND_PLANE: NodeDescriptor = NodeDescriptor {
    name: "analyticalGroundPlane",
    category: NodeCategory::Analytical,
    role: NodeRole::Analytical,
    help: "Creates a ground plane.",
    options: &[OptionDescriptor {
        name: "height",
        ty: ValueType::Float1,
        default: "0",
        help: "Height of the plane along the y axis.",
    }],
    build: |opts| {
        Ok(GraphNode::GroundPlane(AnalyticalGroundPlane {
            height: opts.handle("height")?,
            material: opts.material(),
        }))
    },
};

pub static DOME: NodeDescriptor = NodeDescriptor {
    name: "analyticalDome",
    category: NodeCategory::Analytical,
    role: NodeRole::Analytical,
    help: "Creates a dome of a given radius, closed by the ground plane.",
    options: &[
        OptionDescriptor {
            name: "position",
            ty: ValueType::Float3,
            default: "0, 0, 0",
            help: "Center of the dome.",
        },
        OptionDescriptor {
            name: "radius",
            ty: ValueType::Float1,
            default: "20",
            help: "Radius of the dome.",
        },
    ],
    build: |opts| {
        Ok(GraphNode::Dome(AnalyticalDome {
            position: opts.handle("position")?,
            radius: opts.handle("radius")?,
            material: opts.material(),
        }))
    },
};

fn graph_index(material: Option<MaterialRef>) -> Option<usize> {
    match material {
        Some(MaterialRef::Graph(i)) => Some(i),
        _ => None,
    }
}

#[derive(Debug)]
pub struct AnalyticalGroundPlane {
    pub height: ValueHandle,
    pub material: Option<MaterialRef>,
}

impl AnalyticalGroundPlane {
    pub fn options(&self) -> Vec<(&'static str, ValueHandle)> {
        vec![("height", self.height.clone())]
    }

    pub fn material_index(&self) -> Option<usize> {
        graph_index(self.material)
    }

    /// Distance along the ray to the plane `y = height`; not finite when the ray
    /// runs parallel to it.
    pub fn intersect(height: f32, o: Vec3, d: Vec3) -> f32 {
        (height - o.y) / d.y
    }

    pub fn execute(&self, ctx: &mut GraphContext) -> NodeResult {
        let Some(height) = read_f32(&self.height, "ground height") else {
            return NodeResult::Success;
        };
        let t = Self::intersect(height, ctx.ray_origin, ctx.ray_direction);
        if t.is_finite() {
            let material = self.material.or(ctx.active_material);
            ctx.offer_analytical(t, Vec3::Y, material);
        }
        NodeResult::Success
    }

    pub fn generate_code(&self, code: &CodeContext) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(
            "analytical".to_string(),
            format!(
                "\nfloat groundT = ({} - rayOrigin.y) / rayDir.y;\nif (groundT > 0.0) {{\n    analyticalMap = float4(groundT, 0, -1, {});\n    analyticalNormal = float3(0,1,0);\n}}\n",
                self.height.read().format_parameters(),
                code.material_index(),
            ),
        );
        map
    }
}

#[derive(Debug)]
pub struct AnalyticalDome {
    pub position: ValueHandle,
    pub radius: ValueHandle,
    pub material: Option<MaterialRef>,
}

impl AnalyticalDome {
    pub fn options(&self) -> Vec<(&'static str, ValueHandle)> {
        vec![
            ("position", self.position.clone()),
            ("radius", self.radius.clone()),
        ]
    }

    pub fn material_index(&self) -> Option<usize> {
        graph_index(self.material)
    }

    /// Far intersection of the ray with the sphere, seen from inside. `None` when
    /// the ray misses the sphere entirely.
    pub fn intersect(center: Vec3, radius: f32, o: Vec3, d: Vec3) -> Option<f32> {
        let l = o - center;
        let b = d.dot(l);
        let c = l.dot(l) - radius * radius;
        let det = b * b - c;
        if det < 0.0 {
            return None;
        }
        Some(det.sqrt() - b)
    }

    pub fn execute(&self, ctx: &mut GraphContext) -> NodeResult {
        let (Some(center), Some(radius)) = (
            read_vec3(&self.position, "dome position"),
            read_f32(&self.radius, "dome radius"),
        ) else {
            return NodeResult::Success;
        };
        let (o, d) = (ctx.ray_origin, ctx.ray_direction);
        let Some(t) = Self::intersect(center, radius, o, d) else {
            return NodeResult::Success;
        };
        let material = self.material.or(ctx.active_material);
        let p = o + d * t;
        ctx.offer_analytical(t, -(p - center).normalize_or_zero(), material);

        // floor of the dome
        let ground = AnalyticalGroundPlane::intersect(0.0, o, d);
        if ground.is_finite() && ground < t {
            ctx.offer_analytical(ground, Vec3::Y, material);
        }
        NodeResult::Success
    }

    pub fn generate_code(&self, code: &CodeContext) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(
            "analytical".to_string(),
            format!(
                "\nfloat3 domeL = rayOrigin - float3({});\nfloat domeB = dot(rayDir, domeL);\nfloat domeC = dot(domeL, domeL) - {r} * {r};\nfloat domeT = sqrt(domeB * domeB - domeC) - domeB;\nif (domeT > 0.0 && domeT < analyticalMap.x) {{\n    analyticalMap = float4(domeT, 0, -1, {idx});\n    analyticalNormal = -normalize(rayOrigin + rayDir * domeT - float3({}));\n}}\n",
                self.position.read().format_parameters(),
                self.position.read().format_parameters(),
                r = self.radius.read().format_parameters(),
                idx = code.material_index(),
            ),
        );
        map
    }
}
