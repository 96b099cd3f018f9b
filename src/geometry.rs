use crate::*;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub o: Vec3,
    pub d: Vec3,
    pub tmin: f32,
    pub tmax: f32,
}

impl Default for Ray {
    fn default() -> Self {
        Self {
            o: Vec3::ZERO,
            d: Vec3::Z,
            tmin: 0.0,
            tmax: f32::INFINITY,
        }
    }
}

impl Ray {
    pub fn spawn(o: Vec3, d: Vec3) -> Self {
        Self {
            o,
            d,
            tmin: 0.0,
            tmax: f32::INFINITY,
        }
    }
    pub fn at(&self, t: f32) -> Vec3 {
        self.o + t * self.d
    }
    /// Continues a path from `p` along `d`, nudged off the surface with normal `n`.
    pub fn spawn_offset(p: Vec3, n: Vec3, d: Vec3) -> Self {
        let n = if d.dot(n) > 0.0 { n } else { -n };
        Self::spawn(p + n * 1e-3, d)
    }
}

/// Orthonormal shading basis with `N` as the local up (y) axis.
#[allow(non_snake_case)]
#[derive(Clone, Copy, Debug)]
pub struct Frame {
    pub N: Vec3,
    pub B: Vec3,
    pub T: Vec3,
}

impl Frame {
    pub fn from_normal(normal: Vec3) -> Self {
        let tangent = if normal.x.abs() > normal.y.abs() {
            vec3(-normal.z, 0.0, normal.x).normalize()
        } else {
            vec3(0.0, normal.z, -normal.y).normalize()
        };
        Self {
            N: normal,
            T: tangent,
            B: normal.cross(tangent).normalize(),
        }
    }
    pub fn to_local(&self, v: Vec3) -> Vec3 {
        vec3(v.dot(self.T), v.dot(self.N), v.dot(self.B))
    }
    pub fn to_world(&self, v: Vec3) -> Vec3 {
        self.T * v.x + self.N * v.y + self.B * v.z
    }
}

pub fn reflect(i: Vec3, n: Vec3) -> Vec3 {
    i - 2.0 * n.dot(i) * n
}

/// Refraction of incident direction `i` through normal `n` with relative index `eta`.
pub fn refract(i: Vec3, n: Vec3, eta: f32) -> Option<Vec3> {
    let cos_i = n.dot(i);
    let k = 1.0 - eta * eta * (1.0 - cos_i * cos_i);
    if k < 0.0 {
        None
    } else {
        Some(eta * i - (eta * cos_i + k.sqrt()) * n)
    }
}
