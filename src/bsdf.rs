use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::microfacet::*;
use crate::sampling::{CosineHemisphere, Warp};
use crate::*;

/// Principled BSDF parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub albedo: Vec3,
    pub specular: f32,
    pub emission: Vec3,
    pub anisotropic: f32,
    pub metallic: f32,
    pub roughness: f32,
    pub subsurface: f32,
    pub specular_tint: f32,
    pub sheen: f32,
    pub sheen_tint: f32,
    pub clearcoat: f32,
    pub clearcoat_gloss: f32,
    pub transmission: f32,
    pub ior: f32,
    pub extinction: Vec3,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            albedo: Vec3::splat(0.5),
            specular: 0.5,
            emission: Vec3::ZERO,
            anisotropic: 0.0,
            metallic: 0.0,
            roughness: 0.5,
            subsurface: 0.0,
            specular_tint: 0.0,
            sheen: 0.0,
            sheen_tint: 0.0,
            clearcoat: 0.0,
            clearcoat_gloss: 0.0,
            transmission: 0.0,
            ior: 1.5,
            extinction: Vec3::ONE,
        }
    }
}

impl Material {
    /// Option names accepted by material blocks in scripts, in declaration order.
    pub const OPTIONS: [(&'static str, ValueType); 15] = [
        ("albedo", ValueType::Float3),
        ("specular", ValueType::Float1),
        ("emission", ValueType::Float3),
        ("anisotropic", ValueType::Float1),
        ("metallic", ValueType::Float1),
        ("roughness", ValueType::Float1),
        ("subsurface", ValueType::Float1),
        ("specularTint", ValueType::Float1),
        ("sheen", ValueType::Float1),
        ("sheenTint", ValueType::Float1),
        ("clearcoat", ValueType::Float1),
        ("clearcoatGloss", ValueType::Float1),
        ("transmission", ValueType::Float1),
        ("ior", ValueType::Float1),
        ("extinction", ValueType::Float3),
    ];

    /// Writes one named parameter. Returns false for unknown names.
    pub fn set(&mut self, name: &str, v: Vec3) -> bool {
        match name {
            "albedo" => self.albedo = v,
            "specular" => self.specular = v.x,
            "emission" => self.emission = v,
            "anisotropic" => self.anisotropic = v.x,
            "metallic" => self.metallic = v.x,
            "roughness" => self.roughness = v.x,
            "subsurface" => self.subsurface = v.x,
            "specularTint" => self.specular_tint = v.x,
            "sheen" => self.sheen = v.x,
            "sheenTint" => self.sheen_tint = v.x,
            "clearcoat" => self.clearcoat = v.x,
            "clearcoatGloss" => self.clearcoat_gloss = v.x,
            "transmission" => self.transmission = v.x,
            "ior" => self.ior = v.x,
            "extinction" => self.extinction = v,
            _ => return false,
        }
        true
    }
}

pub fn schlick_fresnel(u: f32) -> f32 {
    let m = (1.0 - u).clamp(0.0, 1.0);
    let m2 = m * m;
    m2 * m2 * m
}

pub fn dielectric_fresnel(cos_theta: f32, eta: f32) -> f32 {
    let r0 = (eta - 1.0) / (eta + 1.0);
    let r0 = r0 * r0;
    r0 + (1.0 - r0) * schlick_fresnel(cos_theta)
}

pub struct BsdfSample {
    pub wi: Vec3,
    pub f: Vec3,
    pub pdf: f32,
}

/// Disney principled BSDF at a shading point. All directions are in world space;
/// `v` points back towards the viewer.
pub struct DisneyBsdf<'a> {
    pub mat: &'a Material,
    /// Shading frame around the face forward normal.
    pub frame: Frame,
    /// Geometric normal as reported by the hit.
    pub normal: Vec3,
    pub eta: f32,
    pub hit_dist: f32,
}

impl<'a> DisneyBsdf<'a> {
    pub fn new(mat: &'a Material, normal: Vec3, v: Vec3, hit_dist: f32) -> Self {
        let front = normal.dot(v) >= 0.0;
        let ffnormal = if front { normal } else { -normal };
        let eta = if front { 1.0 / mat.ior } else { mat.ior };
        Self {
            mat,
            frame: Frame::from_normal(ffnormal),
            normal,
            eta,
            hit_dist,
        }
    }

    fn anisotropic_alpha(&self) -> (f32, f32) {
        let aspect = (1.0 - self.mat.anisotropic * 0.9).sqrt();
        (
            (self.mat.roughness / aspect).max(0.001),
            (self.mat.roughness * aspect).max(0.001),
        )
    }

    pub fn evaluate(&self, v: Vec3, l: Vec3) -> Vec3 {
        let mat = self.mat;
        let n = self.frame.N;
        let (t, b) = (self.frame.T, self.frame.B);
        let h = (l + v).normalize();
        let n_dot_l = n.dot(l);
        let n_dot_v = n.dot(v);
        let n_dot_h = n.dot(h);
        let l_dot_h = l.dot(h);

        let mut brdf = Vec3::ZERO;
        let mut bsdf = Vec3::ZERO;

        if mat.transmission > 0.0 {
            let mut transmittance = Vec3::ONE;
            if self.normal.dot(n) < 0.0 {
                let e = mat.extinction;
                transmittance = vec3(
                    (e.x.ln() * self.hit_dist).exp(),
                    (e.y.ln() * self.hit_dist).exp(),
                    (e.z.ln() * self.hit_dist).exp(),
                );
            }
            let a = mat.roughness.max(0.001);
            if n_dot_l <= 0.0 {
                bsdf = mat.albedo / n.dot(-l);
            } else {
                let f = dielectric_fresnel(l_dot_h.abs(), self.eta);
                let d = gtr2(n_dot_h, a);
                let g = smith_g_ggx(n_dot_l, a) * smith_g_ggx(n_dot_v, a);
                bsdf = mat.albedo * transmittance * f * g * d;
            }
        }

        if mat.transmission < 1.0 && n_dot_l > 0.0 && n_dot_v > 0.0 {
            let cdlin = mat.albedo;
            let cdlum = 0.3 * cdlin.x + 0.6 * cdlin.y + 0.1 * cdlin.z;
            let ctint = if cdlum > 0.0 { cdlin / cdlum } else { Vec3::ONE };
            let cspec0 = mix(
                mat.specular * 0.08 * mix(Vec3::ONE, ctint, mat.specular_tint),
                cdlin,
                mat.metallic,
            );
            let csheen = mix(Vec3::ONE, ctint, mat.sheen_tint);

            let fl = schlick_fresnel(n_dot_l);
            let fv = schlick_fresnel(n_dot_v);
            let fd90 = 0.5 + 2.0 * l_dot_h * l_dot_h * mat.roughness;
            let fd = mix(1.0f32, fd90, fl) * mix(1.0f32, fd90, fv);

            let fss90 = l_dot_h * l_dot_h * mat.roughness;
            let fss = mix(1.0f32, fss90, fl) * mix(1.0f32, fss90, fv);
            let ss = 1.25 * (fss * (1.0 / (n_dot_l + n_dot_v) - 0.5) + 0.5);

            let (ax, ay) = self.anisotropic_alpha();
            let ds = gtr2_aniso(n_dot_h, h.dot(t), h.dot(b), ax, ay);
            let fh = schlick_fresnel(l_dot_h);
            let fs = mix(cspec0, Vec3::ONE, fh);
            let gs = smith_g_ggx_aniso(n_dot_l, l.dot(t), l.dot(b), ax, ay)
                * smith_g_ggx_aniso(n_dot_v, v.dot(t), v.dot(b), ax, ay);

            let fsheen = fh * mat.sheen * csheen;

            let dr = gtr1(n_dot_h, mix(0.1f32, 0.001, mat.clearcoat_gloss));
            let fr = mix(0.04f32, 1.0, fh);
            let gr = smith_g_ggx(n_dot_l, 0.25) * smith_g_ggx(n_dot_v, 0.25);

            brdf = (FRAC_1_PI * mix(fd, ss, mat.subsurface) * cdlin + fsheen) * (1.0 - mat.metallic);
            brdf += gs * fs * ds + Vec3::splat(0.25 * mat.clearcoat * gr * fr * dr);
        }

        mix(brdf, bsdf, mat.transmission)
    }

    pub fn pdf(&self, v: Vec3, l: Vec3) -> f32 {
        let mat = self.mat;
        let n = self.frame.N;
        if n.dot(l) <= 0.0 {
            return 1.0;
        }
        let h = (l + v).normalize();
        let n_dot_h = n.dot(h).abs();
        let specular_alpha = mat.roughness.max(0.001);
        let clearcoat_alpha = mix(0.1f32, 0.001, mat.clearcoat_gloss);

        let diffuse_ratio = 0.5 * (1.0 - mat.metallic);
        let specular_ratio = 1.0 - diffuse_ratio;

        let (ax, ay) = self.anisotropic_alpha();
        let pdf_gtr2_aniso = gtr2_aniso(n_dot_h, h.dot(self.frame.T), h.dot(self.frame.B), ax, ay) * n_dot_h;
        let pdf_gtr1 = gtr1(n_dot_h, clearcoat_alpha) * n_dot_h;
        let ratio = 1.0 / (1.0 + mat.clearcoat);
        let pdf_spec = mix(pdf_gtr1, pdf_gtr2_aniso, ratio) / (4.0 * v.dot(h).abs());
        let pdf_diff = l.dot(n).abs() * FRAC_1_PI;
        let brdf_pdf = diffuse_ratio * pdf_diff + specular_ratio * pdf_spec;

        let pdf_gtr2 = gtr2(n_dot_h, specular_alpha) * n_dot_h;
        let f = dielectric_fresnel(l.dot(h).abs(), self.eta);
        let bsdf_pdf = pdf_gtr2 * f / (4.0 * v.dot(h).abs());

        mix(brdf_pdf, bsdf_pdf, mat.transmission)
    }

    /// Picks a continuation direction: GGX reflection or refraction with
    /// probability `transmission`, otherwise cosine or GGX reflection split by
    /// `0.5 * (1 - metallic)`.
    pub fn sample<R: Rng>(&self, v: Vec3, rng: &mut R) -> Option<BsdfSample> {
        let mat = self.mat;
        let n = self.frame.N;
        let r1: f32 = rng.gen();
        let r2: f32 = rng.gen();

        let wi = if rng.gen::<f32>() < mat.transmission {
            let h = self.frame.to_world(importance_sample_ggx(mat.roughness, r1, r2));
            let theta = n.dot(v).abs();
            let cos2t = 1.0 - self.eta * self.eta * (1.0 - theta * theta);
            let f = dielectric_fresnel(theta, self.eta);
            if cos2t < 0.0 || rng.gen::<f32>() < f {
                reflect(-v, h).normalize()
            } else {
                match refract(-v, h, self.eta) {
                    Some(t) => t.normalize(),
                    None => reflect(-v, h).normalize(),
                }
            }
        } else {
            let diffuse_ratio = 0.5 * (1.0 - mat.metallic);
            if rng.gen::<f32>() < diffuse_ratio {
                self.frame.to_world(CosineHemisphere {}.warp(vec2(r1, r2)))
            } else {
                let h = self.frame.to_world(importance_sample_ggx(mat.roughness, r1, r2));
                reflect(-v, h)
            }
        };
        let pdf = self.pdf(v, wi);
        if pdf.is_nan() || pdf <= 0.0 || !wi.is_finite() {
            return None;
        }
        Some(BsdfSample {
            wi,
            f: self.evaluate(v, wi),
            pdf,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn fresnel() {
        assert_eq!(schlick_fresnel(1.0), 0.0);
        assert_eq!(schlick_fresnel(0.0), 1.0);
        assert!((schlick_fresnel(0.5) - 0.03125).abs() < 1e-7);
        // R0 for eta 1.5
        assert!((dielectric_fresnel(1.0, 1.5) - 0.04).abs() < 1e-6);
    }

    #[test]
    fn lambert_limit() {
        // rough, non specular, non metallic material is close to albedo / pi at normal incidence
        let mat = Material {
            albedo: Vec3::ONE,
            specular: 0.0,
            roughness: 0.0,
            ..Default::default()
        };
        let bsdf = DisneyBsdf::new(&mat, Vec3::Y, Vec3::Y, 1.0);
        let f = bsdf.evaluate(Vec3::Y, Vec3::Y);
        // Fd at normal incidence with zero roughness is 1
        assert!((f.x - FRAC_1_PI).abs() < 1e-3, "{}", f);
    }

    #[test]
    fn below_horizon_is_black_without_transmission() {
        let mat = Material::default();
        let bsdf = DisneyBsdf::new(&mat, Vec3::Y, Vec3::Y, 1.0);
        assert_eq!(bsdf.evaluate(Vec3::Y, -Vec3::Y), Vec3::ZERO);
    }

    #[test]
    fn samples_are_consistent() {
        let mat = Material {
            metallic: 0.3,
            roughness: 0.4,
            ..Default::default()
        };
        let v = vec3(0.3, 1.0, 0.2).normalize();
        let bsdf = DisneyBsdf::new(&mat, Vec3::Y, v, 1.0);
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let mut count = 0;
        for _ in 0..256 {
            if let Some(s) = bsdf.sample(v, &mut rng) {
                count += 1;
                assert!(s.pdf > 0.0);
                assert!((s.pdf - bsdf.pdf(v, s.wi)).abs() < 1e-4);
                assert!(s.f.is_finite());
            }
        }
        assert!(count > 0);
    }

    #[test]
    fn material_options() {
        let mut mat = Material::default();
        assert!(mat.set("roughness", Vec3::splat(0.25)));
        assert!(mat.set("albedo", vec3(1.0, 0.0, 0.0)));
        assert!(!mat.set("shininess", Vec3::ONE));
        assert_eq!(mat.roughness, 0.25);
        assert_eq!(mat.albedo, Vec3::X);
        assert_eq!(Material::OPTIONS.len(), 15);
    }
}
