// Generalized Trowbridge-Reitz distributions and Smith shadowing terms used by
// the principled BSDF. Arguments are cosines against the shading normal.
use crate::*;

pub fn gtr1(n_dot_h: f32, a: f32) -> f32 {
    if a >= 1.0 {
        return FRAC_1_PI;
    }
    let a2 = a * a;
    let t = 1.0 + (a2 - 1.0) * n_dot_h * n_dot_h;
    (a2 - 1.0) / (PI * a2.ln() * t)
}

pub fn gtr2(n_dot_h: f32, a: f32) -> f32 {
    let a2 = a * a;
    let t = 1.0 + (a2 - 1.0) * n_dot_h * n_dot_h;
    a2 / (PI * t * t)
}

pub fn gtr2_aniso(n_dot_h: f32, h_dot_x: f32, h_dot_y: f32, ax: f32, ay: f32) -> f32 {
    let a = h_dot_x / ax;
    let b = h_dot_y / ay;
    let c = a * a + b * b + n_dot_h * n_dot_h;
    1.0 / (PI * ax * ay * c * c)
}

pub fn smith_g_ggx(n_dot_v: f32, alpha_g: f32) -> f32 {
    let a = alpha_g * alpha_g;
    let b = n_dot_v * n_dot_v;
    1.0 / (n_dot_v + (a + b - a * b).sqrt())
}

pub fn smith_g_ggx_aniso(n_dot_v: f32, v_dot_x: f32, v_dot_y: f32, ax: f32, ay: f32) -> f32 {
    let a = v_dot_x * ax;
    let b = v_dot_y * ay;
    let c = n_dot_v;
    1.0 / (n_dot_v + (a * a + b * b + c * c).sqrt())
}

/// GGX distributed half vector in the local frame (y up).
pub fn importance_sample_ggx(roughness: f32, r1: f32, r2: f32) -> Vec3 {
    let a = roughness.max(0.001);
    let phi = r1 * 2.0 * PI;
    let cos_theta = ((1.0 - r2) / (1.0 + (a * a - 1.0) * r2)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).sqrt().clamp(0.0, 1.0);
    vec3(sin_theta * phi.cos(), cos_theta, sin_theta * phi.sin())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gtr1_rough_limit() {
        assert_eq!(gtr1(0.3, 1.0), FRAC_1_PI);
    }

    #[test]
    fn gtr2_normalized() {
        // integral of D(h) cos(theta_h) over the hemisphere is 1
        let a = 0.4;
        let n = 20000;
        let mut sum = 0.0f64;
        for i in 0..n {
            let cos_t = (i as f64 + 0.5) / n as f64;
            sum += gtr2(cos_t as f32, a) as f64 * cos_t * (1.0 / n as f64) * 2.0 * std::f64::consts::PI;
        }
        assert!((sum - 1.0).abs() < 1e-2, "{}", sum);
    }

    #[test]
    fn aniso_matches_iso() {
        let h = vec3(0.3, 0.9, 0.1).normalize();
        let iso = gtr2(h.y, 0.3);
        let aniso = gtr2_aniso(h.y, h.x, h.z, 0.3, 0.3);
        assert!((iso - aniso).abs() / iso < 1e-4);
    }

    #[test]
    fn ggx_samples_upper_hemisphere() {
        for i in 0..16 {
            for j in 0..16 {
                let h = importance_sample_ggx(0.5, i as f32 / 16.0, j as f32 / 16.0);
                assert!(h.y >= 0.0);
                assert!((h.length() - 1.0).abs() < 1e-4);
            }
        }
    }
}
