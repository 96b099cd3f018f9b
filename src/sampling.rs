use crate::*;

/// Maps uniform random numbers onto a domain. Directions are in the local frame
/// with y up, see [`Frame`].
pub trait Warp<Input, Output> {
    fn warp(&self, u: Input) -> Output;
    fn pdf(&self, output: Output) -> f32;
}

pub struct CosineHemisphere {}
impl Warp<Vec2, Vec3> for CosineHemisphere {
    fn warp(&self, u: Vec2) -> Vec3 {
        let r = u.x.sqrt();
        let phi = 2.0 * PI * u.y;
        let x = r * phi.cos();
        let z = r * phi.sin();
        vec3(x, (1.0 - x * x - z * z).max(0.0).sqrt(), z)
    }

    fn pdf(&self, output: Vec3) -> f32 {
        if output.y < 0.0 {
            0.0
        } else {
            output.y * FRAC_1_PI
        }
    }
}
