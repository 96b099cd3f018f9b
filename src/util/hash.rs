use crate::*;

const PRIME32_2: u32 = 2246822519;
const PRIME32_3: u32 = 3266489917;
const PRIME32_4: u32 = 668265263;
const PRIME32_5: u32 = 374761393;

#[inline]
fn xxhash32_finish(mut h32: u32) -> u32 {
    h32 = PRIME32_2.wrapping_mul(h32 ^ (h32 >> 15));
    h32 = PRIME32_3.wrapping_mul(h32 ^ (h32 >> 13));
    h32 ^ (h32 >> 16)
}

pub fn xxhash32_1(p: u32) -> u32 {
    let h32 = p.wrapping_add(PRIME32_5);
    xxhash32_finish(PRIME32_4.wrapping_mul(h32.rotate_left(17)))
}

pub fn xxhash32_3(p: [u32; 3]) -> u32 {
    let mut h32 = p[2]
        .wrapping_add(PRIME32_5)
        .wrapping_add(p[0].wrapping_mul(PRIME32_3));
    h32 = PRIME32_4.wrapping_mul(h32.rotate_left(17));
    h32 = h32.wrapping_add(p[1].wrapping_mul(PRIME32_3));
    h32 = PRIME32_4.wrapping_mul(h32.rotate_left(17));
    xxhash32_finish(h32)
}

/// Seed for the per pixel, per sample random stream.
pub fn pixel_seed(pixel: UVec2, sample: u32) -> u64 {
    let lo = xxhash32_3([pixel.x, pixel.y, sample]);
    let hi = xxhash32_1(lo);
    ((hi as u64) << 32) | lo as u64
}

#[inline]
fn fract(x: f32) -> f32 {
    x - x.floor()
}

/// Fract based lattice hash in [0, 1).
pub fn lattice_hash(p: Vec2) -> f32 {
    let p = 50.0 * (p * 0.318_309_9 + vec2(0.71, 0.113)).fract();
    fract(p.x * p.y * (p.x + p.y))
}

/// Bilinear value noise over [`lattice_hash`] with a smoothstep weight.
pub fn noise2d(p: Vec2) -> f32 {
    let i = p.floor();
    let f = p - i;
    let u = f * f * (Vec2::splat(3.0) - 2.0 * f);
    let a = lattice_hash(i);
    let b = lattice_hash(i + vec2(1.0, 0.0));
    let c = lattice_hash(i + vec2(0.0, 1.0));
    let d = lattice_hash(i + vec2(1.0, 1.0));
    let v = mix(mix(a, b, u.x), mix(c, d, u.x), u.y);
    // rounding in the bilinear blend can land exactly on 1
    v.clamp(0.0, 1.0 - f32::EPSILON)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn noise_range_and_determinism() {
        for y in 0..64 {
            for x in 0..64 {
                let p = vec2(x as f32 * 0.37 - 11.0, y as f32 * 0.53 - 17.0);
                let n = noise2d(p);
                assert!((0.0..1.0).contains(&n), "noise2d({}) = {}", p, n);
                assert_eq!(n.to_bits(), noise2d(p).to_bits());
            }
        }
    }

    #[test]
    fn noise_matches_lattice_at_integers() {
        let p = vec2(3.0, -2.0);
        assert_eq!(noise2d(p), lattice_hash(p).min(1.0 - f32::EPSILON));
    }

    #[test]
    fn seeds_differ() {
        assert_ne!(pixel_seed(uvec2(0, 0), 0), pixel_seed(uvec2(1, 0), 0));
        assert_ne!(pixel_seed(uvec2(0, 0), 0), pixel_seed(uvec2(0, 0), 1));
    }
}
