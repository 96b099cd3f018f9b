use std::path::Path;

use crate::*;

/// Running average of sample passes. Pixel (0, 0) is the top left corner.
pub struct Film {
    pixels: Vec<Vec4>,
    resolution: UVec2,
    samples: u32,
}

impl Film {
    pub fn new(resolution: UVec2) -> Self {
        Self {
            pixels: vec![Vec4::ZERO; (resolution.x * resolution.y) as usize],
            resolution,
            samples: 0,
        }
    }
    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }
    pub fn samples(&self) -> u32 {
        self.samples
    }
    pub fn clear(&mut self) {
        self.pixels.fill(Vec4::ZERO);
        self.samples = 0;
    }

    /// Folds one full frame into the average: after `n` passes every pixel is
    /// the mean of the `n` values it received.
    pub fn accumulate(&mut self, pass: &[Vec4]) -> Result<(), RenderError> {
        if pass.len() != self.pixels.len() {
            return Err(RenderError::PassSize {
                expected: self.pixels.len(),
                actual: pass.len(),
            });
        }
        let k = self.samples as f32;
        let w = 1.0 / (k + 1.0);
        self.pixels.par_iter_mut().zip(pass.par_iter()).for_each(|(acc, s)| {
            let s = if s.is_finite() { *s } else { Vec4::ZERO };
            *acc += (s - *acc) * w;
        });
        self.samples += 1;
        Ok(())
    }

    pub fn get_pixel(&self, pixel: UVec2) -> Vec4 {
        self.pixels[(pixel.x + pixel.y * self.resolution.x) as usize]
    }

    /// Colors are already display encoded, only clamped and quantized here.
    pub fn to_rgba_image(&self) -> image::RgbaImage {
        image::ImageBuffer::from_fn(self.resolution.x, self.resolution.y, |x, y| {
            let c = self.get_pixel(uvec2(x, y)).clamp(Vec4::ZERO, Vec4::ONE) * 255.0;
            image::Rgba([
                c.x.round() as u8,
                c.y.round() as u8,
                c.z.round() as u8,
                c.w.round() as u8,
            ])
        })
    }

    pub fn write_png(&self, path: impl AsRef<Path>) -> Result<(), image::ImageError> {
        self.to_rgba_image().save(path)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn running_average() {
        let mut film = Film::new(uvec2(2, 1));
        film.accumulate(&[Vec4::ONE, Vec4::ZERO]).unwrap();
        film.accumulate(&[Vec4::ZERO, Vec4::ONE]).unwrap();
        film.accumulate(&[Vec4::ONE, Vec4::ONE]).unwrap();
        assert_eq!(film.samples(), 3);
        assert!((film.get_pixel(uvec2(0, 0)) - Vec4::splat(2.0 / 3.0)).length() < 1e-6);
        assert!((film.get_pixel(uvec2(1, 0)) - Vec4::splat(2.0 / 3.0)).length() < 1e-6);
        film.clear();
        assert_eq!(film.samples(), 0);
        assert_eq!(film.get_pixel(uvec2(1, 0)), Vec4::ZERO);
    }

    #[test]
    fn non_finite_samples_count_as_black() {
        let mut film = Film::new(uvec2(1, 1));
        film.accumulate(&[Vec4::ONE]).unwrap();
        film.accumulate(&[Vec4::splat(f32::NAN)]).unwrap();
        assert!((film.get_pixel(uvec2(0, 0)) - Vec4::splat(0.5)).length() < 1e-6);
    }

    #[test]
    fn pass_size_must_match() {
        let mut film = Film::new(uvec2(2, 2));
        assert_eq!(
            film.accumulate(&[Vec4::ONE; 3]),
            Err(RenderError::PassSize {
                expected: 4,
                actual: 3
            })
        );
        assert_eq!(film.samples(), 0);
        assert_eq!(film.get_pixel(uvec2(1, 1)), Vec4::ZERO);
    }

    #[test]
    fn image_quantization() {
        let mut film = Film::new(uvec2(1, 2));
        film.accumulate(&[vec4(2.0, 0.5, -1.0, 1.0), Vec4::ZERO]).unwrap();
        let img = film.to_rgba_image();
        assert_eq!(img.get_pixel(0, 0).0, [255, 128, 0, 255]);
        assert_eq!(img.get_pixel(0, 1).0, [0, 0, 0, 0]);
    }
}
