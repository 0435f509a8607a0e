use std::ops::{Deref, DerefMut, Index, IndexMut};

/// Row-major 2-D buffer of samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer2<T> {
    pixels: Vec<T>,
    width: usize,
    height: usize,
}

impl<T> Buffer2<T> {
    pub fn new(width: usize, height: usize, pixels: Vec<T>) -> Self {
        assert_eq!(
            pixels.len(),
            width * height,
            "pixels length must equal width * height"
        );
        Self {
            pixels,
            width,
            height,
        }
    }

    /// Builds a buffer by evaluating `f(x, y)` for every sample.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            pixels,
            width,
            height,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> &T {
        debug_assert!(x < self.width && y < self.height);
        &self.pixels[y * self.width + x]
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        debug_assert!(x < self.width && y < self.height);
        &mut self.pixels[y * self.width + x]
    }

    /// Sample at `(x, y)` with coordinates clamped to the buffer edge.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> &T {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        &self.pixels[y * self.width + x]
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[T] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [T] {
        &mut self.pixels
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.pixels
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Buffer2<U> {
        Buffer2 {
            pixels: self.pixels.iter().map(f).collect(),
            width: self.width,
            height: self.height,
        }
    }
}

impl<T: Clone> Buffer2<T> {
    pub fn new_filled(width: usize, height: usize, value: T) -> Self {
        Self {
            pixels: vec![value; width * height],
            width,
            height,
        }
    }

    /// Copies the `width x height` window whose top-left corner is `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the window does not lie inside the buffer.
    pub fn crop(&self, x: usize, y: usize, width: usize, height: usize) -> Self {
        assert!(
            x + width <= self.width && y + height <= self.height,
            "crop window exceeds buffer bounds"
        );
        let mut pixels = Vec::with_capacity(width * height);
        for row in y..y + height {
            let start = row * self.width + x;
            pixels.extend_from_slice(&self.pixels[start..start + width]);
        }
        Self {
            pixels,
            width,
            height,
        }
    }
}

impl<T: Default + Clone> Buffer2<T> {
    pub fn new_default(width: usize, height: usize) -> Self {
        Self::new_filled(width, height, T::default())
    }
}

impl<T> Index<(usize, usize)> for Buffer2<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.pixels[y * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize)> for Buffer2<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        &mut self.pixels[y * self.width + x]
    }
}

impl<T> Deref for Buffer2<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.pixels
    }
}

impl<T> DerefMut for Buffer2<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.pixels
    }
}

impl<T> From<Buffer2<T>> for Vec<T> {
    #[inline]
    fn from(buffer: Buffer2<T>) -> Self {
        buffer.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stores_dimensions() {
        let buf = Buffer2::new(3, 2, vec![10, 20, 30, 40, 50, 60]);
        assert_eq!(buf.width(), 3);
        assert_eq!(buf.height(), 2);
        assert_eq!(buf.len(), 6);
    }

    #[test]
    #[should_panic(expected = "pixels length must equal width * height")]
    fn test_new_panics_on_size_mismatch() {
        Buffer2::new(3, 2, vec![1, 2, 3]);
    }

    #[test]
    fn test_from_fn_is_row_major() {
        let buf = Buffer2::from_fn(3, 2, |x, y| 10 * y + x);
        assert_eq!(buf.pixels(), &[0, 1, 2, 10, 11, 12]);
        assert_eq!(buf[(2, 1)], 12);
        assert_eq!(buf.row(1), &[10, 11, 12]);
    }

    #[test]
    fn test_get_clamped_replicates_edges() {
        let buf = Buffer2::from_fn(3, 3, |x, y| 10 * y + x);
        assert_eq!(*buf.get_clamped(-2, 0), 0);
        assert_eq!(*buf.get_clamped(5, 1), 12);
        assert_eq!(*buf.get_clamped(1, -1), 1);
        assert_eq!(*buf.get_clamped(1, 9), 21);
    }

    #[test]
    fn test_crop_copies_window() {
        let buf = Buffer2::from_fn(4, 3, |x, y| 10 * y + x);
        let strip = buf.crop(2, 1, 2, 2);
        assert_eq!(strip.width(), 2);
        assert_eq!(strip.height(), 2);
        assert_eq!(strip.pixels(), &[12, 13, 22, 23]);
    }

    #[test]
    #[should_panic(expected = "crop window exceeds buffer bounds")]
    fn test_crop_out_of_bounds_panics() {
        let buf = Buffer2::new_filled(4, 4, 0u8);
        buf.crop(3, 0, 2, 1);
    }

    #[test]
    fn test_map_keeps_shape() {
        let buf = Buffer2::new(2, 1, vec![1u16, 2]);
        let mapped = buf.map(|&v| v as f32 * 0.5);
        assert_eq!(mapped.width(), 2);
        assert_eq!(mapped.pixels(), &[0.5, 1.0]);
    }

    #[test]
    fn test_new_default_and_index_mut() {
        let mut buf: Buffer2<f32> = Buffer2::new_default(2, 2);
        buf[(1, 1)] = 7.0;
        *buf.get_mut(0, 1) = 3.0;
        assert_eq!(buf.into_vec(), vec![0.0, 0.0, 3.0, 7.0]);
    }
}
