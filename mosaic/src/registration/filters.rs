//! Pre-correlation filters applied to overlap strips.

use common::buffer2::Buffer2;
use rayon::prelude::*;

/// Circular median filter with a disk footprint of `radius` pixels.
///
/// Samples outside the image replicate the nearest edge. A radius of 0 returns
/// an unchanged copy.
pub fn median_filter_disk(image: &Buffer2<f32>, radius: usize) -> Buffer2<f32> {
    if radius == 0 {
        return image.clone();
    }

    let offsets = disk_offsets(radius);
    let width = image.width();
    let mid = offsets.len() / 2;
    let mut output = vec![0.0f32; width * image.height()];

    output
        .par_chunks_mut(width)
        .enumerate()
        .for_each_init(
            || Vec::with_capacity(offsets.len()),
            |window, (y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    window.clear();
                    window.extend(offsets.iter().map(|&(dx, dy)| {
                        *image.get_clamped(x as isize + dx, y as isize + dy)
                    }));
                    let (_, median, _) = window.select_nth_unstable_by(mid, f32::total_cmp);
                    *out = *median;
                }
            },
        );

    Buffer2::new(width, image.height(), output)
}

/// Offsets `(dx, dy)` with `dx² + dy² <= radius²`. Always an odd count.
fn disk_offsets(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let r2 = r * r;
    (-r..=r)
        .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| dx * dx + dy * dy <= r2)
        .collect()
}

/// Sobel gradient magnitude. The one-pixel border is zero.
pub fn sobel_magnitude(image: &Buffer2<f32>) -> Buffer2<f32> {
    let width = image.width();
    let height = image.height();
    let mut output = vec![0.0f32; width * height];
    if width < 3 || height < 3 {
        return Buffer2::new(width, height, output);
    }

    output
        .par_chunks_mut(width)
        .enumerate()
        .skip(1)
        .take(height - 2)
        .for_each(|(y, row)| {
            let above = image.row(y - 1);
            let curr = image.row(y);
            let below = image.row(y + 1);
            for x in 1..width - 1 {
                let gx = (above[x + 1] + 2.0 * curr[x + 1] + below[x + 1])
                    - (above[x - 1] + 2.0 * curr[x - 1] + below[x - 1]);
                let gy = (below[x - 1] + 2.0 * below[x] + below[x + 1])
                    - (above[x - 1] + 2.0 * above[x] + above[x + 1]);
                row[x] = (gx * gx + gy * gy).sqrt();
            }
        });

    Buffer2::new(width, height, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_offsets_counts() {
        assert_eq!(disk_offsets(1).len(), 5);
        assert_eq!(disk_offsets(2).len(), 13);
        assert_eq!(disk_offsets(3).len(), 29);
        assert!(disk_offsets(3).iter().all(|&(dx, dy)| dx * dx + dy * dy <= 9));
    }

    #[test]
    fn test_median_radius_zero_is_identity() {
        let image = Buffer2::from_fn(5, 4, |x, y| (x * 7 + y * 3) as f32);
        assert_eq!(median_filter_disk(&image, 0), image);
    }

    #[test]
    fn test_median_removes_impulse() {
        let mut image = Buffer2::new_filled(9, 9, 0.25f32);
        image[(4, 4)] = 10.0;
        image[(0, 0)] = -5.0;
        let filtered = median_filter_disk(&image, 2);
        assert!(filtered.iter().all(|&v| v == 0.25), "impulses must vanish");
    }

    #[test]
    fn test_median_preserves_straight_edge() {
        let image = Buffer2::from_fn(10, 6, |x, _| if x < 5 { 0.0 } else { 1.0 });
        let filtered = median_filter_disk(&image, 2);
        assert_eq!(filtered, image);
    }

    #[test]
    fn test_sobel_constant_is_zero() {
        let image = Buffer2::new_filled(6, 5, 0.7f32);
        assert!(sobel_magnitude(&image).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_sobel_vertical_edge() {
        let image = Buffer2::from_fn(6, 5, |x, _| if x < 3 { 0.0 } else { 1.0 });
        let edges = sobel_magnitude(&image);
        assert_eq!(edges[(2, 2)], 4.0);
        assert_eq!(edges[(3, 2)], 4.0);
        assert_eq!(edges[(1, 2)], 0.0);
        assert_eq!(edges[(2, 0)], 0.0, "border row stays zero");
        assert_eq!(edges[(0, 2)], 0.0, "border column stays zero");
    }

    #[test]
    fn test_sobel_tiny_image_is_zero() {
        let image = Buffer2::from_fn(2, 8, |x, y| (x + y) as f32);
        assert!(sobel_magnitude(&image).iter().all(|&v| v == 0.0));
    }
}
