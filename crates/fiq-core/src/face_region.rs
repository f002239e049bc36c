//! Landmark-derived face region mask on the aligned canvas.

use crate::matrix::Matrix;
use crate::types::FaceLandmarks;
use ndarray::Array3;

/// Convex hull of `points` in counter-clockwise order (Andrew's monotone chain).
pub fn convex_hull(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut pts: Vec<(f64, f64)> = points.to_vec();
    pts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    }

    let mut hull: Vec<(f64, f64)> = Vec::with_capacity(pts.len() * 2);
    for &p in &pts {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

/// Rasterize the landmark hull into a `rows` x `cols` single-channel mask
/// (1 inside, 0 outside).
///
/// `alpha` moves every hull vertex toward the hull centroid: 0 keeps the full
/// hull, values approaching 1 collapse it. It is clamped to `[0, 1]`.
pub fn face_region_mask(landmarks: &FaceLandmarks, rows: usize, cols: usize, alpha: f64) -> Matrix {
    let mut mask = Array3::<u8>::zeros((rows, cols, 1));

    let points: Vec<(f64, f64)> = landmarks
        .points
        .iter()
        .map(|p| (p.x as f64, p.y as f64))
        .collect();
    let hull = convex_hull(&points);

    if hull.len() >= 3 {
        let alpha = alpha.clamp(0.0, 1.0);
        let n = hull.len() as f64;
        let (cx, cy) = hull
            .iter()
            .fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x / n, ay + y / n));
        let shrunk: Vec<(f64, f64)> = hull
            .iter()
            .map(|&(x, y)| (cx + (1.0 - alpha) * (x - cx), cy + (1.0 - alpha) * (y - cy)))
            .collect();

        let (min_x, max_x, min_y, max_y) = shrunk.iter().fold(
            (f64::MAX, f64::MIN, f64::MAX, f64::MIN),
            |(a, b, c, d), &(x, y)| (a.min(x), b.max(x), c.min(y), d.max(y)),
        );
        let x_start = min_x.floor().max(0.0) as usize;
        let y_start = min_y.floor().max(0.0) as usize;
        let x_end = (max_x.ceil().max(0.0) as usize).min(cols.saturating_sub(1));
        let y_end = (max_y.ceil().max(0.0) as usize).min(rows.saturating_sub(1));

        if cols > 0 && rows > 0 {
            for y in y_start..=y_end {
                for x in x_start..=x_end {
                    if inside_convex(&shrunk, (x as f64, y as f64)) {
                        mask[[y, x, 0]] = 1;
                    }
                }
            }
        }
    }

    Matrix::U8(mask)
}

/// Point-in-polygon for a counter-clockwise convex polygon, boundary inclusive.
fn inside_convex(poly: &[(f64, f64)], p: (f64, f64)) -> bool {
    let n = poly.len();
    (0..n).all(|i| {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0) >= -1e-9
    })
}
