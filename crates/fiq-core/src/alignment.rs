//! Face alignment: similarity transform from five landmark anchors to a fixed
//! template, then a bilinear warp of the input image onto a square canvas.

use crate::capabilities::StageError;
use crate::matrix::Matrix;
use crate::types::{FaceLandmarks, Image, LandmarkKind, LandmarkPoint};
use ndarray::Array3;

/// Side length of the aligned face canvas.
pub const ALIGNED_SIZE: usize = 616;

// 98-point (WFLW) indices of the alignment anchors.
const LEFT_PUPIL: usize = 96;
const RIGHT_PUPIL: usize = 97;
const NOSE_TIP: usize = 54;
const LEFT_MOUTH_CORNER: usize = 76;
const RIGHT_MOUTH_CORNER: usize = 82;
const LM98_COUNT: usize = 98;

// ArcFace 112x112 reference positions, scaled onto the aligned canvas with
// headroom above the eyes for hair and head coverings.
const REFERENCE_112: [(f64, f64); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];
const TEMPLATE_SCALE: f64 = 2.75;
const TEMPLATE_OFFSET: (f64, f64) = (154.0, 180.0);

/// Template anchor positions on the aligned canvas.
pub fn template() -> [(f64, f64); 5] {
    REFERENCE_112.map(|(x, y)| {
        (
            x * TEMPLATE_SCALE + TEMPLATE_OFFSET.0,
            y * TEMPLATE_SCALE + TEMPLATE_OFFSET.1,
        )
    })
}

/// `[[a, -b, tx], [b, a, ty]]`: rotation plus uniform scale plus translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f64,
    pub b: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Similarity {
    /// Least-squares similarity mapping `src` onto `dst`.
    ///
    /// Returns `None` when the source points are (nearly) coincident.
    pub fn estimate(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<Self> {
        if src.len() != dst.len() || src.is_empty() {
            return None;
        }
        let n = src.len() as f64;
        let mean = |pts: &[(f64, f64)]| {
            let (sx, sy) = pts
                .iter()
                .fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (msx, msy) = mean(src);
        let (mdx, mdy) = mean(dst);

        let mut dot = 0.0;
        let mut cross = 0.0;
        let mut var = 0.0;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst) {
            let (ax, ay) = (sx - msx, sy - msy);
            let (bx, by) = (dx - mdx, dy - mdy);
            dot += ax * bx + ay * by;
            cross += ax * by - ay * bx;
            var += ax * ax + ay * ay;
        }
        if var < 1e-9 {
            return None;
        }

        let a = dot / var;
        let b = cross / var;
        Some(Self {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        })
    }

    pub fn apply(&self, (x, y): (f64, f64)) -> (f64, f64) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Maps aligned-canvas coordinates back into the source image.
    pub fn apply_inverse(&self, (u, v): (f64, f64)) -> (f64, f64) {
        let det = self.a * self.a + self.b * self.b;
        let (du, dv) = (u - self.tx, v - self.ty);
        (
            (self.a * du + self.b * dv) / det,
            (-self.b * du + self.a * dv) / det,
        )
    }

    /// The 2x3 transformation as a single-channel f64 matrix.
    pub fn to_matrix(&self) -> Matrix {
        let rows = [[self.a, -self.b, self.tx], [self.b, self.a, self.ty]];
        Matrix::F64(Array3::from_shape_fn((2, 3, 1), |(r, c, _)| rows[r][c]))
    }
}

/// Result of aligning one face.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// `ALIGNED_SIZE` x `ALIGNED_SIZE` x 3, BGR channel order.
    pub face: Matrix,
    pub landmarks: FaceLandmarks,
    pub transform: Matrix,
}

/// Align `image` so the landmark anchors land on the template.
pub fn align_face(image: &Image, landmarks: &FaceLandmarks) -> Result<Alignment, StageError> {
    if landmarks.kind != LandmarkKind::Lm98 || landmarks.points.len() < LM98_COUNT {
        return Err(StageError::MissingInput("98-point landmarks"));
    }

    let anchor = |i: usize| {
        let p = landmarks.points[i];
        (p.x as f64, p.y as f64)
    };
    let src = [
        anchor(LEFT_PUPIL),
        anchor(RIGHT_PUPIL),
        anchor(NOSE_TIP),
        anchor(LEFT_MOUTH_CORNER),
        anchor(RIGHT_MOUTH_CORNER),
    ];
    let transform = Similarity::estimate(&src, &template())
        .ok_or_else(|| StageError::InvalidOutput("degenerate alignment anchors".into()))?;

    let face = warp_bgr(image, &transform, ALIGNED_SIZE);
    let aligned_points = landmarks
        .points
        .iter()
        .map(|p| {
            let (x, y) = transform.apply((p.x as f64, p.y as f64));
            LandmarkPoint::new(to_i16(x), to_i16(y))
        })
        .collect();

    tracing::debug!(
        scale = (transform.a * transform.a + transform.b * transform.b).sqrt(),
        tx = transform.tx,
        ty = transform.ty,
        "face aligned"
    );

    Ok(Alignment {
        face: Matrix::U8(face),
        landmarks: FaceLandmarks {
            kind: landmarks.kind,
            points: aligned_points,
        },
        transform: transform.to_matrix(),
    })
}

fn to_i16(v: f64) -> i16 {
    v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Inverse-map every canvas pixel into `image` with bilinear sampling.
/// Pixels falling outside the source are black.
fn warp_bgr(image: &Image, transform: &Similarity, size: usize) -> Array3<u8> {
    let mut out = Array3::<u8>::zeros((size, size, 3));
    let w = image.width as usize;
    let h = image.height as usize;

    for v in 0..size {
        for u in 0..size {
            let (x, y) = transform.apply_inverse((u as f64, v as f64));
            if x < 0.0 || y < 0.0 || x > (w - 1) as f64 || y > (h - 1) as f64 {
                continue;
            }
            let x0 = x.floor() as usize;
            let y0 = y.floor() as usize;
            let x1 = (x0 + 1).min(w - 1);
            let y1 = (y0 + 1).min(h - 1);
            let fx = x - x0 as f64;
            let fy = y - y0 as f64;

            let p00 = image.rgb(x0, y0);
            let p10 = image.rgb(x1, y0);
            let p01 = image.rgb(x0, y1);
            let p11 = image.rgb(x1, y1);
            for c in 0..3 {
                let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
                let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
                let value = top * (1.0 - fy) + bottom * fy;
                // RGB in, BGR out
                out[[v, u, 2 - c]] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    out
}
