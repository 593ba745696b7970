// THEORY:
// The `Homography` maps points on the pitch as seen by the camera to the same
// points on the top-down layout image. Both are views of one physical plane, so
// a single 3x3 matrix relates them:
//
//   [u', v', w']^T = H * [x, y, 1]^T,   layout point = (u'/w', v'/w')
//
// The divide by w' is where things can go wrong: a point on the camera's horizon
// line maps to w' = 0 and has no finite layout position. `project` reports that
// as `ProjectionDegenerate` instead of handing infinities to the renderer; the
// caller drops the point and keeps going.
//
// `estimate` recovers H from four or more clicked point pairs (normalized DLT).
// It is the last step of homography calibration and runs once, before the video
// loop; the per-frame path only ever calls `project`.

use crate::error::{Result, VisionError};
use nalgebra::{DMatrix, Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

type Rows = [[f64; 3]; 3];

/// A planar perspective transform from camera pixels to layout pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Rows", into = "Rows")]
pub struct Homography {
    matrix: Matrix3<f64>,
}

/// One camera/layout point pair picked during calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    pub camera: [f64; 2],
    pub layout: [f64; 2],
}

impl Homography {
    pub fn new(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Map a camera-space point into layout space.
    pub fn project(&self, point: Point2<f64>) -> Result<Point2<f64>> {
        let mapped = self.matrix * Vector3::new(point.x, point.y, 1.0);
        let divisor = mapped.z;
        if divisor == 0.0 || !divisor.is_finite() {
            return Err(VisionError::ProjectionDegenerate { x: point.x, y: point.y });
        }

        let projected = Point2::new(mapped.x / divisor, mapped.y / divisor);
        if !projected.x.is_finite() || !projected.y.is_finite() {
            return Err(VisionError::ProjectionDegenerate { x: point.x, y: point.y });
        }
        Ok(projected)
    }

    /// The layout-to-camera transform, if this one is invertible.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(Self::new)
    }

    /// Estimate the camera-to-layout homography from point pairs.
    pub fn estimate(pairs: &[Correspondence]) -> Result<Self> {
        if pairs.len() < 4 {
            return Err(VisionError::CalibrationMissing(format!(
                "homography needs at least 4 point pairs, got {}",
                pairs.len()
            )));
        }

        // --- 1. Conditioning ---
        // Center both point sets and scale them to a mean distance of sqrt(2).
        let camera: Vec<[f64; 2]> = pairs.iter().map(|p| p.camera).collect();
        let layout: Vec<[f64; 2]> = pairs.iter().map(|p| p.layout).collect();
        let camera_norm = normalizing_transform(&camera);
        let layout_norm = normalizing_transform(&layout);

        // --- 2. Linear system ---
        let mut a = DMatrix::<f64>::zeros(2 * pairs.len(), 9);
        for (i, pair) in pairs.iter().enumerate() {
            let src = camera_norm * Vector3::new(pair.camera[0], pair.camera[1], 1.0);
            let dst = layout_norm * Vector3::new(pair.layout[0], pair.layout[1], 1.0);
            let (x, y) = (src.x / src.z, src.y / src.z);
            let (u, v) = (dst.x / dst.z, dst.y / dst.z);

            let row = 2 * i;
            let first = [-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u];
            let second = [0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v];
            for col in 0..9 {
                a[(row, col)] = first[col];
                a[(row + 1, col)] = second[col];
            }
        }

        // --- 3. Null space ---
        // The solution is the eigenvector of A^T A with the smallest eigenvalue.
        let eigen = (a.transpose() * &a).symmetric_eigen();
        let smallest = eigen.eigenvalues.imin();
        let h = eigen.eigenvectors.column(smallest);
        let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

        // --- 4. Undo conditioning ---
        let layout_denorm = layout_norm.try_inverse().ok_or_else(|| {
            VisionError::CalibrationMissing("layout points are degenerate".to_string())
        })?;
        let mut matrix = layout_denorm * normalized * camera_norm;
        let scale = matrix[(2, 2)];
        if scale.abs() > f64::EPSILON {
            matrix /= scale;
        }

        if matrix.try_inverse().is_none() || matrix.iter().any(|v| !v.is_finite()) {
            return Err(VisionError::CalibrationMissing(
                "point pairs do not determine an invertible homography".to_string(),
            ));
        }
        Ok(Self::new(matrix))
    }
}

impl From<Rows> for Homography {
    fn from(rows: Rows) -> Self {
        Self::new(Matrix3::from_fn(|r, c| rows[r][c]))
    }
}

impl From<Homography> for Rows {
    fn from(homography: Homography) -> Self {
        let m = homography.matrix;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }
}

/// Similarity transform moving `points` to zero mean and sqrt(2) mean radius.
fn normalizing_transform(points: &[[f64; 2]]) -> Matrix3<f64> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = points.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_distance = points
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let scale = if mean_distance > f64::EPSILON {
        std::f64::consts::SQRT_2 / mean_distance
    } else {
        1.0
    };
    Matrix3::new(scale, 0.0, -scale * cx, 0.0, scale, -scale * cy, 0.0, 0.0, 1.0)
}
