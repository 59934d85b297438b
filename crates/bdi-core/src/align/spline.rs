//! Cubic B-spline resampling for sub-pixel shifts and rotations.
//!
//! The image is first converted to spline coefficients with the recursive
//! prefilter of Unser (1999) using mirror boundaries, then sampled at
//! arbitrary coordinates. Coordinates that fall outside the input are
//! filled with zero.

use ndarray::{Array2, ArrayView2, ArrayViewMut1, Axis, Zip};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Pole of the cubic B-spline prefilter.
const POLE: f64 = -0.267_949_192_431_122_7; // sqrt(3) - 2

/// Relative precision of the causal initialization sum.
const PREFILTER_TOLERANCE: f64 = 1e-12;

/// Slack (pixels) on the boundary test so exact edge samples stay inside.
const EDGE_SLACK: f64 = 1e-9;

/// An image represented by its cubic B-spline coefficients.
pub struct SplineImage {
    coeffs: Array2<f64>,
}

impl SplineImage {
    pub fn new(data: &ArrayView2<f64>) -> Self {
        let mut coeffs = data.mapv(|v| if v.is_finite() { v } else { 0.0 });
        for row in coeffs.axis_iter_mut(Axis(0)) {
            prefilter_line(row);
        }
        for col in coeffs.axis_iter_mut(Axis(1)) {
            prefilter_line(col);
        }
        Self { coeffs }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.coeffs.dim()
    }

    /// Interpolated value at (`y`, `x`) in pixel coordinates; zero outside.
    pub fn sample(&self, y: f64, x: f64) -> f64 {
        let (h, w) = self.coeffs.dim();
        if !(y >= -EDGE_SLACK && y <= (h - 1) as f64 + EDGE_SLACK)
            || !(x >= -EDGE_SLACK && x <= (w - 1) as f64 + EDGE_SLACK)
        {
            return 0.0;
        }

        let y0 = y.floor();
        let x0 = x.floor();
        let wy = bspline_weights(y - y0);
        let wx = bspline_weights(x - x0);
        let y0 = y0 as i64;
        let x0 = x0 as i64;

        let mut value = 0.0;
        for (i, wyi) in wy.iter().enumerate() {
            let r = mirror(y0 - 1 + i as i64, h);
            let mut row_sum = 0.0;
            for (j, wxj) in wx.iter().enumerate() {
                let c = mirror(x0 - 1 + j as i64, w);
                row_sum += wxj * self.coeffs[[r, c]];
            }
            value += wyi * row_sum;
        }
        value
    }
}

/// Translate an image by (`dy`, `dx`) pixels: `out(y, x) = in(y - dy, x - dx)`.
pub fn shift_image(data: &ArrayView2<f64>, dy: f64, dx: f64) -> Array2<f64> {
    let spline = SplineImage::new(data);
    resample(&spline, data.dim(), |row, col| (row - dy, col - dx))
}

/// Output canvas size that holds the whole input after rotation by `angle_deg`.
pub fn rotated_shape(shape: (usize, usize), angle_deg: f64) -> (usize, usize) {
    let (ih, iw) = (shape.0 as f64, shape.1 as f64);
    let (s, c) = angle_deg.to_radians().sin_cos();
    // Rotated corners of the input plane, in (row, col).
    let corners = [(0.0, 0.0), (0.0, iw), (ih, 0.0), (ih, iw)];
    let (mut rmin, mut rmax, mut cmin, mut cmax) = (
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
    );
    for (r, col) in corners {
        let rr = c * r + s * col;
        let cc = -s * r + c * col;
        rmin = rmin.min(rr);
        rmax = rmax.max(rr);
        cmin = cmin.min(cc);
        cmax = cmax.max(cc);
    }
    (
        (rmax - rmin + 0.5) as usize,
        (cmax - cmin + 0.5) as usize,
    )
}

/// Rotate an image by `angle_deg` about its center onto a canvas of
/// `out_shape`, with the input center mapped to the canvas center.
pub fn rotate_into(data: &ArrayView2<f64>, angle_deg: f64, out_shape: (usize, usize)) -> Array2<f64> {
    let (s, c) = angle_deg.to_radians().sin_cos();
    let (ih, iw) = data.dim();
    let in_center = ((ih as f64 - 1.0) / 2.0, (iw as f64 - 1.0) / 2.0);
    let out_center = (
        (out_shape.0 as f64 - 1.0) / 2.0,
        (out_shape.1 as f64 - 1.0) / 2.0,
    );
    // input = M * output + offset, M = [[c, s], [-s, c]]
    let offset = (
        in_center.0 - (c * out_center.0 + s * out_center.1),
        in_center.1 - (-s * out_center.0 + c * out_center.1),
    );

    let spline = SplineImage::new(data);
    resample(&spline, out_shape, |row, col| {
        (
            c * row + s * col + offset.0,
            -s * row + c * col + offset.1,
        )
    })
}

/// Fill an `out_shape` canvas by sampling `spline` at `map(row, col)`.
fn resample<F>(spline: &SplineImage, out_shape: (usize, usize), map: F) -> Array2<f64>
where
    F: Fn(f64, f64) -> (f64, f64) + Sync,
{
    let mut out = Array2::<f64>::zeros(out_shape);
    let fill = |(row, col): (usize, usize), v: &mut f64| {
        let (y, x) = map(row as f64, col as f64);
        *v = spline.sample(y, x);
    };
    if out_shape.0 * out_shape.1 >= PARALLEL_PIXEL_THRESHOLD {
        Zip::indexed(&mut out).par_for_each(fill);
    } else {
        Zip::indexed(&mut out).for_each(fill);
    }
    out
}

fn bspline_weights(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    let u = 1.0 - t;
    [
        u * u * u / 6.0,
        (4.0 - 6.0 * t2 + 3.0 * t3) / 6.0,
        (1.0 + 3.0 * t + 3.0 * t2 - 3.0 * t3) / 6.0,
        t3 / 6.0,
    ]
}

/// Mirror-symmetric index without edge repetition: -1 -> 1, n -> n - 2.
fn mirror(index: i64, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as i64 - 1);
    let mut i = index.rem_euclid(period);
    if i >= n as i64 {
        i = period - i;
    }
    i as usize
}

/// In-place conversion of samples to cubic B-spline coefficients.
fn prefilter_line(mut line: ArrayViewMut1<f64>) {
    let n = line.len();
    if n < 2 {
        return;
    }
    let z = POLE;
    let gain = (1.0 - z) * (1.0 - 1.0 / z);
    line.mapv_inplace(|v| v * gain);

    // Causal initialization with mirror boundary.
    let horizon = (PREFILTER_TOLERANCE.ln() / z.abs().ln()).ceil() as usize;
    if horizon < n {
        let mut zn = z;
        let mut sum = line[0];
        for k in 1..horizon {
            sum += zn * line[k];
            zn *= z;
        }
        line[0] = sum;
    } else {
        let iz = 1.0 / z;
        let mut zn = z;
        let mut z2n = z.powi(n as i32 - 1);
        let mut sum = line[0] + z2n * line[n - 1];
        z2n *= z2n * iz;
        for k in 1..n - 1 {
            sum += (zn + z2n) * line[k];
            zn *= z;
            z2n *= iz;
        }
        line[0] = sum / (1.0 - zn * zn);
    }
    for k in 1..n {
        line[k] += z * line[k - 1];
    }

    // Anti-causal initialization and recursion.
    line[n - 1] = (z / (z * z - 1.0)) * (z * line[n - 2] + line[n - 1]);
    for k in (0..n - 1).rev() {
        line[k] = z * (line[k + 1] - line[k]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spline_reproduces_samples_at_knots() {
        let data = Array2::from_shape_fn((9, 12), |(r, c)| ((r * 7 + c * 3) % 11) as f64);
        let spline = SplineImage::new(&data.view());
        for ((r, c), &v) in data.indexed_iter() {
            assert!((spline.sample(r as f64, c as f64) - v).abs() < 1e-8);
        }
    }

    #[test]
    fn mirror_reflects_without_repeating_edge() {
        assert_eq!(mirror(-1, 5), 1);
        assert_eq!(mirror(5, 5), 3);
        assert_eq!(mirror(2, 5), 2);
        assert_eq!(mirror(-3, 1), 0);
    }

    #[test]
    fn weights_partition_unity() {
        for t in [0.0, 0.25, 0.5, 0.9] {
            let w = bspline_weights(t);
            assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn integer_shift_moves_content() {
        let mut data = Array2::<f64>::zeros((16, 16));
        data[[8, 8]] = 1.0;
        let shifted = shift_image(&data.view(), 2.0, -3.0);
        assert!((shifted[[10, 5]] - 1.0).abs() < 1e-8);
    }

    fn argmax(data: &Array2<f64>) -> (usize, usize) {
        let mut best = ((0, 0), f64::NEG_INFINITY);
        for (idx, &v) in data.indexed_iter() {
            if v > best.1 {
                best = (idx, v);
            }
        }
        best.0
    }

    #[test]
    fn quarter_turn_is_counterclockwise() {
        let n = 21;
        let data = Array2::from_shape_fn((n, n), |(r, c)| {
            let (dy, dx) = (r as f64 - 5.0, c as f64 - 14.0);
            (-(dx * dx + dy * dy) / 4.5).exp()
        });
        let rotated = rotate_into(&data.view(), 90.0, (n, n));
        // Same mapping as numpy's rot90: out[i, j] = in[j, n - 1 - i].
        assert_eq!(argmax(&rotated), (n - 1 - 14, 5));
        for ((i, j), &v) in rotated.indexed_iter() {
            assert!((v - data[[j, n - 1 - i]]).abs() < 1e-6);
        }
    }

    #[test]
    fn rotation_onto_larger_canvas_keeps_center() {
        let mut data = Array2::<f64>::zeros((11, 11));
        data[[5, 5]] = 1.0;
        let rotated = rotate_into(&data.view(), 30.0, (15, 15));
        assert_eq!(argmax(&rotated), (7, 7));
    }

    #[test]
    fn reshaped_canvas_for_right_angle_swaps_axes() {
        assert_eq!(rotated_shape((20, 40), 90.0), (40, 20));
        assert_eq!(rotated_shape((20, 40), 0.0), (20, 40));
    }
}
