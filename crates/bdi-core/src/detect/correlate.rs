//! Same-size 2-D cross-correlation with symmetric boundary extension,
//! evaluated through the FFT.

use ndarray::{s, Array2, ArrayView2};

use crate::align::fft::{fft2d_forward, ifft2d_real};
use crate::error::{BdiError, Result};

use super::median::reflect;

/// Cross-correlate `image` with `stamp`.
///
/// `out[i, j] = Σ image[i + k - sh/2, j + l - sw/2] · stamp[k, l]`, with the
/// image extended past its edges by half-sample reflection. The output has
/// the shape of `image`, so a star matching the stamp's center peaks at the
/// star's own pixel.
pub fn correlate_same(image: &ArrayView2<f64>, stamp: &ArrayView2<f64>) -> Result<Array2<f64>> {
    let (h, w) = image.dim();
    let (sh, sw) = stamp.dim();
    if h == 0 || w == 0 || sh == 0 || sw == 0 {
        return Err(BdiError::ShapeMismatch(format!(
            "correlation of {w}x{h} image with {sw}x{sh} stamp"
        )));
    }

    let (ph, pw) = (h + 2 * sh, w + 2 * sw);
    let padded = Array2::from_shape_fn((ph, pw), |(r, c)| {
        let v = image[[
            reflect(r as i64 - sh as i64, h),
            reflect(c as i64 - sw as i64, w),
        ]];
        if v.is_finite() {
            v
        } else {
            0.0
        }
    });

    let mut spectrum = fft2d_forward(&padded.view(), (ph, pw));
    let stamp_fft = fft2d_forward(stamp, (ph, pw));
    spectrum.zip_mut_with(&stamp_fft, |p, s| *p *= s.conj());
    let circular = ifft2d_real(spectrum);

    let row0 = sh - sh / 2;
    let col0 = sw - sw / 2;
    Ok(circular
        .slice(s![row0..row0 + h, col0..col0 + w])
        .to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(image: &Array2<f64>, stamp: &Array2<f64>) -> Array2<f64> {
        let (h, w) = image.dim();
        let (sh, sw) = stamp.dim();
        Array2::from_shape_fn((h, w), |(i, j)| {
            let mut sum = 0.0;
            for k in 0..sh {
                for l in 0..sw {
                    let r = reflect(i as i64 + k as i64 - (sh / 2) as i64, h);
                    let c = reflect(j as i64 + l as i64 - (sw / 2) as i64, w);
                    sum += image[[r, c]] * stamp[[k, l]];
                }
            }
            sum
        })
    }

    #[test]
    fn matches_direct_sum() {
        let image = Array2::from_shape_fn((11, 13), |(r, c)| ((r * 5 + c * 3) % 7) as f64);
        let stamp = Array2::from_shape_fn((4, 3), |(r, c)| (r + 2 * c) as f64);
        let fast = correlate_same(&image.view(), &stamp.view()).unwrap();
        let slow = direct(&image, &stamp);
        for (a, b) in fast.iter().zip(slow.iter()) {
            assert!((a - b).abs() < 1e-8, "{a} vs {b}");
        }
    }

    #[test]
    fn peak_lands_on_matching_source() {
        let mut image = Array2::<f64>::zeros((32, 32));
        image[[20, 9]] = 10.0;
        image[[19, 9]] = 4.0;
        let mut stamp = Array2::<f64>::zeros((5, 5));
        stamp[[2, 2]] = 10.0;
        stamp[[1, 2]] = 4.0;
        let corr = correlate_same(&image.view(), &stamp.view()).unwrap();
        let (idx, _) = corr
            .indexed_iter()
            .fold(((0, 0), f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        assert_eq!(idx, (20, 9));
    }
}
