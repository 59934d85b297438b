pub mod fft;
pub mod registration;
pub mod spline;

pub use registration::{align_to, estimate_shift};
pub use spline::{rotate_into, rotated_shape, shift_image};
