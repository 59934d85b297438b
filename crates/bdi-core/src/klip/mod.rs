//! Karhunen-Loève image projection (Soummer, Pueyo & Larkin 2012).
//!
//! A reference library of PSF images is decomposed into orthonormal
//! eigen-images; the science image is projected onto the leading modes and
//! the reconstruction subtracted, once per requested truncation rank.

pub mod basis;
pub mod subtract;

pub use basis::KlBasis;
pub use subtract::{clip_ranks, psf_subtract, subtract_with_basis, KlipConfig, KlipOptions, KlipResult};
