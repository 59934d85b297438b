pub mod align;
pub mod consts;
pub mod detect;
pub mod error;
pub mod frame;
pub mod io;
pub mod klip;
pub mod pipeline;
pub mod stack;
