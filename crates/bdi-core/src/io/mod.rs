pub mod fits;
pub mod image_io;
pub mod source;
pub mod table;
