pub mod deflate;
pub mod raw;
