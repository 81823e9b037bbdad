pub mod shared;
pub mod sink;
pub mod source;
