pub mod color;
pub mod transform;
