pub mod animation_data;
pub mod error;
pub mod geometry_data;
pub mod runtime;
pub mod shared_types;
