pub mod builder;
pub mod identity;
pub mod normalize;
pub mod render;
pub mod snapshot_model;
