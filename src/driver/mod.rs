pub mod bridge;
pub mod driver_model;
pub mod error;
