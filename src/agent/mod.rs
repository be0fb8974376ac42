pub mod agent_model;
pub mod controller;
pub mod decision;
pub mod error;
pub mod memory;
pub mod prompt;
