pub mod action;
pub mod agent;
pub mod cli;
pub mod driver;
pub mod snapshot;
pub mod trace;
