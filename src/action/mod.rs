pub mod action_model;
pub mod executor;
pub mod validator;
