pub mod client;
pub mod config;
pub mod messages;
pub mod motion;
pub mod runtime;
pub mod service;
pub mod sim;
pub mod transform;
