pub mod bounds;
pub mod config;
pub mod error;
pub mod model;
pub mod rescale;
pub mod server;
pub mod session;
pub mod types;
