pub mod config;
pub mod constants;
pub mod gateway;
pub mod lifecycle;
pub mod maze;
pub mod protocol;
pub mod rng;
pub mod types;
pub mod world;
