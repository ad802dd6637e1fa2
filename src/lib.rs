pub mod config;
pub mod converter;
pub mod error;
pub mod logger;
pub mod render;
pub mod sampler;
pub mod substitution;
pub mod xml;
