pub mod config;
pub mod data;
pub mod export;
pub mod interaction;
pub mod projection;
pub mod render;
pub mod scale;
pub mod server;
pub mod topology;
pub mod types;
