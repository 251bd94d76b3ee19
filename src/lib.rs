pub mod app;
pub mod config;
pub mod diffusion;
pub mod ollama;
pub mod state;
pub mod ui;
