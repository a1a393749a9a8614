//! Prompt rendering.

pub mod render;

pub use render::render;
