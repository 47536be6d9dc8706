pub mod render;
pub mod text;

pub use render::{FrameStats, PhaseRenderer, Renderer, ScreenView, SkiaRenderer};
