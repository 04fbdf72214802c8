pub mod render;

pub use render::FlickerRenderer;
