pub mod color_classifier;
pub mod compositor;
pub mod detection;
pub mod glyphs;
pub mod heatmap;
pub mod hsv;
pub mod projector;
