pub mod error;
pub mod image;
pub mod layers;
pub mod traits;

pub use error::{LayerError, LayerResult};
pub use image::MemoryImage;
pub use traits::{MemoryLayer, ShortRead};
