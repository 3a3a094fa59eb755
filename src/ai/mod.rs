mod image;
mod speech;

pub use image::ImageClient;
pub use speech::SpeechClient;
