mod essay;
mod secret;

pub use essay::*;
pub use secret::*;
