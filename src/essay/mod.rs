mod providers;
mod service;

pub use providers::Providers;
pub use service::EssayService;
#[cfg(test)]
pub use service::COLLECTION;
