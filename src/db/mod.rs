mod filter;
mod repository;
mod schema;
mod secrets;

pub use repository::{new_record_id, Repository};
pub use secrets::SecretRepository;
