mod registry;
pub mod validation;

pub use registry::{NewRepository, NewUser, Registry};
