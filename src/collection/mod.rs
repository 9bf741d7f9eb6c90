pub mod mutation;
pub mod store;

pub use mutation::{MutationDescriptor, MutationEngine, MutationError};
pub use store::{Collection, CollectionKey};
