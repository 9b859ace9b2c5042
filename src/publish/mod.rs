pub mod publisher;

pub use publisher::{PublishError, Publisher};
