pub mod errors;
pub mod router;

pub use errors::NetworkError;
pub use router::{Egress, ProxyRouter, RouteRule};
