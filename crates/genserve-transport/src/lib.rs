pub mod dispatcher;
pub mod error;
pub mod routes;
pub mod server;
pub mod specialize;

pub use error::TransportError;
pub use routes::{Route, Router};
pub use server::GenericServer;
pub use specialize::FunctionLoadRequest;
