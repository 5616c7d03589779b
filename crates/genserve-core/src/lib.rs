pub mod config;
pub mod error;
pub mod handler;
pub mod specialize;
pub mod state;

pub use config::{BadShapePolicy, ConfigError, ServerConfig};
pub use error::{LoadFailure, SpecializeError};
pub use handler::{Handler, HandlerRequest, HandlerResponse, LoadedHandler};
pub use specialize::{Ack, CodeLoader, SpecializationRequest, Specializer, PROVISIONED_ENTRY_POINT};
pub use state::{ContainerState, HandlerCell};
