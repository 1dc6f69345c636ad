mod error;
pub use error::*;

#[allow(clippy::module_inception)]
mod gateway;
pub use gateway::*;

mod response;
pub use response::*;

mod scripted;
pub use scripted::*;
