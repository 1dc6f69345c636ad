mod message_role;
pub use message_role::*;

pub mod messages;
pub use messages::*;

mod tool_call;
pub use tool_call::*;

mod tool_definition;
pub use tool_definition::*;

mod step;
pub use step::*;

mod context;
pub use context::*;
