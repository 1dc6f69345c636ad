mod breaker;
pub use breaker::*;

mod capability;
pub use capability::*;

mod checker;
pub use checker::*;

mod intent;
pub use intent::*;

mod rewrite;
pub use rewrite::*;
