mod error;
pub use error::*;

mod index;
pub use index::*;
