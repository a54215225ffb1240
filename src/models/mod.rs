pub mod api;
pub mod environment;
pub mod exchange;
pub mod execution;
pub mod test_case;
pub mod variable;

pub use api::*;
pub use environment::*;
pub use exchange::*;
pub use execution::*;
pub use test_case::*;
pub use variable::*;
