pub mod bytecode;
pub mod compiler;
pub mod diagnostic;
pub mod reader;
pub mod session;
pub mod value;
pub mod vm;

pub use compiler::compile;
pub use session::{Error, Session};
pub use value::Value;
