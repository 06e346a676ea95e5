pub mod helper;
pub mod vm;

pub use vm::exception::{Exception, ExceptionKind};
pub use vm::vm::{VmArgs, VM};
