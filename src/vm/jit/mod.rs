pub mod code;
pub mod codegen;
pub mod instructions;
pub mod method_tree;
pub mod patcher;
