pub mod class;
pub mod class_loader;
pub mod exception;
pub mod jit;
pub mod verify;
pub mod vm;
