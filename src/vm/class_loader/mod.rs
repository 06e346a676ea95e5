pub mod access;
pub mod array;
pub mod bootstrap;
pub mod constraints;
pub mod init;
pub mod resolve;
