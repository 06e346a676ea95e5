pub mod access;
pub mod class;
pub mod constant_pool;
pub mod definition;
pub mod field;
pub mod method;
pub mod name_parsers;
