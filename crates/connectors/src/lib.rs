pub mod factory;
pub mod file;
pub mod sql;
