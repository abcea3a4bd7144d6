pub mod connection;
pub mod dialect;
pub mod error;
pub mod generator;
pub mod statement;
