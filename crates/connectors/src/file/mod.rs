pub mod csv;
pub mod input;
