pub mod raw;
pub mod record;
