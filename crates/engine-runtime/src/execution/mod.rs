pub mod importer;
pub mod reader;
pub mod summary;
pub mod worker;
