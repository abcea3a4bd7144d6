pub mod error;
pub mod loader;
pub mod settings;

pub use settings::{
    configuration::{Configuration, OperationMode},
    csv_options::CsvOptions,
    value_def::ValueDefinition,
};
