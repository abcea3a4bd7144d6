pub mod configuration;
pub mod csv_options;
pub mod validator;
pub mod value_def;
