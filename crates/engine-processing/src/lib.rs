pub mod error;
pub mod handler;
pub mod mediator;
pub mod partition;

#[cfg(test)]
mod test_support;
