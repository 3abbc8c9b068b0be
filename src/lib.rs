//! xbot library exports for testing

pub mod api;
pub mod core;
pub mod stream;

#[cfg(test)]
pub mod test_support;
