pub mod base;
pub mod bedrock;
pub mod configs;
pub mod sigv4;
pub mod utils;

#[cfg(test)]
pub mod mock;
