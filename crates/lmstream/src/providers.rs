pub mod base;
pub mod configs;
pub mod control;
pub mod openai;
pub mod utils;

#[cfg(test)]
pub mod mock;
