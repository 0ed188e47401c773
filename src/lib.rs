pub mod adapters;
pub mod config;
pub mod errors;
pub mod ports;
pub mod review;

#[cfg(test)]
mod testing;
