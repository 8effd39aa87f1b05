pub mod reddit;
pub mod source;
pub mod trends;
pub mod twitter;
pub mod types;
pub mod youtube;
