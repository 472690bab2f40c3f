pub mod cat;
pub mod config;
pub mod copy;
pub mod drain;
