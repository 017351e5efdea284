pub mod config;
pub mod kangaroo;
pub mod messages;
pub mod runtime;
