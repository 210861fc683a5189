pub mod catalog;
pub mod config;
pub mod locator;
pub mod platform;
pub mod protocol;
