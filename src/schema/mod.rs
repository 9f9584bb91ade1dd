pub mod message;
pub mod platform;
pub mod rules;
