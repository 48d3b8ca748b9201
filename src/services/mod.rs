pub mod core;
pub mod monitor;
pub mod responder;
