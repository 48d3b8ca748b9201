pub mod probe;
pub mod resolver;
