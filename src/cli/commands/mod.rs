pub mod resources;
pub mod seed;
pub mod token;
