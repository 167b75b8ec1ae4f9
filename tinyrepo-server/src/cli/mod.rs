pub mod pull;
pub mod token;
