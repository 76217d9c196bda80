pub mod token;
pub mod chat;

pub use token::*;
pub use chat::*;
