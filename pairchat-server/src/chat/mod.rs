pub mod api;
pub mod ws;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct OptionalTokenQuery {
    pub token: Option<String>,
}
