pub mod email_filter;
pub mod geo;
pub mod token_store;
