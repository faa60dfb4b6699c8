pub mod lead;
pub mod quote_request;
