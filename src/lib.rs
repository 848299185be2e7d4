pub mod cgi;
pub mod client;
pub mod query;
