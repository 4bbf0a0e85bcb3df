pub mod table_client;

pub use table_client::{RestError, RestTableClient};
