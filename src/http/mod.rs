pub mod http_connection;
pub mod request;
pub mod response;

pub use http_connection::{Connection, ReadOutcome};
pub use request::{HttpRequest, ParseContext, ParseOutcome, ParseState};
pub use response::HttpResponse;
