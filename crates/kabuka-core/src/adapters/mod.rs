mod kabutan;
mod stooq;

pub use kabutan::KabutanAdapter;
pub use stooq::StooqAdapter;

use crate::http_client::HttpError;
use crate::SourceError;

fn transport_error(source: &str, error: &HttpError) -> SourceError {
    let message = format!("{source} transport error: {}", error.message());
    if error.retryable() {
        SourceError::unavailable(message)
    } else {
        SourceError::invalid_request(message)
    }
}

fn status_error(source: &str, status: u16) -> SourceError {
    let message = format!("{source} upstream returned status {status}");
    if status == 404 {
        SourceError::not_found(message)
    } else {
        SourceError::unavailable(message)
    }
}
