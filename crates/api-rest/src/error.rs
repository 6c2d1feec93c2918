//! Responses written on the recovery path

use axum::body::Body;
use http::{header, HeaderValue, Response, StatusCode};

/// Body of the default recovery response
pub const INTERNAL_SERVER_ERROR_BODY: &str = "Internal Server Error\n";

const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

/// The fixed 500 response sent when a handler panics.
///
/// ```rust
/// use panic_recovery_http::error::internal_server_error;
///
/// let response = internal_server_error();
/// assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
/// ```
pub fn internal_server_error() -> Response<Body> {
    let mut response = Response::new(Body::from(INTERNAL_SERVER_ERROR_BODY));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN_UTF8));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_server_error_headers() {
        let response = internal_server_error();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }
}
