//! HTTP status codes and their descriptions.

use std::fmt;

/// An HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HttpStatus(pub u16);

impl HttpStatus {
    pub const OK: Self = Self(200);
    pub const NO_CONTENT: Self = Self(204);
    pub const BAD_REQUEST: Self = Self(400);
    pub const FORBIDDEN: Self = Self(403);
    pub const NOT_FOUND: Self = Self(404);
    pub const METHOD_NOT_ALLOWED: Self = Self(405);
    pub const REQUEST_TOO_LARGE: Self = Self(413);
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);
    pub const SERVICE_UNAVAILABLE: Self = Self(503);
    pub const VERSION_NOT_SUPPORTED: Self = Self(505);

    pub fn is_success(self) -> bool {
        self.0 / 100 == 2
    }

    /// Short description used on the status line.
    pub fn reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            413 => "Request Too Large",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            505 => "HTTP Version Not Supported",
            _ => "Unknown",
        }
    }

    /// Longer description used in the synthesized error page body.
    pub fn detail(self) -> &'static str {
        match self.0 {
            400 => "The request could not be understood by the server.",
            401 => "The request requires user authentication.",
            403 => "The server refuses to fulfill the request.",
            404 => "The requested resource was not found on this server.",
            405 => "The request verb is not allowed for this resource.",
            413 => "The request exceeds the size the server is willing to process.",
            500 => "The server encountered an unexpected condition.",
            503 => "The server is temporarily unable to handle the request.",
            505 => "The HTTP version used in the request is not supported.",
            _ => "No further information is available.",
        }
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_detection() {
        assert!(HttpStatus::OK.is_success());
        assert!(HttpStatus(299).is_success());
        assert!(!HttpStatus::NOT_FOUND.is_success());
        assert!(!HttpStatus(301).is_success());
    }

    #[test]
    fn display_includes_reason() {
        assert_eq!(HttpStatus::NOT_FOUND.to_string(), "404 Not Found");
        assert_eq!(
            HttpStatus::VERSION_NOT_SUPPORTED.to_string(),
            "505 HTTP Version Not Supported"
        );
    }
}
