//! The accepted request verb set.

use std::fmt;

/// HTTP request verbs this framework accepts. Anything else on the request
/// line is answered with `405 Method Not Allowed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Head,
    Put,
    Delete,
    Trace,
    Connect,
    Options,
}

impl Verb {
    /// Parse a request-line token. Case-sensitive, as the wire format is.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "HEAD" => Some(Self::Head),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "TRACE" => Some(Self::Trace),
            "CONNECT" => Some(Self::Connect),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Head => "HEAD",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_verb() {
        for verb in [
            Verb::Get,
            Verb::Post,
            Verb::Head,
            Verb::Put,
            Verb::Delete,
            Verb::Trace,
            Verb::Connect,
            Verb::Options,
        ] {
            assert_eq!(Verb::parse(verb.as_str()), Some(verb));
        }
    }

    #[test]
    fn rejects_unknown_and_lowercase() {
        assert_eq!(Verb::parse("FOO"), None);
        assert_eq!(Verb::parse("get"), None);
        assert_eq!(Verb::parse(""), None);
    }
}
