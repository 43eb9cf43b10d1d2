//! Credential-bearing connection strings.
//!
//! A [`ConnectionString`] never prints its raw contents. `Debug` and `Display` both render
//! the masked target (everything after the last `@`), so it is safe to hand to `tracing`.
//!
//! Options are located the way the driver reads them: the URI query starts at the first `?`
//! after the authority, and keyword/value pairs may have whitespace around `=` and
//! single-quoted values. Keys match exactly.

use std::fmt;
use std::ops::Range;

/// Key/value pair appended when a connection string does not choose a TLS mode.
pub const TRANSPORT_SECURITY_OPTION: &str = "sslmode=require";

const SSLMODE_KEY: &str = "sslmode";
const UNCLEAR_FORMAT: &str = "URL set but format unclear";

/// libpq `sslmode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "disable" => Some(Self::Disable),
            "allow" => Some(Self::Allow),
            "prefer" => Some(Self::Prefer),
            "require" => Some(Self::Require),
            "verify-ca" => Some(Self::VerifyCa),
            "verify-full" => Some(Self::VerifyFull),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Allow => "allow",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }

    /// The closest mode `tokio-postgres` itself understands. Certificate checks for the
    /// verifying modes are done by the TLS connector instead.
    #[must_use]
    pub fn driver_mode(self) -> Self {
        match self {
            Self::Allow => Self::Prefer,
            Self::VerifyCa | Self::VerifyFull => Self::Require,
            other => other,
        }
    }

    #[must_use]
    pub fn verifies_certificate(self) -> bool {
        matches!(self, Self::VerifyCa | Self::VerifyFull)
    }

    #[must_use]
    pub fn verifies_host_name(self) -> bool {
        self == Self::VerifyFull
    }
}

/// Byte ranges of one `key=value` option inside the raw string.
struct OptionSpan {
    key: Range<usize>,
    value: Range<usize>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString(String);

impl ConnectionString {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw string, credentials included. Only the connector should call this.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Host/port/database portion for diagnostics.
    #[must_use]
    pub fn masked_target(&self) -> &str {
        match self.0.rsplit_once('@') {
            Some((_, target)) => target,
            None => UNCLEAR_FORMAT,
        }
    }

    /// Scrub credentials out of `text` (typically a driver error message).
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        if let Some((prefix, _)) = self.0.rsplit_once('@') {
            out = out.replace(prefix, "...");
            let userinfo = prefix.split_once("://").map_or(prefix, |(_, u)| u);
            if let Some((_, password)) = userinfo.split_once(':') {
                if !password.is_empty() {
                    out = out.replace(password, "***");
                }
            }
        }
        if let Some(password) = self.option("password") {
            if !password.is_empty() {
                out = out.replace(password, "***");
            }
        }
        out
    }

    #[must_use]
    pub fn is_uri(&self) -> bool {
        self.0.starts_with("postgres://") || self.0.starts_with("postgresql://")
    }

    /// Value of option `key`. When it is given more than once the last one wins, as in
    /// the driver.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.option_spans()
            .into_iter()
            .rev()
            .find(|span| &self.0[span.key.clone()] == key)
            .map(|span| &self.0[span.value])
    }

    /// The `sslmode` the string asks for, if it names a known one.
    #[must_use]
    pub fn ssl_mode(&self) -> Option<SslMode> {
        self.option(SSLMODE_KEY).and_then(SslMode::parse)
    }

    /// Whether an `sslmode` option is already present.
    #[must_use]
    pub fn has_transport_security(&self) -> bool {
        self.option(SSLMODE_KEY).is_some()
    }

    /// Return a copy carrying [`TRANSPORT_SECURITY_OPTION`], appending it only if no
    /// `sslmode` is set. Applying this twice yields the same string as applying it once.
    #[must_use]
    pub fn with_transport_security(&self) -> Self {
        if self.has_transport_security() {
            return self.clone();
        }
        self.with_option(SSLMODE_KEY, SslMode::Require.as_str())
    }

    /// Return a copy with option `key` set to `value`, replacing the effective value if the
    /// key is present and appending it otherwise.
    #[must_use]
    pub fn with_option(&self, key: &str, value: &str) -> Self {
        let existing = self
            .option_spans()
            .into_iter()
            .rev()
            .find(|span| &self.0[span.key.clone()] == key);
        if let Some(span) = existing {
            let mut raw = self.0.clone();
            raw.replace_range(span.value, value);
            return Self(raw);
        }

        let mut raw = self.0.clone();
        if self.is_uri() {
            let separator = match self.uri_query_start() {
                None => "?",
                Some(_) if raw.ends_with('?') || raw.ends_with('&') => "",
                Some(_) => "&",
            };
            raw.push_str(separator);
        } else if !raw.is_empty() && !raw.ends_with(char::is_whitespace) {
            raw.push(' ');
        }
        raw.push_str(key);
        raw.push('=');
        raw.push_str(value);
        Self(raw)
    }

    /// Index of the `?` opening the URI query. The authority ends at the first `/` or `?`
    /// after the scheme, so `@`, `/` and `?` inside option values do not move it.
    fn uri_query_start(&self) -> Option<usize> {
        let authority_start = self.0.find("://")? + 3;
        let rest = &self.0[authority_start..];
        let authority_end = rest.find(|c: char| c == '/' || c == '?').unwrap_or(rest.len());
        rest[authority_end..]
            .find('?')
            .map(|q| authority_start + authority_end + q)
    }

    fn option_spans(&self) -> Vec<OptionSpan> {
        if self.is_uri() {
            self.uri_option_spans()
        } else {
            self.keyword_option_spans()
        }
    }

    fn uri_option_spans(&self) -> Vec<OptionSpan> {
        let Some(query_start) = self.uri_query_start() else {
            return Vec::new();
        };
        let mut spans = Vec::new();
        let mut start = query_start + 1;
        for pair in self.0[start..].split('&') {
            let end = start + pair.len();
            if let Some(eq) = pair.find('=') {
                spans.push(OptionSpan {
                    key: start..start + eq,
                    value: start + eq + 1..end,
                });
            }
            start = end + 1;
        }
        spans
    }

    /// `key = value` pairs; values may be single-quoted with backslash escapes. Parsing
    /// stops at the first malformed pair, where the driver would reject the string anyway.
    fn keyword_option_spans(&self) -> Vec<OptionSpan> {
        let bytes = self.0.as_bytes();
        let len = bytes.len();
        let skip_whitespace = |mut i: usize| {
            while i < len && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            i
        };

        let mut spans = Vec::new();
        let mut i = skip_whitespace(0);
        while i < len {
            let key_start = i;
            while i < len && !bytes[i].is_ascii_whitespace() && bytes[i] != b'=' {
                i += 1;
            }
            let key = key_start..i;
            i = skip_whitespace(i);
            if i >= len || bytes[i] != b'=' {
                break;
            }
            i = skip_whitespace(i + 1);

            let value = if i < len && bytes[i] == b'\'' {
                i += 1;
                let value_start = i;
                while i < len && bytes[i] != b'\'' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                let value_end = i.min(len);
                i = (i + 1).min(len);
                value_start..value_end
            } else {
                let value_start = i;
                while i < len && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                value_start..i
            };
            spans.push(OptionSpan { key, value });
            i = skip_whitespace(i);
        }
        spans
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "...@{}", self.masked_target())
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionString")
            .field(&self.masked_target())
            .finish()
    }
}
