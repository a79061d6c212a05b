use crate::domain::ports::CharsetResolver;
use crate::utils::error::{RefreshError, Result};
use encoding_rs::{Encoding, UTF_8};

/// Picks the `charset` parameter of a `Content-Type` header, falling back to
/// a fixed default when the header is absent or names an unknown charset.
#[derive(Debug, Clone, Copy)]
pub struct HeaderCharsetResolver {
    default: &'static Encoding,
}

impl HeaderCharsetResolver {
    pub fn new(default: &'static Encoding) -> Self {
        Self { default }
    }

    pub fn from_label(label: &str) -> Result<Self> {
        Encoding::for_label(label.trim().as_bytes())
            .map(Self::new)
            .ok_or_else(|| RefreshError::InvalidConfigValue {
                field: "http.default_charset".to_string(),
                value: label.to_string(),
                reason: "Unknown character set".to_string(),
            })
    }

    pub fn default_encoding(&self) -> &'static Encoding {
        self.default
    }
}

impl Default for HeaderCharsetResolver {
    fn default() -> Self {
        Self::new(UTF_8)
    }
}

impl CharsetResolver for HeaderCharsetResolver {
    fn resolve(&self, content_type: Option<&str>) -> &'static Encoding {
        content_type
            .and_then(charset_param)
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(self.default)
    }
}

fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"'))
        } else {
            None
        }
    })
}
