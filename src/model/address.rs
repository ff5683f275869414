//! Minimal email address parsing (RFC 5322 §3.4) for sender statistics.
//!
//! Stored records keep header values verbatim; this is only used when
//! grouping or displaying senders.

/// A parsed email address.
///
/// - `"Juan García <juan@ejemplo.com>"` → `display_name = "Juan García"`, `address = "juan@ejemplo.com"`
/// - `"user@example.com"` → `display_name = ""`, `address = "user@example.com"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress {
    pub display_name: String,
    pub address: String,
}

impl EmailAddress {
    /// Parse a single address; unrecognised input is kept whole as `address`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                return Self {
                    display_name: strip_quotes(&trimmed[..open]),
                    address: trimmed[open + 1..close].trim().to_string(),
                };
            }
        }

        Self {
            display_name: String::new(),
            address: trimmed.to_string(),
        }
    }

    /// Lower-cased bare address, used to group messages by sender.
    pub fn normalized(&self) -> String {
        self.address.to_lowercase()
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.display_name.is_empty() {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} <{}>", self.display_name, self.address)
        }
    }
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_address() {
        let addr = EmailAddress::parse("user@example.com");
        assert_eq!(addr.address, "user@example.com");
        assert_eq!(addr.display_name, "");
    }

    #[test]
    fn test_parse_name_and_address() {
        let addr = EmailAddress::parse("User One <User1@Example.com>");
        assert_eq!(addr.display_name, "User One");
        assert_eq!(addr.normalized(), "user1@example.com");
    }

    #[test]
    fn test_parse_quoted_name() {
        let addr = EmailAddress::parse("\"Last, First\" <user@example.com>");
        assert_eq!(addr.display_name, "Last, First");
        assert_eq!(addr.to_string(), "Last, First <user@example.com>");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(EmailAddress::parse("  ").address, "");
    }
}
