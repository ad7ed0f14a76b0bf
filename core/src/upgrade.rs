use crate::error::ParseError;
use std::fmt;

const NAME_TOKEN: usize = 2;
const HEIGHT_TOKEN: usize = 5;

/// An announced upgrade: which binary to switch to and at which height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeInfo {
    pub name: String,
    pub height: u64,
    pub version: String,
}

impl UpgradeInfo {
    /// Parses the payload of an `upgrade.action` event attribute.
    ///
    /// Explicit `name=`, `version=` and `height=` fields are preferred when
    /// present. Otherwise the positional form is used: the third
    /// whitespace-separated token is both name and version, the sixth
    /// (with a trailing `]` stripped) is the height.
    pub fn parse(payload: &str) -> Result<Self, ParseError> {
        let tokens: Vec<&str> = payload.split_whitespace().collect();

        if tokens.iter().any(|t| t.contains('=')) {
            return Self::parse_fields(payload, &tokens);
        }

        if tokens.len() <= HEIGHT_TOKEN {
            return Err(ParseError::TooFewTokens {
                payload: payload.to_string(),
                found: tokens.len(),
                expected: HEIGHT_TOKEN + 1,
            });
        }

        let name = tokens[NAME_TOKEN].to_string();
        let height = parse_height(tokens[HEIGHT_TOKEN])?;

        Ok(Self {
            version: name.clone(),
            name,
            height,
        })
    }

    fn parse_fields(payload: &str, tokens: &[&str]) -> Result<Self, ParseError> {
        let field = |key: &str| {
            tokens.iter().find_map(|t| {
                let (k, v) = t.split_once('=')?;
                (k.eq_ignore_ascii_case(key) && !v.is_empty()).then_some(v)
            })
        };

        let version = field("version");
        let name = field("name").or(version).ok_or_else(|| ParseError::MissingField {
            payload: payload.to_string(),
            field: "name",
        })?;
        let height = field("height").ok_or_else(|| ParseError::MissingField {
            payload: payload.to_string(),
            field: "height",
        })?;

        Ok(Self {
            name: name.to_string(),
            height: parse_height(height)?,
            version: version.unwrap_or(name).to_string(),
        })
    }
}

impl fmt::Display for UpgradeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (version {}) at height {}", self.name, self.version, self.height)
    }
}

fn parse_height(token: &str) -> Result<u64, ParseError> {
    let trimmed = token.trim_end_matches(']').trim_end_matches(',');
    trimmed.parse::<u64>().map_err(|_| ParseError::InvalidHeight {
        value: token.to_string(),
    })
}
