use std::fmt::Display;

/// Runtime mode read from `APP_ENV`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Stage {
    /// Deployed inside a container; the local override file is never read.
    Container,
    Development,
    Production,
    Other(String),
    #[default]
    Unset,
}

impl Stage {
    pub fn is_container(&self) -> bool {
        matches!(self, Stage::Container)
    }

    /// Error bodies carry full detail only in this mode.
    pub fn is_development(&self) -> bool {
        matches!(self, Stage::Development)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Stage::Container => "container",
            Stage::Development => "development",
            Stage::Production => "production",
            Stage::Other(raw) => raw.as_str(),
            Stage::Unset => "",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<Option<&str>> for Stage {
    fn from(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Stage::Unset,
            Some("container") => Stage::Container,
            Some("development") => Stage::Development,
            Some("production") => Stage::Production,
            Some(other) => Stage::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_stages() {
        assert_eq!(Stage::from(Some("container")), Stage::Container);
        assert_eq!(Stage::from(Some("development")), Stage::Development);
        assert_eq!(Stage::from(Some("production")), Stage::Production);
    }

    #[test]
    fn unknown_and_missing_values_are_preserved() {
        assert_eq!(Stage::from(Some("staging")), Stage::Other("staging".to_string()));
        assert_eq!(Stage::from(None), Stage::Unset);
        assert_eq!(Stage::from(Some("  ")), Stage::Unset);
        assert_eq!(Stage::Unset.as_str(), "");
    }
}
