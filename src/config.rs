use serde::{Deserialize, Serialize};

/// Settings the client sends under the `nevod` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    pub formatting: FormattingConfiguration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormattingConfiguration {
    /// Put the `{` after `@where` on its own line.
    pub place_open_brace_on_new_line: bool,
}

impl Configuration {
    /// Reads the `nevod` section out of `workspace/didChangeConfiguration`
    /// settings. Missing or malformed sections fall back to defaults.
    pub fn from_settings(settings: &serde_json::Value) -> Self {
        let section = settings.get("nevod").unwrap_or(settings);
        serde_json::from_value(section.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattingOptions {
    pub tab_size: u32,
    pub insert_spaces: bool,
    /// Line break to insert. Detected from the document when absent.
    pub new_line: Option<String>,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            tab_size: 4,
            insert_spaces: true,
            new_line: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_configuration_from_settings() {
        let settings = json!({ "nevod": { "formatting": { "placeOpenBraceOnNewLine": true } } });
        let configuration = Configuration::from_settings(&settings);
        assert!(configuration.formatting.place_open_brace_on_new_line);
    }

    #[test]
    fn test_configuration_defaults() {
        assert_eq!(Configuration::from_settings(&json!({})), Configuration::default());
        assert_eq!(Configuration::from_settings(&json!({ "nevod": 42 })), Configuration::default());
        let unsectioned = json!({ "formatting": { "placeOpenBraceOnNewLine": true } });
        assert!(Configuration::from_settings(&unsectioned).formatting.place_open_brace_on_new_line);
    }
}
