use serde::Deserialize;

/// Limits and rendering switches for include compilation.
///
/// Missing keys fall back to the defaults, so a host can load a partial
/// JSON or TOML table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Maximum number of segments in one include path
    pub max_include_depth: usize,
    pub max_path_length: usize,
    pub max_segment_length: usize,
    /// Render `<alias>.<column> AS <alias>__<column>` instead of `<alias>.*`
    pub explicit_columns: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_include_depth: 5,
            max_path_length: 500,
            max_segment_length: 64,
            explicit_columns: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_options_keep_defaults() {
        let options: CompilerOptions =
            serde_json::from_str(r#"{ "max_include_depth": 3 }"#).expect("valid options");
        assert_eq!(options.max_include_depth, 3);
        assert_eq!(options.max_path_length, 500);
        assert_eq!(options.max_segment_length, 64);
        assert!(!options.explicit_columns);
    }
}
