//! Parsing options and configuration.

/// Options for parsing PDF documents.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Error handling mode
    pub error_mode: ErrorMode,

    /// Maximum structure elements visited when collecting tags
    pub max_struct_nodes: usize,

    /// Maximum nodes visited when inspecting content binding
    pub max_binding_nodes: usize,

    /// Maximum outline entries visited
    pub max_outline_nodes: usize,

    /// Maximum images recorded per page
    pub max_images_per_page: usize,

    /// Whether to apply an embedded remediation manifest
    pub decode_manifest: bool,
}

impl ParseOptions {
    /// Create new parse options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set error mode.
    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    /// Enable lenient mode (skip pages whose content cannot be read).
    pub fn lenient(mut self) -> Self {
        self.error_mode = ErrorMode::Lenient;
        self
    }

    /// Set the structure traversal cap.
    pub fn with_max_struct_nodes(mut self, max: usize) -> Self {
        self.max_struct_nodes = max;
        self
    }

    /// Ignore any embedded manifest and report only what the object graph shows.
    pub fn without_manifest(mut self) -> Self {
        self.decode_manifest = false;
        self
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            error_mode: ErrorMode::Lenient,
            max_struct_nodes: 20_000,
            max_binding_nodes: 50_000,
            max_outline_nodes: 20_000,
            max_images_per_page: 5_000,
            decode_manifest: true,
        }
    }
}

/// Error handling mode during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Fail on any page error
    Strict,
    /// Skip invalid page content and continue
    #[default]
    Lenient,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options_builder() {
        let options = ParseOptions::new()
            .with_error_mode(ErrorMode::Strict)
            .with_max_struct_nodes(10)
            .without_manifest();

        assert_eq!(options.error_mode, ErrorMode::Strict);
        assert_eq!(options.max_struct_nodes, 10);
        assert!(!options.decode_manifest);
    }

    #[test]
    fn test_default_options() {
        let options = ParseOptions::default();
        assert_eq!(options.error_mode, ErrorMode::Lenient);
        assert_eq!(options.max_binding_nodes, 50_000);
        assert!(options.decode_manifest);
    }
}
