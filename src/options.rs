//! Options for a compilation run.

/// Settings that control how [`TzdbCompiler`](crate::TzdbCompiler) runs.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Compile zones on the `rayon` thread pool.
    pub parallel: bool,
    /// Only compile these identifiers. A link alias selects its target zone.
    pub zones: Option<Vec<String>>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            zones: None,
        }
    }
}

impl CompilerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[must_use]
    pub fn with_zones<I, S>(mut self, zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.zones = Some(zones.into_iter().map(Into::into).collect());
        self
    }

    /// Returns whether the identifier was requested, either explicitly or
    /// because there is no allow-list.
    pub fn selects(&self, identifier: &str) -> bool {
        self.zones
            .as_ref()
            .is_none_or(|zones| zones.iter().any(|zone| zone == identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::CompilerOptions;

    #[test]
    fn defaults() {
        let options = CompilerOptions::default();
        assert!(options.parallel);
        assert!(options.selects("Europe/London"));
    }

    #[test]
    fn allow_list() {
        let options = CompilerOptions::new()
            .with_parallel(false)
            .with_zones(["America/New_York"]);
        assert!(!options.parallel);
        assert!(options.selects("America/New_York"));
        assert!(!options.selects("Europe/London"));
    }
}
