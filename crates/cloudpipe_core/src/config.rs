use std::path::PathBuf;

pub const SCRATCH_DIR_ENV: &str = "CLOUDPIPE_SCRATCH_DIR";
pub const ASSUME_CLOUD_ENV: &str = "CLOUDPIPE_ASSUME_CLOUD";

/// Process-wide step settings, built once at startup and shared by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepConfig {
    /// Parent directory for per-invocation scratch roots. `None` uses the
    /// system temp directory.
    pub scratch_parent: Option<PathBuf>,
    /// Set when the process is running inside the cloud function runtime.
    pub in_cloud: bool,
    /// Use cloud storage even when not running in the cloud.
    pub assume_cloud: bool,
}

impl StepConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            scratch_parent: lookup(SCRATCH_DIR_ENV)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
            in_cloud: false,
            assume_cloud: lookup(ASSUME_CLOUD_ENV).is_some_and(|value| parse_flag(&value)),
        }
    }

    pub fn with_in_cloud(mut self, in_cloud: bool) -> Self {
        self.in_cloud = in_cloud;
        self
    }

    pub fn with_scratch_parent(mut self, parent: impl Into<PathBuf>) -> Self {
        self.scratch_parent = Some(parent.into());
        self
    }

    pub fn uses_cloud_storage(&self) -> bool {
        self.in_cloud || self.assume_cloud
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn reads_scratch_parent_and_assume_flag() {
        let vars = HashMap::from([
            (SCRATCH_DIR_ENV, " /mnt/scratch "),
            (ASSUME_CLOUD_ENV, "TRUE"),
        ]);
        let config = StepConfig::from_lookup(|name| vars.get(name).map(|value| value.to_string()));

        assert_eq!(config.scratch_parent, Some(PathBuf::from("/mnt/scratch")));
        assert!(config.assume_cloud);
        assert!(config.uses_cloud_storage());
    }

    #[test]
    fn defaults_to_local_execution() {
        let config = StepConfig::from_lookup(|_| None);
        assert_eq!(config, StepConfig::default());
        assert!(!config.uses_cloud_storage());
        assert!(config.with_in_cloud(true).uses_cloud_storage());
    }
}
