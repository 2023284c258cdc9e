use serde::{Deserialize, Serialize};

/// Immutable configuration for one capture run, held by reference for the
/// Coordinator's whole lifetime.
///
/// Loading this from a CLI or a file is an application-level concern left
/// to the embedding binary; this type only needs to be serde-compatible
/// so that binary can hand one in without this crate depending on `clap`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub worker_count: usize,
    pub interface: String,
    memory_fraction: f64,
    pub user: Option<String>,
    pub output_dir: Option<String>,
    pub rotate: bool,
    pub loop_count: u32,
    pub pstreak_threshold: u32,
}

const DEFAULT_MEMORY_FRACTION: f64 = 0.01;

impl Config {
    pub fn new(interface: impl Into<String>, worker_count: usize) -> Self {
        Self {
            worker_count,
            interface: interface.into(),
            memory_fraction: DEFAULT_MEMORY_FRACTION,
            user: None,
            output_dir: None,
            rotate: false,
            loop_count: 1,
            pstreak_threshold: 2,
        }
    }

    /// Fraction of system memory to budget for ring buffers, clamped to
    /// `[0.0, 1.0]` regardless of what was passed in.
    pub fn memory_fraction(&self) -> f64 {
        self.memory_fraction
    }

    pub fn with_memory_fraction(mut self, fraction: f64) -> Self {
        self.memory_fraction = fraction.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_fraction_is_clamped_on_construction() {
        let cfg = Config::new("eth0", 4).with_memory_fraction(5.0);
        assert_eq!(cfg.memory_fraction(), 1.0);
        let cfg = Config::new("eth0", 4).with_memory_fraction(-1.0);
        assert_eq!(cfg.memory_fraction(), 0.0);
    }

    #[test]
    fn default_memory_fraction_is_one_percent() {
        let cfg = Config::new("eth0", 4);
        assert_eq!(cfg.memory_fraction(), 0.01);
    }
}
