//! Index creation options.

use super::rtree_constants::{
    DEFAULT_MAX_NODE_CAPACITY, DEFAULT_MIN_FILL_RATIO, ENTRY_SIZE, MAX_ALLOWED_NODE_CAPACITY,
    MIN_ALLOWED_NODE_CAPACITY, NODE_HEADER_SIZE,
};
use super::rtree_types::{SpatialError, SpatialResult};

/// Node fan-out settings fixed when an index is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RTreeConfig {
    pub max_node_capacity: usize,
    pub min_node_capacity: usize,
}

impl Default for RTreeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NODE_CAPACITY)
    }
}

impl RTreeConfig {
    /// Config with the given maximum and the default minimum (40% of max).
    pub fn new(max_node_capacity: usize) -> Self {
        Self {
            max_node_capacity,
            min_node_capacity: default_min_capacity(max_node_capacity),
        }
    }

    pub fn with_min_node_capacity(mut self, min_node_capacity: usize) -> Self {
        self.min_node_capacity = min_node_capacity;
        self
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if self.max_node_capacity < MIN_ALLOWED_NODE_CAPACITY
            || self.max_node_capacity > MAX_ALLOWED_NODE_CAPACITY
        {
            return Err(SpatialError::InvalidConfig(format!(
                "max_node_capacity must be between {} and {}, got {}",
                MIN_ALLOWED_NODE_CAPACITY, MAX_ALLOWED_NODE_CAPACITY, self.max_node_capacity
            )));
        }
        if self.min_node_capacity > self.max_node_capacity / 2 {
            return Err(SpatialError::InvalidConfig(format!(
                "min_node_capacity must be at most half of max_node_capacity ({}), got {}",
                self.max_node_capacity / 2,
                self.min_node_capacity
            )));
        }
        Ok(())
    }

    /// Parses `CREATE INDEX ... WITH (...)` style options. Keys are matched
    /// case-insensitively; unknown keys are rejected.
    pub fn from_options<'a, I>(options: I) -> SpatialResult<Self>
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        let mut max = None;
        let mut min = None;
        for (key, value) in options {
            if value < 0 {
                return Err(SpatialError::InvalidConfig(format!(
                    "option '{}' must not be negative, got {}",
                    key, value
                )));
            }
            match key.to_ascii_lowercase().as_str() {
                "max_node_capacity" => max = Some(value as usize),
                "min_node_capacity" => min = Some(value as usize),
                _ => {
                    return Err(SpatialError::InvalidConfig(format!(
                        "unrecognized R-Tree option '{}'",
                        key
                    )))
                }
            }
        }

        let mut config = Self::new(max.unwrap_or(DEFAULT_MAX_NODE_CAPACITY));
        if let Some(min) = min {
            config.min_node_capacity = min;
        }
        config.validate()?;
        Ok(config)
    }

    /// Bytes occupied by one node page for this fan-out
    pub fn page_size(&self) -> usize {
        page_size_for(self.max_node_capacity)
    }
}

pub fn page_size_for(capacity: usize) -> usize {
    NODE_HEADER_SIZE + capacity * ENTRY_SIZE
}

fn default_min_capacity(max_node_capacity: usize) -> usize {
    (max_node_capacity as f64 * DEFAULT_MIN_FILL_RATIO) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RTreeConfig::default();
        assert_eq!(config.max_node_capacity, 64);
        assert_eq!(config.min_node_capacity, 25);
        assert!(config.validate().is_ok());
        assert_eq!(config.page_size(), 8 + 64 * 24);
    }

    #[test]
    fn test_capacity_bounds() {
        assert!(RTreeConfig::new(3).validate().is_err());
        assert!(RTreeConfig::new(4).validate().is_ok());
        assert!(RTreeConfig::new(255).validate().is_ok());
        assert!(RTreeConfig::new(256).validate().is_err());
    }

    #[test]
    fn test_min_capacity_at_most_half() {
        assert!(RTreeConfig::new(10).with_min_node_capacity(5).validate().is_ok());
        assert!(RTreeConfig::new(10).with_min_node_capacity(0).validate().is_ok());
        let err = RTreeConfig::new(10)
            .with_min_node_capacity(6)
            .validate()
            .unwrap_err();
        assert!(matches!(err, SpatialError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_options() {
        let config =
            RTreeConfig::from_options([("MAX_NODE_CAPACITY", 16), ("min_node_capacity", 4)])
                .unwrap();
        assert_eq!(config.max_node_capacity, 16);
        assert_eq!(config.min_node_capacity, 4);

        let config = RTreeConfig::from_options([("max_node_capacity", 100)]).unwrap();
        assert_eq!(config.min_node_capacity, 40);

        assert!(RTreeConfig::from_options(std::iter::empty()).is_ok());
    }

    #[test]
    fn test_from_options_rejects_bad_input() {
        assert!(RTreeConfig::from_options([("fanout", 16)]).is_err());
        assert!(RTreeConfig::from_options([("max_node_capacity", -1)]).is_err());
        assert!(RTreeConfig::from_options([("max_node_capacity", 1000)]).is_err());
        assert!(RTreeConfig::from_options([("min_node_capacity", 40)]).is_err());
    }
}
