//! Configurable limits governing VM execution.

use crate::error::{VmError, VmResult};
use serde::{Deserialize, Serialize};

/// Restrictions on the VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionEngineLimits {
    /// The maximum number of live items (stack slots, context variables and
    /// everything reachable from them) the engine admits.
    pub max_live_items: usize,

    /// Number of executed instructions between two collection checkpoints.
    ///
    /// The value is a protocol parameter; every node validating the same
    /// transaction must use the same interval.
    pub collection_interval: u32,
}

impl ExecutionEngineLimits {
    /// The default execution engine limits (Neo `MaxStackSize`, collect every instruction).
    pub const DEFAULT: Self = Self {
        max_live_items: 2048,
        collection_interval: 1,
    };

    /// Parses limits from a TOML table. Missing keys fall back to [`Self::DEFAULT`].
    pub fn from_toml_str(source: &str) -> VmResult<Self> {
        let limits: Self = toml::from_str(source)
            .map_err(|err| VmError::invalid_configuration_msg(err.to_string()))?;
        limits.validate()?;
        Ok(limits)
    }

    /// Rejects limits the engine cannot run with.
    pub fn validate(&self) -> VmResult<()> {
        if self.max_live_items == 0 {
            return Err(VmError::invalid_configuration_msg(
                "max_live_items must be greater than zero",
            ));
        }
        if self.collection_interval == 0 {
            return Err(VmError::invalid_configuration_msg(
                "collection_interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for ExecutionEngineLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}
