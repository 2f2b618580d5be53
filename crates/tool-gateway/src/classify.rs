// crates/tool-gateway/src/classify.rs
// ============================================================================
// Module: Tool Classifier
// Description: Read/write classification of tool names.
// Purpose: Select the rate-limit class applied to a tool call.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Tool names are classified by a closed, hardcoded rule set. Catalog
//! lookups, topology and agent descriptions, and policy computations are
//! reads; every other tool is a write. The same prefixes drive fixed-target
//! routing in [`crate::routing`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix of catalog lookup tools.
pub(crate) const CATALOG_PREFIX: &str = "catalog.";
/// Prefix of policy computation tools.
pub(crate) const POLICY_PREFIX: &str = "policy.";
/// Individually named tools served by the catalog target.
pub(crate) const CATALOG_TOOLS: &[&str] = &["process.topology", "agents.describe"];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Rate-limit class of a tool call.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolClass {
    /// Side-effect free lookup.
    Read,
    /// Any other call.
    Write,
}

impl ToolClass {
    /// Returns a stable label for the class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// Per-class rate ceilings, in admitted calls per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassLimits {
    /// Ceiling for read-class calls.
    pub read: u32,
    /// Ceiling for write-class calls.
    pub write: u32,
}

impl ClassLimits {
    /// Returns the ceiling configured for `class`.
    #[must_use]
    pub const fn limit_for(&self, class: ToolClass) -> u32 {
        match class {
            ToolClass::Read => self.read,
            ToolClass::Write => self.write,
        }
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Classifies a tool name as read or write.
#[must_use]
pub fn classify(tool: &str) -> ToolClass {
    if is_catalog_tool(tool) || is_policy_tool(tool) {
        ToolClass::Read
    } else {
        ToolClass::Write
    }
}

/// Returns true when the tool is served by the catalog target.
pub(crate) fn is_catalog_tool(tool: &str) -> bool {
    tool.starts_with(CATALOG_PREFIX) || CATALOG_TOOLS.contains(&tool)
}

/// Returns true when the tool is served by the policy target.
pub(crate) fn is_policy_tool(tool: &str) -> bool {
    tool.starts_with(POLICY_PREFIX)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_tools_are_reads() {
        for tool in [
            "catalog.search_processes",
            "catalog.",
            "process.topology",
            "agents.describe",
            "policy.per_diem_amount",
        ] {
            assert_eq!(classify(tool), ToolClass::Read, "{tool}");
        }
    }

    #[test]
    fn everything_else_is_a_write() {
        for tool in [
            "payhawk.create_expense",
            "process.topology.extra",
            "agents.describe_all",
            "catalog",
            "policy",
            "Catalog.search",
            "",
        ] {
            assert_eq!(classify(tool), ToolClass::Write, "{tool}");
        }
    }

    #[test]
    fn limits_follow_class() {
        let limits = ClassLimits { read: 60, write: 30 };
        assert_eq!(limits.limit_for(ToolClass::Read), 60);
        assert_eq!(limits.limit_for(ToolClass::Write), 30);
        assert_eq!(ToolClass::Write.as_str(), "write");
    }
}
