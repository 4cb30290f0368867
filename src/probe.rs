// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Capability probe: which helper binaries exist on the target.

use std::collections::BTreeMap;

use crate::target::Target;

/// Tool name → present on PATH. Rebuilt on every run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolMap {
    tools: BTreeMap<String, bool>,
    order: Vec<String>,
}

impl ToolMap {
    pub fn insert(&mut self, name: &str, present: bool) {
        if self.tools.insert(name.to_string(), present).is_none() {
            self.order.push(name.to_string());
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.get(name).copied().unwrap_or(false)
    }

    /// Entries in probe order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.order
            .iter()
            .map(move |name| (name.as_str(), self.has(name)))
    }

    /// Names of the tools that were found, in probe order.
    pub fn present(&self) -> Vec<&str> {
        self.iter().filter(|(_, p)| *p).map(|(n, _)| n).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

/// Look up each candidate with `which`. Lookup errors count as "absent".
pub fn probe_tools(target: &dyn Target, candidates: &[&str]) -> ToolMap {
    crate::report::step("Checking available tools...");
    let mut map = ToolMap::default();
    for tool in candidates {
        let present = target.locate(tool);
        println!("  {} {}", if present { "✓" } else { "✗" }, tool);
        map.insert(tool, present);
    }
    tracing::debug!(
        "{} of {} tools present on {}",
        map.present().len(),
        map.len(),
        target.describe()
    );
    map
}
