//! Context aggregation barrier.
//!
//! Every dashboard widget owns one named section of the assistant's context.
//! A collection cycle starts with [`ContextBarrier::begin_cycle`]; widgets
//! report their text in any order, and the consolidated snapshot is produced
//! exactly once, when the last required section becomes non-empty. There is
//! no timeout: a cycle with a silent widget never emits.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

/// One consolidated context, sections in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSnapshot {
    pub cycle: u64,
    pub sections: Vec<(String, String)>,
}

impl ContextSnapshot {
    pub fn section(&self, name: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, text)| text.as_str())
    }

    /// Plain-text form handed to the assistant.
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(|(name, text)| format!("[{name}]\n{}", text.trim_end()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone)]
pub struct ContextBarrier {
    required: Vec<String>,
    slots: HashMap<String, String>,
    collecting: bool,
    emitted: bool,
    cycle: u64,
}

impl ContextBarrier {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        for name in required {
            let name = name.into();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Self {
            required: names,
            slots: HashMap::new(),
            collecting: false,
            emitted: false,
            cycle: 0,
        }
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Sections that still have no text in the current cycle.
    pub fn missing(&self) -> Vec<&str> {
        self.required
            .iter()
            .filter(|name| !self.is_ready(name))
            .map(String::as_str)
            .collect()
    }

    fn is_ready(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(|text| !text.trim().is_empty())
    }

    pub fn begin_cycle(&mut self) {
        self.slots.clear();
        self.collecting = true;
        self.emitted = false;
        self.cycle += 1;
        debug!(cycle = self.cycle, "context cycle started");
    }

    /// Fill (or overwrite) one section. Returns the snapshot if this report
    /// completed the cycle.
    pub fn report_section(&mut self, name: &str, text: impl Into<String>) -> Option<ContextSnapshot> {
        if !self.collecting || self.emitted {
            debug!(section = name, cycle = self.cycle, "report outside an open cycle ignored");
            return None;
        }
        if !self.required.iter().any(|r| r == name) {
            debug!(section = name, "unknown context section ignored");
            return None;
        }
        self.slots.insert(name.to_string(), text.into());

        if !self.required.iter().all(|r| self.is_ready(r)) {
            return None;
        }

        let sections = self
            .required
            .iter()
            .map(|r| (r.clone(), self.slots.remove(r).unwrap_or_default()))
            .collect();
        self.slots.clear();
        self.emitted = true;
        debug!(cycle = self.cycle, "context complete");
        Some(ContextSnapshot {
            cycle: self.cycle,
            sections,
        })
    }

    /// External end signal: stop collecting until the next cycle.
    pub fn end_cycle(&mut self) {
        self.slots.clear();
        self.collecting = false;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn emits_once_when_all_sections_reported() {
        let mut barrier = ContextBarrier::new(["workers", "parcels"]);
        barrier.begin_cycle();

        assert!(barrier.report_section("workers", "A1 idle").is_none());
        let snapshot = barrier.report_section("parcels", "3 unloaded").unwrap();
        assert_eq!(snapshot.section("workers"), Some("A1 idle"));
        assert_eq!(snapshot.section("parcels"), Some("3 unloaded"));

        // A further report before the next cycle emits nothing.
        assert!(barrier.report_section("workers", "A1 working").is_none());
        assert!(barrier.is_collecting());
    }

    #[test]
    fn empty_text_is_not_ready_and_later_reports_overwrite() {
        let mut barrier = ContextBarrier::new(["workers", "parcels"]);
        barrier.begin_cycle();
        assert!(barrier.report_section("workers", "").is_none());
        assert!(barrier.report_section("parcels", "p").is_none());
        assert_eq!(barrier.missing(), vec!["workers"]);

        let snapshot = barrier.report_section("workers", "w").unwrap();
        assert_eq!(snapshot.render(), "[workers]\nw\n\n[parcels]\np");
    }

    #[test]
    fn reports_need_an_open_cycle() {
        let mut barrier = ContextBarrier::new(["only"]);
        assert!(barrier.report_section("only", "early").is_none());

        barrier.begin_cycle();
        barrier.end_cycle();
        assert!(!barrier.is_collecting());
        assert!(barrier.report_section("only", "late").is_none());

        barrier.begin_cycle();
        assert_eq!(barrier.report_section("only", "ok").map(|s| s.cycle), Some(2));
    }

    #[test]
    fn unknown_sections_are_ignored() {
        let mut barrier = ContextBarrier::new(["a"]);
        barrier.begin_cycle();
        assert!(barrier.report_section("b", "text").is_none());
        assert_eq!(barrier.missing(), vec!["a"]);
    }

    proptest! {
        /// However reports interleave, a cycle yields at most one snapshot and
        /// it carries the last text reported for every section.
        #[test]
        fn at_most_one_snapshot_per_cycle(
            reports in prop::collection::vec((0usize..3, "[a-z]{0,3}"), 0..20)
        ) {
            let names = ["a", "b", "c"];
            let mut barrier = ContextBarrier::new(names);
            barrier.begin_cycle();

            let mut latest: HashMap<&str, String> = HashMap::new();
            let mut emitted = Vec::new();
            for (i, text) in reports {
                if emitted.is_empty() {
                    latest.insert(names[i], text.clone());
                }
                if let Some(snapshot) = barrier.report_section(names[i], text) {
                    emitted.push(snapshot);
                }
            }

            prop_assert!(emitted.len() <= 1);
            if let Some(snapshot) = emitted.first() {
                for name in names {
                    prop_assert_eq!(snapshot.section(name), latest.get(name).map(String::as_str));
                }
            }
        }
    }
}
