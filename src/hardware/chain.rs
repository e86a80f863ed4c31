//! Probe chain with sticky method selection
//!
//! A chain walks its probes in priority order and remembers the first one
//! that produced a value. Later reads call only that probe; when it stops
//! answering the chain runs a fresh discovery pass and may settle on a
//! different probe, or on none.

use tracing::{debug, info, warn};

use super::probe::{attempt, ProbeKind, ProbeSource, NO_METHOD, UNAVAILABLE_LABEL};

/// Selection state of one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<K> {
    /// No discovery pass has run yet
    Undiscovered,
    /// The last discovery pass found this probe working
    Discovered(K),
    /// The last discovery pass found nothing
    Exhausted,
}

/// Ordered probes for one metric plus the sticky selection.
#[derive(Debug, Clone)]
pub struct ProbeChain<K: ProbeKind> {
    metric: &'static str,
    order: Vec<K>,
    selection: Selection<K>,
    /// Consecutive sticky failures tolerated before rediscovery
    grace_ticks: u32,
    misses: u32,
}

impl<K: ProbeKind> ProbeChain<K> {
    pub fn new(metric: &'static str, order: Vec<K>) -> Self {
        Self {
            metric,
            order,
            selection: Selection::Undiscovered,
            grace_ticks: 0,
            misses: 0,
        }
    }

    /// Keep a failing sticky probe for up to `ticks` reads before rediscovering.
    pub fn with_grace_ticks(mut self, ticks: u32) -> Self {
        self.grace_ticks = ticks;
        self
    }

    #[cfg(test)]
    pub fn selection(&self) -> Selection<K> {
        self.selection
    }

    pub fn selected(&self) -> Option<K> {
        match self.selection {
            Selection::Discovered(probe) => Some(probe),
            _ => None,
        }
    }

    /// Stable name of the selected probe, or `"none"`.
    pub fn method_name(&self) -> &'static str {
        self.selected().map_or(NO_METHOD, |probe| probe.name())
    }

    /// Display label of the selected probe, or `"unavailable"`.
    pub fn label(&self) -> &'static str {
        self.selected().map_or(UNAVAILABLE_LABEL, |probe| probe.label())
    }

    /// Walk the whole chain and select the first probe that yields a value.
    pub fn discover<S>(&mut self, source: &mut S) -> Option<f64>
    where
        S: ProbeSource<K> + ?Sized,
    {
        self.misses = 0;

        for &probe in &self.order {
            match attempt(source, probe) {
                Some(value) => {
                    if self.selection != Selection::Discovered(probe) {
                        info!(
                            metric = self.metric,
                            method = probe.name(),
                            "{} temp -> {} ({value:.1}°C)",
                            self.metric,
                            probe.label()
                        );
                    }
                    self.selection = Selection::Discovered(probe);
                    return Some(value);
                }
                None => debug!(metric = self.metric, method = probe.name(), "probe gave no value"),
            }
        }

        if self.selection != Selection::Exhausted {
            warn!(metric = self.metric, "no working {} temperature method", self.metric);
        }
        self.selection = Selection::Exhausted;
        None
    }

    /// Current best value: sticky probe first, full discovery when it fails.
    pub fn read<S>(&mut self, source: &mut S) -> Option<f64>
    where
        S: ProbeSource<K> + ?Sized,
    {
        if let Selection::Discovered(probe) = self.selection {
            if let Some(value) = attempt(source, probe) {
                self.misses = 0;
                return Some(value);
            }

            if self.misses < self.grace_ticks {
                self.misses += 1;
                debug!(
                    metric = self.metric,
                    method = probe.name(),
                    misses = self.misses,
                    "sticky probe missed, keeping it"
                );
                return None;
            }

            warn!(
                metric = self.metric,
                method = probe.name(),
                "sticky probe stopped answering, rediscovering"
            );
        }

        self.discover(source)
    }
}
