//! Time-driven status scenario source.
//!
//! Test campaigns exercise the flight software's fault handling by cycling
//! each simulated device through a list of named status scenarios
//! ("normal", "warning", "error", ...). A [`ScenarioCycler`] holds the ordered
//! list and the cycle interval; each query advances to the next scenario
//! once the interval has elapsed since the last transition, wrapping at the
//! end of the list.
//!
//! Every query takes the current [`Instant`] explicitly in its `_at` form so
//! tests can step a virtual clock.

use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Name of the nominal scenario every device defines.
pub const NORMAL_SCENARIO: &str = "normal";

/// Parameter set selected by a scenario name.
pub trait ScenarioParams: Clone + Send + 'static {
    /// Look up the preset for a scenario name.
    fn preset(name: &str) -> Option<Self>;

    /// Parameters for the nominal scenario.
    fn normal() -> Self;

    /// Preset for `name`, falling back to [`normal`](Self::normal) with a
    /// warning when the name is unknown.
    fn resolve(name: &str) -> Self {
        Self::preset(name).unwrap_or_else(|| {
            warn!("Unknown status scenario '{name}', using '{NORMAL_SCENARIO}'");
            Self::normal()
        })
    }
}

/// Cycles through named scenarios on a fixed interval.
#[derive(Debug, Clone)]
pub struct ScenarioCycler<P> {
    names: Vec<String>,
    interval: Duration,
    enabled: bool,
    index: usize,
    last_transition: Instant,
    current: P,
}

impl<P: ScenarioParams> ScenarioCycler<P> {
    /// Create a cycler whose first interval starts now.
    pub fn new(names: Vec<String>, interval: Duration, enabled: bool) -> Self {
        Self::starting_at(names, interval, enabled, Instant::now())
    }

    /// Create a cycler whose first interval starts at `now`.
    pub fn starting_at(names: Vec<String>, interval: Duration, enabled: bool, now: Instant) -> Self {
        let enabled = enabled && !names.is_empty();
        let current = if enabled {
            P::resolve(&names[0])
        } else {
            P::normal()
        };
        Self {
            names,
            interval,
            enabled,
            index: 0,
            last_transition: now,
            current,
        }
    }

    /// A cycler that always reports the nominal scenario.
    pub fn disabled() -> Self {
        Self::new(Vec::new(), Duration::ZERO, false)
    }

    /// Whether the cycler rotates through scenarios at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Ordered scenario names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Name of the active scenario.
    pub fn current_name(&self) -> &str {
        if self.enabled {
            self.names[self.index].as_str()
        } else {
            NORMAL_SCENARIO
        }
    }

    /// Parameters of the active scenario, advancing first if due.
    pub fn snapshot(&mut self) -> P {
        self.snapshot_at(Instant::now())
    }

    /// Parameters of the active scenario at time `now`, advancing first if
    /// the cycle interval has elapsed since the last transition.
    pub fn snapshot_at(&mut self, now: Instant) -> P {
        if self.enabled && now.saturating_duration_since(self.last_transition) >= self.interval {
            self.index = (self.index + 1) % self.names.len();
            self.last_transition = now;
            self.current = P::resolve(&self.names[self.index]);
            info!("Status scenario changed to '{}'", self.names[self.index]);
        }
        self.current.clone()
    }

    /// Jump to a listed scenario and restart the interval.
    ///
    /// Returns `false` (and leaves the rotation untouched) when `name` is not
    /// in the scenario list.
    pub fn force(&mut self, name: &str) -> bool {
        self.force_at(name, Instant::now())
    }

    /// Jump to a listed scenario at time `now`.
    pub fn force_at(&mut self, name: &str, now: Instant) -> bool {
        match self.names.iter().position(|n| n == name) {
            Some(index) if self.enabled => {
                self.index = index;
                self.last_transition = now;
                self.current = P::resolve(name);
                info!("Status scenario forced to '{name}'");
                true
            }
            _ => {
                warn!("Cannot force scenario '{name}': not in the active scenario list");
                false
            }
        }
    }
}
