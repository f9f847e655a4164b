use std::time::Duration;

/// What a scenario matches against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Substring of the first container's command line (command and args joined by spaces).
    CommandContains(String),
    /// Exact task definition family.
    Family(String),
}

impl Selector {
    fn matches(&self, command: &str, family: Option<&str>) -> bool {
        match self {
            Selector::CommandContains(needle) => command.contains(needle.as_str()),
            Selector::Family(f) => family == Some(f.as_str()),
        }
    }
}

/// How long a simulated pod keeps running and how it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub selector: Selector,
    /// Time spent RUNNING before the pod terminates. `None` runs until deleted.
    pub hold: Option<Duration>,
    pub exit_code: i32,
}

impl Scenario {
    pub fn command(needle: impl Into<String>, hold: Option<Duration>, exit_code: i32) -> Self {
        Self {
            selector: Selector::CommandContains(needle.into()),
            hold,
            exit_code,
        }
    }

    pub fn family(family: impl Into<String>, hold: Option<Duration>, exit_code: i32) -> Self {
        Self {
            selector: Selector::Family(family.into()),
            hold,
            exit_code,
        }
    }
}

/// Resolved timing for one pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub hold: Option<Duration>,
    pub exit_code: i32,
}

/// Ordered scenario list; the first match wins, otherwise the fallback applies.
#[derive(Debug, Clone)]
pub struct TimingTable {
    scenarios: Vec<Scenario>,
    fallback: Timing,
}

impl TimingTable {
    /// Empty table where every pod follows `fallback`.
    pub fn new(fallback_hold: Option<Duration>, fallback_exit_code: i32) -> Self {
        Self {
            scenarios: Vec::new(),
            fallback: Timing {
                hold: fallback_hold,
                exit_code: fallback_exit_code,
            },
        }
    }

    /// Appends a scenario after the existing ones.
    pub fn with(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    /// Inserts a scenario ahead of every existing one.
    pub fn with_first(mut self, scenario: Scenario) -> Self {
        self.scenarios.insert(0, scenario);
        self
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn resolve(&self, command: &str, family: Option<&str>) -> Timing {
        self.scenarios
            .iter()
            .find(|s| s.selector.matches(command, family))
            .map(|s| Timing {
                hold: s.hold,
                exit_code: s.exit_code,
            })
            .unwrap_or(self.fallback)
    }
}

impl Default for TimingTable {
    /// Command patterns used by the integration suites.
    ///
    /// Long-running patterns sit ahead of `true` so that `while true` never matches it.
    fn default() -> Self {
        let secs = Duration::from_secs;
        TimingTable::new(Some(secs(2)), 0)
            .with(Scenario::command("exit 1", Some(secs(1)), 1))
            .with(Scenario::command("sleep 300", None, 0))
            .with(Scenario::command("while true", None, 0))
            .with(Scenario::command("exit 0", Some(secs(1)), 0))
            .with(Scenario::command("true", Some(secs(1)), 0))
            .with(Scenario::command("sleep 15", Some(secs(16)), 0))
            .with(Scenario::command("sleep 5", Some(secs(6)), 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(cmd: &str) -> Timing {
        TimingTable::default().resolve(cmd, None)
    }

    #[test]
    fn default_table_patterns() {
        assert_eq!(resolve("sh -c exit 1"), Timing { hold: Some(Duration::from_secs(1)), exit_code: 1 });
        assert_eq!(resolve("true").hold, Some(Duration::from_secs(1)));
        assert_eq!(resolve("sh -c sleep 15").hold, Some(Duration::from_secs(16)));
        assert_eq!(resolve("sleep 5").hold, Some(Duration::from_secs(6)));
        assert_eq!(resolve("sleep 300").hold, None);
        assert_eq!(resolve("echo hi").hold, Some(Duration::from_secs(2)));
    }

    #[test]
    fn while_true_never_stops() {
        assert_eq!(resolve("sh -c while true; do sleep 1; done").hold, None);
    }

    #[test]
    fn empty_command_uses_fallback() {
        assert_eq!(resolve(""), Timing { hold: Some(Duration::from_secs(2)), exit_code: 0 });
    }

    #[test]
    fn family_scenario_can_take_precedence() {
        let table = TimingTable::default().with_first(Scenario::family("batch", Some(Duration::from_secs(30)), 3));

        let t = table.resolve("exit 1", Some("batch"));
        assert_eq!(t.exit_code, 3);
        assert_eq!(table.resolve("exit 1", Some("web")).exit_code, 1);
    }
}
