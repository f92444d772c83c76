use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// A named way of performing one remote step.
pub trait Strategy {
    fn label(&self) -> String;

    /// Remote capability this strategy cannot work without.
    fn capability(&self) -> Option<&'static str> {
        None
    }
}

/// What the remote side reported it supports. An empty capability list carries no
/// information and allows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    known: Option<BTreeSet<String>>,
}

impl Capabilities {
    pub fn unknown() -> Self {
        Self { known: None }
    }

    pub fn from_reported<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if set.is_empty() {
            Self::unknown()
        } else {
            Self { known: Some(set) }
        }
    }

    pub fn allows(&self, capability: &str) -> bool {
        match &self.known {
            Some(set) => set.contains(capability),
            None => true,
        }
    }

    pub fn is_known(&self) -> bool {
        self.known.is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.known
            .as_ref()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub label: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Append-only record of every strategy attempted during a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptLog {
    records: Vec<AttemptRecord>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        stage: &str,
        subject: Option<&str>,
        label: String,
        outcome: Result<(), String>,
    ) {
        let (ok, error) = match outcome {
            Ok(()) => (true, None),
            Err(err) => (false, Some(err)),
        };
        self.records.push(AttemptRecord {
            stage: stage.to_string(),
            subject: subject.map(str::to_string),
            label,
            ok,
            error,
        });
    }

    pub fn records(&self) -> &[AttemptRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn for_stage<'a: 'b, 'b>(
        &'a self,
        stage: &'b str,
        subject: Option<&'b str>,
    ) -> impl Iterator<Item = &'a AttemptRecord> + 'b {
        self.records
            .iter()
            .filter(move |record| record.stage == stage && record.subject.as_deref() == subject)
    }

    pub fn first_success(&self, stage: &str, subject: Option<&str>) -> Option<&AttemptRecord> {
        self.for_stage(stage, subject).find(|record| record.ok)
    }
}

/// The winning strategy of a list and the value it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<S, T> {
    pub strategy: S,
    pub label: String,
    pub value: T,
}

/// Ranked strategies for one stage, tried strictly in order until one succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyList<S> {
    stage: &'static str,
    strategies: Vec<S>,
}

impl<S: Strategy + Clone> StrategyList<S> {
    pub fn new(stage: &'static str, strategies: Vec<S>) -> Self {
        Self { stage, strategies }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn strategies(&self) -> &[S] {
        &self.strategies
    }

    pub fn labels(&self) -> Vec<String> {
        self.strategies.iter().map(Strategy::label).collect()
    }

    /// Runs `attempt` for each strategy whose capability is available. Every
    /// attempt, including capability skips, lands in `log`. Nothing after the
    /// first success is attempted.
    pub fn run<T, F>(
        &self,
        subject: Option<&str>,
        capabilities: &Capabilities,
        log: &mut AttemptLog,
        mut attempt: F,
    ) -> Option<Resolved<S, T>>
    where
        F: FnMut(&S) -> Result<T, String>,
    {
        for strategy in &self.strategies {
            let label = strategy.label();
            if let Some(capability) = strategy.capability() {
                if !capabilities.allows(capability) {
                    debug!(stage = self.stage, label = %label, capability, "strategy unavailable");
                    log.record(
                        self.stage,
                        subject,
                        label,
                        Err(format!("unavailable: {capability}")),
                    );
                    continue;
                }
            }
            match attempt(strategy) {
                Ok(value) => {
                    debug!(stage = self.stage, label = %label, "strategy succeeded");
                    log.record(self.stage, subject, label.clone(), Ok(()));
                    return Some(Resolved {
                        strategy: strategy.clone(),
                        label,
                        value,
                    });
                }
                Err(err) => {
                    debug!(stage = self.stage, label = %label, error = %err, "strategy failed");
                    log.record(self.stage, subject, label, Err(err));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Named(&'static str, Option<&'static str>);

    impl Strategy for Named {
        fn label(&self) -> String {
            self.0.to_string()
        }

        fn capability(&self) -> Option<&'static str> {
            self.1
        }
    }

    fn list() -> StrategyList<Named> {
        StrategyList::new(
            "demo",
            vec![
                Named("first", None),
                Named("second", None),
                Named("third", None),
            ],
        )
    }

    #[test]
    fn stops_at_first_success() {
        let mut log = AttemptLog::new();
        let mut tried = Vec::new();
        let resolved = list()
            .run(None, &Capabilities::unknown(), &mut log, |s| {
                tried.push(s.0);
                if s.0 == "second" {
                    Ok(2)
                } else {
                    Err(format!("{} failed", s.0))
                }
            })
            .expect("resolved");

        assert_eq!(resolved.label, "second");
        assert_eq!(resolved.value, 2);
        assert_eq!(tried, vec!["first", "second"]);
        assert_eq!(log.len(), 2);
        assert_eq!(
            log.first_success("demo", None).map(|r| r.label.as_str()),
            Some("second")
        );
    }

    #[test]
    fn exhaustion_records_every_failure() {
        let mut log = AttemptLog::new();
        let resolved: Option<Resolved<Named, ()>> = list().run(
            Some("key"),
            &Capabilities::unknown(),
            &mut log,
            |_| Err("nope".to_string()),
        );
        assert!(resolved.is_none());
        assert_eq!(log.for_stage("demo", Some("key")).count(), 3);
        assert!(log.first_success("demo", Some("key")).is_none());
    }

    #[test]
    fn missing_capability_skips_without_attempt() {
        let list = StrategyList::new(
            "demo",
            vec![Named("needs", Some("cap.a")), Named("plain", None)],
        );
        let mut log = AttemptLog::new();
        let mut tried = Vec::new();
        let resolved = list
            .run(None, &Capabilities::from_reported(["cap.b"]), &mut log, |s| {
                tried.push(s.0);
                Ok(())
            })
            .expect("resolved");

        assert_eq!(resolved.label, "plain");
        assert_eq!(tried, vec!["plain"]);
        assert_eq!(
            log.records()[0].error.as_deref(),
            Some("unavailable: cap.a")
        );
    }

    #[test]
    fn empty_capability_list_allows_everything() {
        let caps = Capabilities::from_reported(Vec::<String>::new());
        assert!(!caps.is_known());
        assert!(caps.allows("anything"));
    }
}
