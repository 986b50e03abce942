//! Reduction strategies: deciding which duplicate candidates to delete.
//!
//! When more than one owned object carries the hash of a single desired
//! object, the converter's strategies are applied in order, each narrowing
//! the surviving set. A strategy only ever proposes rejections; [`reduce`]
//! makes sure at least one candidate survives no matter what the strategies
//! return.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use converge_core::{document, ResultExt};
use serde_json::Value;

use crate::object::Object;

/// Condition type [`KeepProgrammed`] looks for by default.
pub const PROGRAMMED_CONDITION: &str = "Programmed";

/// A policy proposing which candidates to reject.
pub trait ReductionStrategy: fmt::Debug + Send + Sync {
    /// Name used in logs and conflict reports.
    fn name(&self) -> &str;

    /// Candidates to reject. Returning every candidate is treated as
    /// rejecting none.
    fn reject(&self, candidates: &[Object]) -> Vec<Object>;
}

/// Shared handle to a strategy.
pub type SharedStrategy = Arc<dyn ReductionStrategy>;

/// Reject the single oldest candidate.
///
/// Candidates without a creation timestamp count as the oldest. On equal
/// timestamps the lexicographically largest (name, uid) is rejected. Any
/// other survivors are left to later strategies or to [`reduce`]'s
/// tie-break.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepYoungest;

impl ReductionStrategy for KeepYoungest {
    fn name(&self) -> &str {
        "KeepYoungest"
    }

    fn reject(&self, candidates: &[Object]) -> Vec<Object> {
        if candidates.len() <= 1 {
            return Vec::new();
        }

        candidates
            .iter()
            .min_by(|a, b| {
                a.metadata
                    .creation_timestamp
                    .cmp(&b.metadata.creation_timestamp)
                    .then_with(|| b.name().cmp(a.name()))
                    .then_with(|| b.uid().cmp(a.uid()))
            })
            .cloned()
            .into_iter()
            .collect()
    }
}

/// Reject candidates that have not reached a "programmed" condition, as long
/// as at least one candidate has.
#[derive(Debug, Clone)]
pub struct KeepProgrammed {
    condition_type: String,
}

impl KeepProgrammed {
    /// Look for `condition_type` in `status.conditions`.
    pub fn new(condition_type: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
        }
    }

    /// Whether `object` reports the condition with status `"True"`.
    pub fn is_programmed(&self, object: &Object) -> bool {
        document::get_array(&object.status, &["conditions"])
            .or_default_logged(None)
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|condition| self.is_true_condition(condition))
            })
    }

    fn is_true_condition(&self, condition: &Value) -> bool {
        let field = |name: &str| document::get_str(condition, &[name]).ok().flatten();
        field("type") == Some(self.condition_type.as_str()) && field("status") == Some("True")
    }
}

impl Default for KeepProgrammed {
    fn default() -> Self {
        Self::new(PROGRAMMED_CONDITION)
    }
}

impl ReductionStrategy for KeepProgrammed {
    fn name(&self) -> &str {
        "KeepProgrammed"
    }

    fn reject(&self, candidates: &[Object]) -> Vec<Object> {
        let (programmed, pending): (Vec<&Object>, Vec<&Object>) = candidates
            .iter()
            .partition(|object| self.is_programmed(object));

        if programmed.is_empty() {
            return Vec::new();
        }
        pending.into_iter().cloned().collect()
    }
}

type RejectFn = dyn Fn(&[Object]) -> Vec<Object> + Send + Sync;

/// A named closure used as a strategy.
pub struct FnStrategy {
    name: String,
    reject: Box<RejectFn>,
}

impl FnStrategy {
    /// Wrap `reject` under `name`.
    pub fn new(
        name: impl Into<String>,
        reject: impl Fn(&[Object]) -> Vec<Object> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            reject: Box::new(reject),
        }
    }
}

impl fmt::Debug for FnStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStrategy").field("name", &self.name).finish()
    }
}

impl ReductionStrategy for FnStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn reject(&self, candidates: &[Object]) -> Vec<Object> {
        (self.reject)(candidates)
    }
}

/// Outcome of reducing one candidate set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reduction {
    /// Candidates that survive. Exactly one for non-empty input.
    pub kept: Vec<Object>,
    /// Candidates to delete.
    pub rejected: Vec<Object>,
    /// Strategy that rejected each candidate, in `rejected` order.
    pub decided_by: Vec<String>,
}

const FALLBACK: &str = "lexicographic-name";

fn identity(object: &Object) -> (String, String, String) {
    (
        object.metadata.namespace.clone(),
        object.name().to_string(),
        object.uid().to_string(),
    )
}

/// Apply `strategies` in order to `candidates`.
///
/// Each strategy sees only the current survivors. Proposals that would
/// reject every survivor are ignored, as are proposed objects that are not
/// survivors. Once strategies are exhausted with several survivors left,
/// the survivor with the smallest (name, uid) is kept.
pub fn reduce(candidates: &[Object], strategies: &[SharedStrategy]) -> Reduction {
    let mut survivors = candidates.to_vec();
    let mut reduction = Reduction::default();

    for strategy in strategies {
        if survivors.len() <= 1 {
            break;
        }

        let proposed: HashSet<_> = strategy.reject(&survivors).iter().map(identity).collect();
        let (dropped, kept): (Vec<Object>, Vec<Object>) = survivors
            .into_iter()
            .partition(|object| proposed.contains(&identity(object)));

        if kept.is_empty() {
            tracing::warn!(
                strategy = strategy.name(),
                candidates = dropped.len(),
                "Strategy would reject every candidate, ignoring it"
            );
            survivors = dropped;
            continue;
        }

        tracing::debug!(
            strategy = strategy.name(),
            rejected = dropped.len(),
            kept = kept.len(),
            "Applied reduction strategy"
        );
        reduction
            .decided_by
            .extend(dropped.iter().map(|_| strategy.name().to_string()));
        reduction.rejected.extend(dropped);
        survivors = kept;
    }

    if survivors.len() > 1 {
        survivors.sort_by(|a, b| (a.name(), a.uid()).cmp(&(b.name(), b.uid())));
        let rest = survivors.split_off(1);
        reduction
            .decided_by
            .extend(rest.iter().map(|_| FALLBACK.to_string()));
        reduction.rejected.extend(rest);
    }

    reduction.kept = survivors;
    reduction
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::object::GroupVersionKind;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use serde_json::json;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(seconds)
    }

    fn candidate(name: &str, created: Option<DateTime<Utc>>, programmed: Option<bool>) -> Object {
        let mut object = Object::new(&GroupVersionKind::core("v1", "Service"), "ns", name);
        object.metadata.uid = Some(format!("uid-{name}"));
        object.metadata.creation_timestamp = created;
        if let Some(programmed) = programmed {
            let status = if programmed { "True" } else { "False" };
            object = object.with_status(json!({
                "conditions": [{"type": PROGRAMMED_CONDITION, "status": status}]
            }));
        }
        object
    }

    fn names(objects: &[Object]) -> Vec<&str> {
        objects.iter().map(Object::name).collect()
    }

    #[test]
    fn test_keep_youngest_rejects_oldest() {
        let a = candidate("a", Some(at(1)), None);
        let b = candidate("b", Some(at(2)), None);
        assert_eq!(names(&KeepYoungest.reject(&[a, b])), vec!["a"]);
    }

    #[test]
    fn test_keep_youngest_rejects_only_the_oldest() {
        let set = [
            candidate("a", Some(at(3)), None),
            candidate("b", None, None),
            candidate("c", Some(at(1)), None),
        ];
        assert_eq!(names(&KeepYoungest.reject(&set)), vec!["b"]);
    }

    #[test]
    fn test_keep_youngest_tie_keeps_smallest_name() {
        let set = [candidate("b", Some(at(1)), None), candidate("a", Some(at(1)), None)];
        assert_eq!(names(&KeepYoungest.reject(&set)), vec!["b"]);
    }

    #[test]
    fn test_keep_youngest_single_candidate() {
        assert!(KeepYoungest.reject(&[candidate("a", None, None)]).is_empty());
        assert!(KeepYoungest.reject(&[]).is_empty());
    }

    #[test]
    fn test_keep_programmed_rejects_unprogrammed() {
        let set = [
            candidate("a", None, Some(false)),
            candidate("b", None, Some(true)),
        ];
        assert_eq!(names(&KeepProgrammed::default().reject(&set)), vec!["a"]);
    }

    #[test]
    fn test_keep_programmed_defers_when_none_programmed() {
        let set = [
            candidate("a", None, Some(false)),
            candidate("b", None, None),
        ];
        assert!(KeepProgrammed::default().reject(&set).is_empty());
    }

    #[test]
    fn test_keep_programmed_custom_condition() {
        let ready = candidate("a", None, None).with_status(json!({
            "conditions": [{"type": "Ready", "status": "True"}]
        }));
        let strategy = KeepProgrammed::new("Ready");
        assert!(strategy.is_programmed(&ready));
        assert!(!KeepProgrammed::default().is_programmed(&ready));
    }

    #[test]
    fn test_keep_programmed_malformed_status() {
        let broken = candidate("a", None, None).with_status(json!({"conditions": "nope"}));
        assert!(!KeepProgrammed::default().is_programmed(&broken));
    }

    #[test]
    fn test_reduce_applies_strategies_in_order() {
        let set = vec![
            candidate("a", Some(at(3)), Some(false)),
            candidate("b", Some(at(1)), Some(true)),
            candidate("c", Some(at(2)), Some(true)),
        ];
        let strategies: Vec<SharedStrategy> =
            vec![Arc::new(KeepProgrammed::default()), Arc::new(KeepYoungest)];
        let reduction = reduce(&set, &strategies);

        assert_eq!(names(&reduction.kept), vec!["c"]);
        assert_eq!(names(&reduction.rejected), vec!["a", "b"]);
        assert_eq!(reduction.decided_by, vec!["KeepProgrammed", "KeepYoungest"]);
    }

    #[test]
    fn test_reduce_lets_later_strategy_keep_programmed() {
        let set = vec![
            candidate("a", Some(at(1)), Some(false)),
            candidate("b", Some(at(2)), Some(true)),
            candidate("c", Some(at(3)), Some(false)),
        ];
        let strategies: Vec<SharedStrategy> =
            vec![Arc::new(KeepYoungest), Arc::new(KeepProgrammed::default())];
        let reduction = reduce(&set, &strategies);

        assert_eq!(names(&reduction.kept), vec!["b"]);
        assert_eq!(names(&reduction.rejected), vec!["a", "c"]);
        assert_eq!(reduction.decided_by, vec!["KeepYoungest", "KeepProgrammed"]);
    }

    #[test]
    fn test_reduce_keep_youngest_then_name_order() {
        let set = vec![
            candidate("a", Some(at(1)), None),
            candidate("b", Some(at(2)), None),
            candidate("c", Some(at(3)), None),
        ];
        let reduction = reduce(&set, &[Arc::new(KeepYoungest) as SharedStrategy]);

        assert_eq!(names(&reduction.kept), vec!["b"]);
        assert_eq!(names(&reduction.rejected), vec!["a", "c"]);
        assert_eq!(reduction.decided_by, vec!["KeepYoungest", FALLBACK]);
    }

    #[test]
    fn test_reduce_falls_back_to_name_order() {
        let set = vec![
            candidate("c", None, Some(false)),
            candidate("a", None, Some(false)),
            candidate("b", None, Some(false)),
        ];
        let strategies: Vec<SharedStrategy> = vec![Arc::new(KeepProgrammed::default())];
        let reduction = reduce(&set, &strategies);

        assert_eq!(names(&reduction.kept), vec!["a"]);
        assert_eq!(names(&reduction.rejected), vec!["b", "c"]);
        assert_eq!(reduction.decided_by, vec![FALLBACK, FALLBACK]);
    }

    #[test]
    fn test_reduce_ignores_total_rejection() {
        let set = vec![candidate("a", None, None), candidate("b", None, None)];
        let greedy: SharedStrategy = Arc::new(FnStrategy::new("greedy", <[Object]>::to_vec));
        let reduction = reduce(&set, &[greedy]);

        assert_eq!(names(&reduction.kept), vec!["a"]);
        assert_eq!(names(&reduction.rejected), vec!["b"]);
    }

    #[test]
    fn test_reduce_empty_input() {
        let reduction = reduce(&[], &[Arc::new(KeepYoungest) as SharedStrategy]);
        assert!(reduction.kept.is_empty());
        assert!(reduction.rejected.is_empty());
    }

    fn arbitrary_strategy() -> impl Strategy<Value = SharedStrategy> {
        prop_oneof![
            Just(Arc::new(KeepYoungest) as SharedStrategy),
            Just(Arc::new(KeepProgrammed::default()) as SharedStrategy),
            Just(Arc::new(FnStrategy::new("all", <[Object]>::to_vec)) as SharedStrategy),
            Just(Arc::new(FnStrategy::new("none", |_: &[Object]| Vec::new())) as SharedStrategy),
            Just(Arc::new(FnStrategy::new("first", |c: &[Object]| c.iter().take(1).cloned().collect())) as SharedStrategy),
        ]
    }

    fn arbitrary_candidates() -> impl Strategy<Value = Vec<Object>> {
        prop::collection::vec((0i64..5, prop::option::of(any::<bool>())), 1..8).prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (created, programmed))| {
                    candidate(&format!("obj-{i}"), Some(at(created)), programmed)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_reduction_keeps_exactly_one(
            candidates in arbitrary_candidates(),
            strategies in prop::collection::vec(arbitrary_strategy(), 0..4),
        ) {
            let reduction = reduce(&candidates, &strategies);
            prop_assert_eq!(reduction.kept.len(), 1);
            prop_assert_eq!(reduction.kept.len() + reduction.rejected.len(), candidates.len());
            prop_assert_eq!(reduction.rejected.len(), reduction.decided_by.len());

            let kept = identity(&reduction.kept[0]);
            prop_assert!(reduction.rejected.iter().all(|o| identity(o) != kept));
        }

        #[test]
        fn prop_reduction_deterministic(
            candidates in arbitrary_candidates(),
            strategies in prop::collection::vec(arbitrary_strategy(), 0..4),
        ) {
            prop_assert_eq!(reduce(&candidates, &strategies), reduce(&candidates, &strategies));
        }
    }
}
