use tracing::debug;

/// Emptiness predicate deciding whether a strategy's result counts as a
/// success. An empty string or collection is treated the same as no result
/// at all, so the chain keeps going.
pub trait NonEmpty {
    fn is_non_empty(&self) -> bool;
}

impl NonEmpty for String {
    fn is_non_empty(&self) -> bool {
        !self.is_empty()
    }
}

impl NonEmpty for &str {
    fn is_non_empty(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> NonEmpty for Vec<T> {
    fn is_non_empty(&self) -> bool {
        !self.is_empty()
    }
}

impl NonEmpty for crate::models::ImageSet {
    fn is_non_empty(&self) -> bool {
        !self.is_empty()
    }
}

struct Strategy<'a, T> {
    name: &'static str,
    attempt: Box<dyn FnMut() -> Option<T> + 'a>,
}

/// Ordered list of independent extraction attempts. Resolution walks the
/// list and returns the first non-empty result; strategies past the first
/// success are never evaluated. Adding or reordering strategies is a data
/// change at the call site, not a control-flow rewrite.
pub struct FallbackChain<'a, T> {
    strategies: Vec<Strategy<'a, T>>,
}

impl<'a, T: NonEmpty> FallbackChain<'a, T> {
    pub fn new() -> Self {
        Self { strategies: Vec::new() }
    }

    pub fn then(mut self, name: &'static str, attempt: impl FnMut() -> Option<T> + 'a) -> Self {
        self.strategies.push(Strategy {
            name,
            attempt: Box::new(attempt),
        });
        self
    }

    /// First non-empty result in order, or None when every strategy came up
    /// empty. The caller decides whether empty is fatal or soft.
    pub fn resolve(mut self) -> Option<T> {
        for strategy in &mut self.strategies {
            match (strategy.attempt)() {
                Some(value) if value.is_non_empty() => {
                    debug!(strategy = strategy.name, "fallback chain resolved");
                    return Some(value);
                }
                Some(_) => debug!(strategy = strategy.name, "strategy returned empty result"),
                None => debug!(strategy = strategy.name, "strategy produced nothing"),
            }
        }
        None
    }
}

impl<'a, T: NonEmpty> Default for FallbackChain<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_returns_first_non_empty_result() {
        let resolved = FallbackChain::new()
            .then("first", || None::<String>)
            .then("second", || Some("hit".to_string()))
            .then("third", || Some("never".to_string()))
            .resolve();
        assert_eq!(resolved, Some("hit".to_string()));
    }

    #[test]
    fn test_never_evaluates_past_first_success() {
        let later_calls = Cell::new(0u32);
        let resolved = FallbackChain::new()
            .then("winner", || Some(vec!["a"]))
            .then("loser", || {
                later_calls.set(later_calls.get() + 1);
                Some(vec!["b"])
            })
            .resolve();
        assert_eq!(resolved, Some(vec!["a"]));
        assert_eq!(later_calls.get(), 0);
    }

    #[test]
    fn test_empty_results_do_not_count_as_success() {
        let resolved = FallbackChain::new()
            .then("empty-string", || Some(String::new()))
            .then("empty-vec", || Some(String::new()))
            .then("real", || Some("value".to_string()))
            .resolve();
        assert_eq!(resolved, Some("value".to_string()));
    }

    #[test]
    fn test_all_failing_yields_none() {
        let resolved: Option<Vec<String>> = FallbackChain::new()
            .then("a", || None)
            .then("b", || Some(Vec::new()))
            .resolve();
        assert_eq!(resolved, None);
    }

    #[test]
    fn test_deterministic_for_fixed_inputs() {
        for _ in 0..3 {
            let resolved = FallbackChain::new()
                .then("one", || Some("one".to_string()))
                .then("two", || Some("two".to_string()))
                .resolve();
            assert_eq!(resolved, Some("one".to_string()));
        }
    }

    #[test]
    fn test_strategies_may_mutate_captured_state() {
        let mut attempts = 0u32;
        let resolved = FallbackChain::new()
            .then("counting", || {
                attempts += 1;
                None::<String>
            })
            .then("fallback", || Some("done".to_string()))
            .resolve();
        assert_eq!(resolved, Some("done".to_string()));
        assert_eq!(attempts, 1);
    }
}
