//! Property-based test generators using proptest.

use proptest::prelude::*;

/// Strategy for generating event names.
pub fn event_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_.]{0,23}").expect("Invalid regex")
}

/// Strategy for a sequence of append sizes. A zero means an empty
/// `add_list` call.
pub fn append_plan_strategy(
    max_calls: usize,
    max_list: usize,
) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..=max_list, 1..=max_calls.max(1))
}

/// Strategy for a flush threshold.
pub fn capacity_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![Just(1usize), 2usize..32, Just(1000usize)]
}
