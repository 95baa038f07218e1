use std::time::Duration;

use kim_api::ObjectKey;
use kim_authz::{CacheKey, Decision, DecisionCache};

fn cache_key(subject: &str) -> CacheKey {
    CacheKey::new(&ObjectKey::new("default", subject), "doc:1", "read")
}

#[test]
fn entries_are_bound_to_a_revision() {
    let cache = DecisionCache::new(Duration::from_secs(60));
    cache.set(cache_key("u1"), Decision::Allow, 3);
    assert_eq!(cache.get(&cache_key("u1"), 3), Some(Decision::Allow));
    assert_eq!(cache.get(&cache_key("u1"), 4), None);
}

#[test]
fn expired_entries_are_not_returned() {
    let cache = DecisionCache::new(Duration::from_millis(0));
    cache.set(cache_key("u1"), Decision::Allow, 1);
    assert_eq!(cache.get(&cache_key("u1"), 1), None);
}

#[test]
fn full_cache_evicts_outdated_entries() {
    let cache = DecisionCache::with_capacity(Duration::from_secs(60), 2);
    cache.set(cache_key("u1"), Decision::Allow, 1);
    cache.set(cache_key("u2"), Decision::Deny, 1);
    assert_eq!(cache.len(), 2);

    cache.set(cache_key("u3"), Decision::Allow, 2);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(&cache_key("u3"), 2), Some(Decision::Allow));
}

#[test]
fn full_cache_skips_insert() {
    let cache = DecisionCache::with_capacity(Duration::from_secs(60), 1);
    cache.set(cache_key("u1"), Decision::Allow, 1);
    cache.set(cache_key("u2"), Decision::Allow, 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(&cache_key("u2"), 1), None);
}
