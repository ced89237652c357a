//! Property tests for method tags and the seed hierarchy.
//!
//! Uses proptest to verify:
//! 1. Tag round-trip: display → parse is the identity on tuned tags
//! 2. Fixed tags never collide with the tuned form
//! 3. Sub-seed derivation is order independent

use proptest::prelude::*;

use odorcast_core::method::{FixedMethod, HyperValue, TunedFamily, TunedSpec};
use odorcast_core::seed::SeedHierarchy;
use odorcast_core::MethodSpec;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_hyper() -> impl Strategy<Value = HyperValue> {
    prop_oneof![
        Just(HyperValue::Unbounded),
        (0usize..5000).prop_map(HyperValue::Int),
        prop::sample::select(vec!["auto", "sqrt", "log2", "half"])
            .prop_map(|s| HyperValue::Literal(s.to_string())),
    ]
}

fn arb_tuned() -> impl Strategy<Value = MethodSpec> {
    (
        prop::bool::ANY,
        arb_hyper(),
        arb_hyper(),
        arb_hyper(),
    )
        .prop_map(|(rf, n, m, s)| {
            MethodSpec::Tuned(TunedSpec {
                family: if rf {
                    TunedFamily::RandomForest
                } else {
                    TunedFamily::ExtraTrees
                },
                n_estimators: n,
                max_features: m,
                min_samples_split: s,
            })
        })
}

// ── 1. Tag Round-Trip ────────────────────────────────────────────────

proptest! {
    /// Displaying a tuned tag and parsing it back yields the same spec.
    #[test]
    fn tuned_tag_round_trips(spec in arb_tuned()) {
        let text = spec.to_string();
        let parsed: MethodSpec = text.parse().unwrap();
        prop_assert_eq!(&parsed, &spec);
        prop_assert_eq!(parsed.to_string(), text);
    }

    /// Any tag with the wrong number of tokens is rejected.
    #[test]
    fn wrong_arity_is_rejected(extra in 1usize..4, n in 0usize..1000) {
        let mut tag = format!("RF-{n}");
        for _ in 1..extra {
            tag.push_str("-x");
        }
        if extra != 3 {
            prop_assert!(tag.parse::<MethodSpec>().is_err());
        }
    }
}

// ── 2. Fixed Tags ────────────────────────────────────────────────────

#[test]
fn fixed_tags_round_trip_and_are_distinct() {
    let mut seen = std::collections::HashSet::new();
    for m in FixedMethod::ALL {
        let spec = MethodSpec::Fixed(m);
        assert_eq!(spec.to_string().parse::<MethodSpec>().unwrap(), spec);
        assert!(seen.insert(m.tag()));
    }
}

// ── 3. Seed Hierarchy ────────────────────────────────────────────────

proptest! {
    /// Sub-seeds depend only on (master, stream, index), not call order.
    #[test]
    fn sub_seeds_are_order_independent(master in any::<u64>(), a in 0u64..100, b in 0u64..100) {
        let h = SeedHierarchy::new(master);
        let first = (h.sub_seed("tree", a), h.sub_seed("tree", b));
        let second = (h.sub_seed("tree", b), h.sub_seed("tree", a));
        prop_assert_eq!(first.0, second.1);
        prop_assert_eq!(first.1, second.0);
    }
}
