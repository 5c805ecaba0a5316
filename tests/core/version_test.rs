use proptest::prelude::*;
use provision_core::version::{self, Version, VersionRange};
use provision_core::ProvisionError;

#[test]
fn test_half_open_range() {
    assert!(version::matches("[1.0.0,3.0.0)", "1.0.0").unwrap());
    assert!(version::matches("[1.0.0,3.0.0)", "2.9.9").unwrap());
    assert!(!version::matches("[1.0.0,3.0.0)", "3.0.0").unwrap());
}

#[test]
fn test_explicit_bounds() {
    assert!(version::matches("(1.0,2.0]", "2.0").unwrap());
    assert!(!version::matches("(1.0,2.0]", "1.0").unwrap());
    assert!(version::matches("[1.0,1.0]", "1.0.0").unwrap());
}

#[test]
fn test_bare_version_is_a_floor_unless_exact() {
    assert!(version::matches("1.2", "4.0").unwrap());
    assert!(!version::contains("1.2", "4.0").unwrap());
    assert!(version::contains("1.2", "1.2.0").unwrap());
}

#[test]
fn test_malformed_ranges_are_format_errors() {
    for range in ["[1.0", "[a,b)", "[2.0,1.0)", "[1,2,3]"] {
        assert!(
            matches!(VersionRange::parse(range), Err(ProvisionError::Format(_))),
            "{} should not parse",
            range
        );
    }
}

#[test]
fn test_qualifier_sorts_after_release() {
    let release = Version::parse("1.0.0").unwrap();
    let qualified = Version::parse("1.0.0.SNAPSHOT").unwrap();
    assert!(qualified > release);
    assert_eq!(qualified.qualifier(), "SNAPSHOT");
}

proptest! {
    #[test]
    fn prop_ordering_follows_segments(a in 0u64..50, b in 0u64..50, c in 0u64..50, d in 0u64..50) {
        let left = Version::new(a, b, 0);
        let right = Version::new(c, d, 0);
        prop_assert_eq!(left.cmp(&right), (a, b).cmp(&(c, d)));
    }

    #[test]
    fn prop_half_open_range_excludes_ceiling(lo in 0u64..20, span in 1u64..20, probe in 0u64..60) {
        let range = format!("[{},{})", lo, lo + span);
        let inside = probe >= lo && probe < lo + span;
        prop_assert_eq!(version::matches(&range, &probe.to_string()).unwrap(), inside);
    }
}
