/// Detection classifier.
///
/// Maps an observed identifier to an alert tier: an exact target match is a
/// TRUE HIT, a signature prefix match is a POSSIBLE HIT. Exact matches always
/// take precedence; among signatures the first in registry order wins.
use crate::registry::{PrefixSignature, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification<'r> {
    /// Identifier equals a configured target.
    Exact,
    /// Identifier starts with a known device-type prefix.
    Prefix(&'r PrefixSignature),
    None,
}

impl Classification<'_> {
    pub fn is_hit(&self) -> bool {
        !matches!(self, Classification::None)
    }
}

/// Classify `id` against `registry`. Comparisons ignore ASCII case.
pub fn classify<'r>(registry: &'r Registry, id: &str) -> Classification<'r> {
    if registry.is_target(id) {
        return Classification::Exact;
    }
    match registry.first_signature(id) {
        Some(sig) => Classification::Prefix(sig),
        None => Classification::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(prefix: &str, label: &str, source: &str) -> PrefixSignature {
        PrefixSignature::new(prefix, label, source).unwrap()
    }

    fn scenario() -> Registry {
        Registry::load(
            ["aa:bb:cc:dd:ee:ff"],
            [sig("70:b3:d5:b3:4", "Pacemaker", "Medtronic")],
        )
    }

    #[test]
    fn exact_target_any_case() {
        let reg = scenario();
        assert_eq!(classify(&reg, "AA:BB:CC:DD:EE:FF"), Classification::Exact);
        assert_eq!(classify(&reg, "aa:bb:cc:dd:ee:ff"), Classification::Exact);
    }

    #[test]
    fn prefix_match_reports_signature() {
        let reg = scenario();
        match classify(&reg, "70:b3:d5:b3:42:00") {
            Classification::Prefix(sig) => {
                assert_eq!(sig.label.as_str(), "Pacemaker");
                assert_eq!(sig.source.as_str(), "Medtronic");
            }
            other => panic!("expected prefix match, got {other:?}"),
        }
    }

    #[test]
    fn unknown_identifier() {
        let reg = scenario();
        assert_eq!(classify(&reg, "00:11:22:33:44:55"), Classification::None);
        assert!(!classify(&reg, "00:11:22:33:44:55").is_hit());
    }

    #[test]
    fn case_insensitive_for_every_tier() {
        let reg = scenario();
        for id in [
            "aa:bb:cc:dd:ee:ff",
            "70:b3:d5:b3:42:00",
            "00:11:22:33:44:55",
            "70:B3:D5",
        ] {
            let upper = id.to_ascii_uppercase();
            let lower = id.to_ascii_lowercase();
            assert_eq!(classify(&reg, &upper), classify(&reg, &lower), "{id}");
        }
    }

    #[test]
    fn exact_beats_prefix() {
        let reg = Registry::load(
            ["70:b3:d5:b3:4a:bc"],
            [sig("70:b3:d5:b3:4", "Pacemaker", "Medtronic")],
        );
        assert_eq!(classify(&reg, "70:B3:D5:B3:4A:BC"), Classification::Exact);
    }

    #[test]
    fn first_signature_in_order_wins() {
        let reg = Registry::load(
            ["11:11:11:11:11:11"],
            [
                sig("70:b3", "Broad", "A"),
                sig("70:b3:d5:b3:4", "Specific", "B"),
            ],
        );
        match classify(&reg, "70:b3:d5:b3:42:00") {
            Classification::Prefix(sig) => assert_eq!(sig.label.as_str(), "Broad"),
            other => panic!("expected prefix match, got {other:?}"),
        }
    }

    #[test]
    fn short_identifier_is_not_an_error() {
        let reg = scenario();
        assert_eq!(classify(&reg, "70:b3"), Classification::None);
        assert_eq!(classify(&reg, ""), Classification::None);
    }
}
