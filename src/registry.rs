/// Target registry: exact identifiers and ordered prefix signatures.
///
/// Loaded once at startup and read-only afterwards. Registries are small
/// (a handful of targets, tens of signatures), so storage is fixed-capacity
/// and lookups are linear scans.
use heapless::{String, Vec};

use crate::config::bounded;
use crate::defaults;
use crate::error::ConfigError;
use crate::protocol::{Identifier, Label, IDENTIFIER_LEN};

/// Maximum number of exact targets.
pub const MAX_TARGETS: usize = 32;

/// Maximum number of prefix signatures.
pub const MAX_SIGNATURES: usize = 64;

/// Manufacturer / source attribution for a signature.
pub type SourceString = String<24>;

/// A known device-type prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixSignature {
    /// Leading substring of an identifier, e.g. "70:b3:d5:b3:4".
    pub prefix: Identifier,
    /// Device type shown on alerts, e.g. "Pacemaker/ICD/CRT".
    pub label: Label,
    /// Manufacturer or database the prefix came from.
    pub source: SourceString,
}

impl PrefixSignature {
    /// Label and source are truncated to fit. A prefix longer than an
    /// identifier is rejected: truncating it would widen what it matches.
    pub fn new(prefix: &str, label: &str, source: &str) -> Result<Self, ConfigError> {
        if prefix.len() > IDENTIFIER_LEN {
            return Err(ConfigError::PrefixTooLong {
                len: prefix.len(),
                max: IDENTIFIER_LEN,
            });
        }
        Ok(Self {
            prefix: bounded("signature prefix", prefix),
            label: bounded("signature label", label),
            source: bounded("signature source", source),
        })
    }

    /// Case-insensitive leading-substring test. Identifiers shorter than the
    /// prefix never match.
    pub fn matches(&self, id: &str) -> bool {
        let prefix = self.prefix.as_bytes();
        let id = id.as_bytes();
        id.len() >= prefix.len() && id[..prefix.len()].eq_ignore_ascii_case(prefix)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    targets: Vec<Identifier, MAX_TARGETS>,
    signatures: Vec<PrefixSignature, MAX_SIGNATURES>,
}

impl Registry {
    /// Build a registry from ordered target and signature lists.
    ///
    /// Surplus entries are dropped with a warning. A target longer than an
    /// identifier is skipped: truncated, it would name a different device.
    pub fn load<'a, T, S>(targets: T, signatures: S) -> Self
    where
        T: IntoIterator<Item = &'a str>,
        S: IntoIterator<Item = PrefixSignature>,
    {
        let mut registry = Self::default();

        for target in targets {
            if target.len() > IDENTIFIER_LEN {
                log::warn!(
                    "Skipping target {}: {}",
                    target,
                    ConfigError::TargetTooLong {
                        len: target.len(),
                        max: IDENTIFIER_LEN,
                    }
                );
                continue;
            }
            if registry.targets.push(bounded("target", target)).is_err() {
                log::warn!(
                    "{}",
                    ConfigError::TooManyEntries {
                        what: "targets",
                        max: MAX_TARGETS,
                    }
                );
                break;
            }
        }

        for sig in signatures {
            if registry.signatures.push(sig).is_err() {
                log::warn!(
                    "{}",
                    ConfigError::TooManyEntries {
                        what: "signatures",
                        max: MAX_SIGNATURES,
                    }
                );
                break;
            }
        }

        registry
    }

    /// Registry from the compiled-in defaults. Signatures are skipped when
    /// `signatures_enabled` is false.
    pub fn from_defaults(signatures_enabled: bool) -> Self {
        let signatures = defaults::SIGNATURES
            .iter()
            .filter(|_| signatures_enabled)
            .filter_map(|&(prefix, label, source)| {
                PrefixSignature::new(prefix, label, source)
                    .map_err(|e| log::warn!("Skipping signature {}: {}", prefix, e))
                    .ok()
            });
        Self::load(defaults::TARGETS.iter().copied(), signatures)
    }

    pub fn targets(&self) -> &[Identifier] {
        &self.targets
    }

    /// Signatures in match order.
    pub fn signatures(&self) -> &[PrefixSignature] {
        &self.signatures
    }

    /// Whether `id` equals any target, ignoring case.
    pub fn is_target(&self, id: &str) -> bool {
        self.targets.iter().any(|t| t.eq_ignore_ascii_case(id))
    }

    /// First signature whose prefix matches `id`.
    pub fn first_signature(&self, id: &str) -> Option<&PrefixSignature> {
        self.signatures.iter().find(|sig| sig.matches(id))
    }
}
