//! Tolerant translation lookup.
//!
//! Handlers compose user-facing text from translation keys but must keep
//! working without a catalog: a missing key returns `None` and the caller
//! falls back to literal text. Lookups never fail loudly.

/// Looks up translated display text.
pub trait Translate: Send + Sync {
    /// Resolves `key` with the given `(name, value)` substitutions.
    ///
    /// Returns `None` when the key is unknown; callers fall back to a
    /// literal default.
    fn lookup(&self, key: &str, args: &[(&str, &str)]) -> Option<String>;
}

/// A [`Translate`] implementation with no catalog: every lookup misses.
///
/// Useful for wiring the realtime core in contexts (tests, diagnostic
/// tools) where the literal fallbacks are good enough.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranslations;

impl Translate for NoTranslations {
    fn lookup(&self, _key: &str, _args: &[(&str, &str)]) -> Option<String> {
        None
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn no_translations_always_misses() {
        let t = NoTranslations;
        assert_eq!(t.lookup("tasks.transcription", &[]), None);
        assert_eq!(t.lookup("anything", &[("name", "x")]), None);
    }
}
