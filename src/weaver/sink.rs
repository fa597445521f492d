//! The logging method woven calls go to.

use crate::core::{MethodToken, Module};
use crate::resolver::{MethodTarget, Resolve, ResolutionError};

/// An external static method taking one argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSink {
    pub module: String,
    pub type_name: String,
    pub method_name: String,
}

impl Default for LogSink {
    fn default() -> Self {
        LogSink {
            module: "UnityEngine".to_string(),
            type_name: "UnityEngine.Debug".to_string(),
            method_name: "Log".to_string(),
        }
    }
}

impl LogSink {
    pub fn target(&self) -> MethodTarget {
        MethodTarget {
            module: self.module.clone(),
            type_name: self.type_name.clone(),
            method_name: self.method_name.clone(),
            param_count: 1,
            is_static: true,
        }
    }
}

/// Sink reference of one module, resolved at most once.
#[derive(Debug, Default)]
pub struct SinkCache {
    token: Option<MethodToken>,
}

impl SinkCache {
    pub fn new() -> Self {
        SinkCache::default()
    }

    /// The token calling the sink from `module`, importing it on first use.
    pub fn get_or_import(
        &mut self,
        module: &mut Module,
        sink: &LogSink,
        resolver: &mut dyn Resolve,
    ) -> Result<MethodToken, ResolutionError> {
        if let Some(token) = self.token {
            return Ok(token);
        }

        let sig = resolver.resolve_method(&sink.target())?;
        let token = module.import_method(&sink.module, &sink.type_name, &sink.method_name, sig);
        tracing::debug!(
            "imported {}::{} into `{}` as {}",
            sink.type_name,
            sink.method_name,
            module.name,
            token
        );

        self.token = Some(token);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures::MapResolver;

    #[test]
    fn test_sink_resolved_once() {
        let mut resolver = MapResolver::with_sink();
        let mut module = Module::new("Game");
        let mut cache = SinkCache::new();
        let sink = LogSink::default();

        let first = cache.get_or_import(&mut module, &sink, &mut resolver).unwrap();
        let second = cache.get_or_import(&mut module, &sink, &mut resolver).unwrap();

        assert_eq!(first, second);
        assert_eq!(resolver.lookups(), 1);
        assert_eq!(module.member_refs.len(), 1);
        assert_eq!(module.module_refs, vec!["UnityEngine".to_string()]);
    }

    #[test]
    fn test_sink_reuses_existing_import() {
        let mut resolver = MapResolver::with_sink();
        let mut module = Module::new("Game");
        let sink = LogSink::default();
        let existing = module.import_method(
            "UnityEngine",
            "UnityEngine.Debug",
            "Log",
            crate::core::MethodSig::static_method(1, false),
        );

        let token = SinkCache::new()
            .get_or_import(&mut module, &sink, &mut resolver)
            .unwrap();
        assert_eq!(token, existing);
        assert_eq!(module.member_refs.len(), 1);
    }

    #[test]
    fn test_unresolvable_sink() {
        let mut resolver = MapResolver::default();
        let mut module = Module::new("Game");

        let err = SinkCache::new()
            .get_or_import(&mut module, &LogSink::default(), &mut resolver)
            .unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound { .. }));
        assert!(module.member_refs.is_empty());
    }
}
