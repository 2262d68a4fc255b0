use std::sync::Arc;

use tracing::{debug, warn};

use crate::classfile::ClassFile;
use crate::context::MutationContext;
use crate::dispatch::Dispatcher;
use crate::error::EngineError;
use crate::filter::MethodFilter;
use crate::mutants::{ClassName, Mutant, MutationDetails, MutationIdentifier};
use crate::operators::{MethodMutator, OperatorRegistry};
use crate::prescan::{DEFAULT_AVOIDED_CALLS, DEFAULT_EXCLUDED_ORIGINS, PreMutationAnalyser, PremutationClassInfo};
use crate::source::ByteSource;

/// Finds mutations in classes and produces mutants from their identifiers.
///
/// Holds only configuration fixed at construction, so one engine can serve
/// any number of threads at once.
pub struct MutationEngine<S> {
    source: S,
    registry: OperatorRegistry,
    filter: MethodFilter,
    excluded_origins: Vec<String>,
    avoided_calls: Vec<String>,
}

impl<S: ByteSource> MutationEngine<S> {
    /// An engine with the default excluded origins and avoided calls.
    pub fn new(source: S, registry: OperatorRegistry, filter: MethodFilter) -> Self {
        MutationEngine {
            source,
            registry,
            filter,
            excluded_origins: DEFAULT_EXCLUDED_ORIGINS.iter().map(|s| s.to_string()).collect(),
            avoided_calls: DEFAULT_AVOIDED_CALLS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Marker classes, interfaces or annotations (internal or dotted names)
    /// identifying classes not to mutate at all.
    pub fn with_excluded_origins<I, T>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.excluded_origins = markers
            .into_iter()
            .map(|m| ClassName::new(m).as_internal_name().to_string())
            .collect();
        self
    }

    /// Package or class prefixes whose calls make a source line off limits.
    pub fn with_avoided_calls<I, T>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.avoided_calls = prefixes
            .into_iter()
            .map(|p| p.as_ref().replace('.', "/"))
            .collect();
        self
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn discover(&self, class: &ClassName) -> Result<Vec<MutationDetails>, EngineError> {
        let bytes = self.fetch_original(class)?;
        let parsed = self.parse(class, &bytes)?;
        let info = self.pre_scan(class, &parsed)?;

        let mut ctx = MutationContext::collecting();
        Dispatcher::new(class, &parsed, &info, self.registry.operators(), &self.filter).run(&mut ctx)?;

        let found = ctx.into_collected();
        debug!(%class, mutations = found.len(), "discovered mutations");
        Ok(found)
    }

    pub fn materialize(&self, id: &MutationIdentifier) -> Result<Mutant, EngineError> {
        let bytes = self.fetch_original(&id.class)?;
        let parsed = self.parse(&id.class, &bytes)?;
        let info = self.pre_scan(&id.class, &parsed)?;

        let operators: Vec<Arc<dyn MethodMutator>> = self
            .registry
            .operators()
            .iter()
            .filter(|op| op.id() == id.mutator)
            .cloned()
            .collect();

        let mut ctx = MutationContext::targeting(id.clone());
        let patch = Dispatcher::new(&id.class, &parsed, &info, &operators, &self.filter).run(&mut ctx)?;

        match (ctx.into_found(), patch) {
            (Some(details), Some(patch)) => {
                debug!(%id, offset = patch.offset, "materialized mutant");
                Ok(Mutant { details, bytes: patch.apply(&bytes) })
            }
            _ => {
                warn!(%id, "mutation not found in current class bytes");
                Err(EngineError::MutationNotFound(id.clone()))
            }
        }
    }

    pub fn fetch_original(&self, class: &ClassName) -> Result<Vec<u8>, EngineError> {
        self.source
            .fetch(class)
            .map_err(|source| EngineError::Io { class: class.clone(), source })?
            .ok_or_else(|| EngineError::ClassNotFound(class.clone()))
    }

    fn parse<'b>(&self, class: &ClassName, bytes: &'b [u8]) -> Result<ClassFile<'b>, EngineError> {
        ClassFile::parse(bytes).map_err(|source| EngineError::Decode { class: class.clone(), source })
    }

    fn pre_scan(&self, class: &ClassName, parsed: &ClassFile<'_>) -> Result<PremutationClassInfo, EngineError> {
        PreMutationAnalyser::new(&self.excluded_origins, &self.avoided_calls)
            .analyse(parsed)
            .map_err(|source| EngineError::Decode { class: class.clone(), source })
    }
}
