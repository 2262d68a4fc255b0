use std::collections::HashMap;

use crate::mutants::{ClassName, MutationDetails, MutationIdentifier};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Collect,
    ApplyAt(MutationIdentifier),
}

/// Per-call bookkeeping shared by discovery and materialization.
///
/// Built fresh for every engine call and dropped with it.
#[derive(Debug)]
pub struct MutationContext {
    mode: Mode,
    collected: Vec<MutationDetails>,
    found: Option<MutationDetails>,
    // (method name, descriptor, operator id) -> next sequence index
    counters: HashMap<(String, String, String), usize>,
}

impl MutationContext {
    pub fn collecting() -> Self {
        MutationContext::with_mode(Mode::Collect)
    }

    pub fn targeting(target: MutationIdentifier) -> Self {
        MutationContext::with_mode(Mode::ApplyAt(target))
    }

    fn with_mode(mode: Mode) -> Self {
        MutationContext {
            mode,
            collected: Vec::new(),
            found: None,
            counters: HashMap::new(),
        }
    }

    pub fn target(&self) -> Option<&MutationIdentifier> {
        match &self.mode {
            Mode::Collect => None,
            Mode::ApplyAt(target) => Some(target),
        }
    }

    /// Allocates the identity of the next candidate `mutator` reports in this method.
    pub fn next_identifier(
        &mut self,
        class: &ClassName,
        method: &str,
        descriptor: &str,
        mutator: &str,
    ) -> MutationIdentifier {
        let counter = self
            .counters
            .entry((method.to_string(), descriptor.to_string(), mutator.to_string()))
            .or_insert(0);
        let index = *counter;
        *counter += 1;
        MutationIdentifier::new(class.clone(), method, descriptor, mutator, index)
    }

    /// Records a candidate. Returns true when it is the target and had not
    /// been matched before; the caller then applies the rewrite.
    pub fn record(&mut self, details: MutationDetails) -> bool {
        let is_target = self.found.is_none()
            && matches!(&self.mode, Mode::ApplyAt(target) if *target == details.id);
        if is_target {
            self.found = Some(details.clone());
        }
        self.collected.push(details);
        is_target
    }

    pub fn is_found(&self) -> bool {
        self.found.is_some()
    }

    pub fn found(&self) -> Option<&MutationDetails> {
        self.found.as_ref()
    }

    pub fn collected(&self) -> &[MutationDetails] {
        &self.collected
    }

    pub fn into_collected(self) -> Vec<MutationDetails> {
        self.collected
    }

    pub fn into_found(self) -> Option<MutationDetails> {
        self.found
    }
}
