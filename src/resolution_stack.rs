use alloc::vec::Vec;

use crate::{
    callable::Callable,
    errors::{CircularDependency, ResolveErrorKind},
};

/// Callables currently being resolved within one top-level `require` or `call`.
#[derive(Default)]
pub(crate) struct ResolutionStack {
    entries: Vec<Callable>,
}

impl ResolutionStack {
    #[inline]
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns [`ResolveErrorKind::CircularDependency`] if `callable` is already in flight, with the
    /// trace from its first occurrence through the repeat.
    pub(crate) fn enter(&mut self, callable: &Callable) -> Result<(), ResolveErrorKind> {
        if let Some(position) = self.entries.iter().position(|entry| entry.ptr_eq(callable)) {
            let mut trace = self.entries[position..].to_vec();
            trace.push(callable.clone());
            return Err(ResolveErrorKind::CircularDependency(CircularDependency::new(trace)));
        }
        self.entries.push(callable.clone());
        Ok(())
    }

    #[inline]
    pub(crate) fn exit(&mut self) {
        self.entries.pop();
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::ResolutionStack;
    use crate::{
        callable::{Callable, Produced},
        errors::ResolveErrorKind,
    };

    fn callable(name: &'static str) -> Callable {
        Callable::new(name, |_| Ok(Produced::value(())))
    }

    #[test]
    fn test_trace_starts_at_first_occurrence() {
        let (outer, a, b) = (callable("outer"), callable("a"), callable("b"));
        let mut stack = ResolutionStack::new();

        stack.enter(&outer).unwrap();
        stack.enter(&a).unwrap();
        stack.enter(&b).unwrap();

        let Err(ResolveErrorKind::CircularDependency(cycle)) = stack.enter(&a) else {
            panic!("expected a cycle");
        };
        assert_eq!(cycle.names(), ["a", "b", "a"]);
        assert_eq!(stack.len(), 3);
    }

    #[test]
    fn test_same_name_is_not_a_cycle() {
        let mut stack = ResolutionStack::new();

        stack.enter(&callable("a")).unwrap();
        stack.enter(&callable("a")).unwrap();
        stack.exit();
        stack.exit();

        assert_eq!(stack.len(), 0);
    }
}
