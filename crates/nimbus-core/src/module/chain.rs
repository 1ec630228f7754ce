use std::fmt;

/// Ordered ancestry of logical names currently being resolved.
///
/// Threaded explicitly through every nested resolution; extending it
/// produces a new chain and never mutates the caller's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallChain(Vec<String>);

impl CallChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    /// A copy of this chain with `name` appended.
    pub fn with(&self, name: &str) -> Self {
        let mut names = self.0.clone();
        names.push(name.to_string());
        Self(names)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CallChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" -> "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_does_not_mutate() {
        let root = CallChain::new().with("a");
        let child = root.with("b");
        assert_eq!(root.names(), ["a"]);
        assert!(child.contains("a") && child.contains("b"));
        assert_eq!(child.to_string(), "a -> b");
    }
}
