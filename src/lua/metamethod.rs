//! Metamethod Names
//!
//! The metamethods the embedding layer dispatches on its own. Everything
//! else in a metatable is opaque to this crate.

use std::fmt;

/// Metamethods consulted by the binding layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetamethodType {
    /// __index - table indexing
    Index,

    /// __newindex - table assignment
    NewIndex,

    /// __call - calling a non-function
    Call,

    /// __len - length operator
    Len,

    /// __eq - equality
    Eq,
}

impl MetamethodType {
    /// Get the string name of the metamethod
    pub fn name(&self) -> &'static str {
        match self {
            MetamethodType::Index => "__index",
            MetamethodType::NewIndex => "__newindex",
            MetamethodType::Call => "__call",
            MetamethodType::Len => "__len",
            MetamethodType::Eq => "__eq",
        }
    }
}

impl fmt::Display for MetamethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metamethod_names() {
        assert_eq!(MetamethodType::Index.name(), "__index");
        assert_eq!(MetamethodType::NewIndex.name(), "__newindex");
        assert_eq!(MetamethodType::Eq.to_string(), "__eq");
    }
}
