use std::fmt;
use std::sync::Arc;

use crate::SemanticType;

/// One native function declaration: the method name doubles as the symbol
/// name looked up in the symbol source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDecl {
    pub name: Arc<str>,
    pub params: Vec<SemanticType>,
    pub ret: SemanticType,
}

impl MethodDecl {
    pub fn new(name: impl Into<Arc<str>>, params: Vec<SemanticType>, ret: SemanticType) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for MethodDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

/// An ordered list of native method declarations bound as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Contract {
    name: Arc<str>,
    methods: Vec<MethodDecl>,
}

impl Contract {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn method(
        mut self,
        name: impl Into<Arc<str>>,
        params: Vec<SemanticType>,
        ret: SemanticType,
    ) -> Self {
        self.methods.push(MethodDecl::new(name, params, ret));
        self
    }

    pub fn with_method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    pub fn methods(&self) -> &[MethodDecl] {
        &self.methods
    }

    pub fn find(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|method| &*method.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_display_lists_params_in_order() {
        let method = MethodDecl::new(
            "GetCursorPos",
            vec![SemanticType::structure("Point")],
            SemanticType::Int,
        );
        assert_eq!(method.to_string(), "GetCursorPos(Point) -> int");
    }

    #[test]
    fn find_by_name() {
        let contract = Contract::new("Math")
            .method("Add", vec![SemanticType::Int, SemanticType::Int], SemanticType::Int)
            .method("Neg", vec![SemanticType::Int], SemanticType::Int);
        assert_eq!(contract.find("Neg").map(MethodDecl::arity), Some(1));
        assert!(contract.find("Sub").is_none());
        assert!(!contract.is_empty());
    }
}
