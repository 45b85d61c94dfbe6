//! Parser for signature files.
//!
//! # File Format
//!
//! ```text
//! # Comment lines start with #
//!
//! # Struct declaration: fields in declaration order
//! struct Point { x: int, y: int }
//!
//! # Function signature: name: (param_types) -> return_type
//! GetCursorPos: (point: Point) -> int
//! Add: (int, int) -> int
//! Beep: () -> void
//! ```
//!
//! Parameters may be written bare (`int`) or named (`count: int`); names are
//! documentation only. A struct type used as a parameter or return type is
//! passed by pointer.

use std::path::Path;

use crate::types::is_identifier;
use crate::{Contract, MethodDecl, RegistryError, SemanticType, StructType, TypeRegistry};

/// Struct declarations plus a contract parsed from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureFile {
    pub structs: Vec<StructType>,
    pub contract: Contract,
}

/// Error during signature file parsing. `line` is 1-based; 0 means the error
/// is not tied to a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line > 0 {
            write!(f, "line {}: {}", self.line, self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl SignatureFile {
    /// Parses a file; the contract is named after the file stem.
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ParseError::at(0, format!("failed to read {}: {e}", path.display())))?;
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| ParseError::at(0, format!("invalid file name {}", path.display())))?;
        Self::parse(name, &content)
    }

    pub fn parse(contract_name: &str, content: &str) -> Result<Self, ParseError> {
        let mut structs = Vec::new();
        let mut contract = Contract::new(contract_name);

        for (index, line) in content.lines().enumerate() {
            let line_num = index + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("struct ") {
                structs.push(parse_struct(rest.trim(), line_num)?);
            } else {
                let method = parse_method(line, line_num)?;
                if contract.find(&method.name).is_some() {
                    return Err(ParseError::at(
                        line_num,
                        format!("function `{}` is declared twice", method.name),
                    ));
                }
                contract = contract.with_method(method);
            }
        }

        Ok(Self { structs, contract })
    }

    /// Registers every parsed struct declaration, in file order.
    pub fn register_into(&self, registry: &TypeRegistry) -> Result<(), RegistryError> {
        for decl in &self.structs {
            registry.register(decl.clone())?;
        }
        Ok(())
    }
}

/// `Name { field: type, ... }`
fn parse_struct(s: &str, line_num: usize) -> Result<StructType, ParseError> {
    let open = s
        .find('{')
        .ok_or_else(|| ParseError::at(line_num, "expected '{' after struct name"))?;
    let name = s[..open].trim();
    if !is_identifier(name) {
        return Err(ParseError::at(line_num, format!("invalid struct name '{name}'")));
    }
    let body = s[open + 1..]
        .trim_end()
        .strip_suffix('}')
        .ok_or_else(|| ParseError::at(line_num, "expected '}' at end of struct"))?;

    let mut decl = StructType::new(name);
    for field in body.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        let (field_name, ty) = field.split_once(':').ok_or_else(|| {
            ParseError::at(line_num, format!("expected 'name: type' in '{field}'"))
        })?;
        let field_name = field_name.trim();
        if !is_identifier(field_name) {
            return Err(ParseError::at(
                line_num,
                format!("invalid field name '{field_name}'"),
            ));
        }
        decl = decl.field(field_name, parse_type(ty.trim(), line_num)?);
    }
    Ok(decl)
}

/// `name: (param_types) -> return_type`
fn parse_method(line: &str, line_num: usize) -> Result<MethodDecl, ParseError> {
    let (name, rest) = line
        .split_once(':')
        .ok_or_else(|| ParseError::at(line_num, "expected ':' after function name"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ParseError::at(line_num, "function name cannot be empty"));
    }
    if !is_identifier(name) {
        return Err(ParseError::at(line_num, format!("invalid function name '{name}'")));
    }

    let rest = rest.trim();
    let rest = rest
        .strip_prefix('(')
        .ok_or_else(|| ParseError::at(line_num, "expected '(' at start of type signature"))?;
    let close = rest
        .find(')')
        .ok_or_else(|| ParseError::at(line_num, "unmatched '(' in type signature"))?;
    let params_str = &rest[..close];
    let ret_str = rest[close + 1..]
        .trim()
        .strip_prefix("->")
        .ok_or_else(|| ParseError::at(line_num, "expected '->' after parameter list"))?
        .trim();

    let mut params = Vec::new();
    for param in params_str.split(',').map(str::trim) {
        if param.is_empty() {
            if params_str.trim().is_empty() {
                break;
            }
            return Err(ParseError::at(line_num, "empty parameter in list"));
        }
        let ty = match param.split_once(':') {
            Some((_, ty)) => ty.trim(),
            None => param,
        };
        let ty = parse_type(ty, line_num)?;
        if ty == SemanticType::Void {
            return Err(ParseError::at(line_num, "void is not a valid parameter type"));
        }
        params.push(ty);
    }

    let ret = parse_type(ret_str, line_num)?;
    Ok(MethodDecl::new(name, params, ret))
}

fn parse_type(s: &str, line_num: usize) -> Result<SemanticType, ParseError> {
    SemanticType::parse(s).ok_or_else(|| ParseError::at(line_num, format!("unknown type: '{s}'")))
}
