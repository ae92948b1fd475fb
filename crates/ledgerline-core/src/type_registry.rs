//! Type registry and rebinder.
//!
//! Every stored event and snapshot carries the `(assembly, type name)` it was
//! written under. Over the life of a system those names drift: types get
//! renamed or moved between assemblies. The registry resolves a stored
//! identity to the type that is current today, before any payload is
//! deserialized.
//!
//! Stored type names use a small grammar:
//!
//! ```text
//! type     := name [ "<" argument { "," argument } ">" ]
//! argument := assembly ":" type
//! ```
//!
//! so a stored list of a renamed event reads `List<ledgerline.quote:PremiumQuoted>`
//! in assembly `std`. Generic arguments are rebound recursively.
//!
//! Resolution fails closed. Renames are only followed through explicit
//! mappings registered with [`TypeRegistry::register_rename`]; there is no
//! structural or convention-based fallback.

use std::collections::HashMap;
use std::fmt;

use crate::error::DomainError;

/// A resolved, currently-loaded type identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    /// Assembly (module/crate namespace) the type lives in.
    pub assembly: String,
    /// Unqualified type name, without generic arguments.
    pub name: String,
    /// Generic arguments, empty for non-generic types.
    pub arguments: Vec<TypeDescriptor>,
}

impl TypeDescriptor {
    /// Creates a non-generic descriptor.
    pub fn new(assembly: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            assembly: assembly.into(),
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    /// Creates a generic descriptor over `arguments`.
    pub fn generic(
        assembly: impl Into<String>,
        name: impl Into<String>,
        arguments: Vec<TypeDescriptor>,
    ) -> Self {
        Self {
            assembly: assembly.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Returns `true` if this is the non-generic type `assembly:name`.
    #[must_use]
    pub fn is(&self, assembly: &str, name: &str) -> bool {
        self.arguments.is_empty() && self.assembly == assembly && self.name == name
    }

    /// The value stored in the type-name column: the name plus any generic
    /// arguments, each argument qualified with its assembly.
    #[must_use]
    pub fn type_name(&self) -> String {
        if self.arguments.is_empty() {
            return self.name.clone();
        }
        let arguments: Vec<String> = self.arguments.iter().map(ToString::to_string).collect();
        format!("{}<{}>", self.name, arguments.join(", "))
    }

    /// Parses a stored `(assembly, type name)` pair without resolving it.
    ///
    /// Returns `None` if `type_name` does not follow the stored-name grammar.
    #[must_use]
    pub fn parse(assembly: &str, type_name: &str) -> Option<Self> {
        let assembly = assembly.trim();
        if !is_identifier(assembly) {
            return None;
        }
        parse_type(assembly, type_name)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.assembly, self.type_name())
    }
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| !c.is_whitespace() && !matches!(c, '<' | '>' | ',' | ':'))
}

fn parse_type(assembly: &str, text: &str) -> Option<TypeDescriptor> {
    let text = text.trim();
    let Some(open) = text.find('<') else {
        return is_identifier(text).then(|| TypeDescriptor::new(assembly, text));
    };

    let name = text[..open].trim();
    let inner = text[open + 1..].strip_suffix('>')?;
    if !is_identifier(name) {
        return None;
    }

    let mut arguments = Vec::new();
    for argument in split_top_level(inner)? {
        let separator = argument.find(':')?;
        if argument.find('<').is_some_and(|angle| angle < separator) {
            return None;
        }
        let argument_assembly = argument[..separator].trim();
        if !is_identifier(argument_assembly) {
            return None;
        }
        arguments.push(parse_type(argument_assembly, &argument[separator + 1..])?);
    }

    Some(TypeDescriptor::generic(assembly, name, arguments))
}

/// Splits generic arguments on commas that are not nested inside `<...>`.
fn split_top_level(text: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut start = 0;
    for (index, c) in text.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                parts.push(&text[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    parts.push(&text[start..]);
    if parts.iter().any(|part| part.trim().is_empty()) {
        return None;
    }
    Some(parts)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TypeKey {
    assembly: String,
    name: String,
}

impl TypeKey {
    fn new(assembly: &str, name: &str) -> Self {
        Self {
            assembly: assembly.to_owned(),
            name: name.to_owned(),
        }
    }
}

/// Resolves stored type identities to currently-loaded types.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    /// Current types and their generic arity.
    types: HashMap<TypeKey, usize>,
    /// Historical name -> newer name.
    renames: HashMap<TypeKey, TypeKey>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a current, non-generic type.
    pub fn register(&mut self, assembly: &str, name: &str) -> &mut Self {
        self.register_generic(assembly, name, 0)
    }

    /// Registers a current generic container type taking `arity` arguments.
    pub fn register_generic(&mut self, assembly: &str, name: &str, arity: usize) -> &mut Self {
        self.types.insert(TypeKey::new(assembly, name), arity);
        self
    }

    /// Records that `(from_assembly, from_name)` was renamed to
    /// `(to_assembly, to_name)`. Chains of renames are followed at bind time.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidOperation` if the historical name is a
    /// currently registered type, or is already mapped to a different target.
    pub fn register_rename(
        &mut self,
        (from_assembly, from_name): (&str, &str),
        (to_assembly, to_name): (&str, &str),
    ) -> Result<&mut Self, DomainError> {
        let from = TypeKey::new(from_assembly, from_name);
        let to = TypeKey::new(to_assembly, to_name);
        if self.types.contains_key(&from) {
            return Err(DomainError::InvalidOperation(format!(
                "cannot rename {from_assembly}:{from_name}: it is a current type"
            )));
        }
        match self.renames.get(&from) {
            Some(existing) if *existing != to => Err(DomainError::InvalidOperation(format!(
                "{from_assembly}:{from_name} is already renamed to {}:{}",
                existing.assembly, existing.name
            ))),
            _ => {
                self.renames.insert(from, to);
                Ok(self)
            }
        }
    }

    /// Resolves a stored identity to the current type.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnresolvableType` if the name is malformed, if
    /// the type (or any generic argument) has no current binding, or if a
    /// generic type is used with the wrong number of arguments.
    pub fn bind_to_type(&self, assembly: &str, type_name: &str) -> Result<TypeDescriptor, DomainError> {
        TypeDescriptor::parse(assembly, type_name)
            .and_then(|parsed| self.resolve(&parsed))
            .ok_or_else(|| DomainError::unresolvable(assembly, type_name))
    }

    /// Returns the canonical `(assembly, type name)` to persist for `descriptor`.
    ///
    /// Descriptors built from historical names are rewritten to the current
    /// naming, so newly written records always use the latest names.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnresolvableType` if `descriptor` has no binding.
    pub fn bind_to_name(&self, descriptor: &TypeDescriptor) -> Result<(String, String), DomainError> {
        let resolved = self.resolve(descriptor).ok_or_else(|| {
            DomainError::unresolvable(descriptor.assembly.clone(), descriptor.type_name())
        })?;
        let type_name = resolved.type_name();
        Ok((resolved.assembly, type_name))
    }

    fn resolve(&self, parsed: &TypeDescriptor) -> Option<TypeDescriptor> {
        let key = self.follow_renames(&parsed.assembly, &parsed.name)?;
        let arity = *self.types.get(&key)?;
        if arity != parsed.arguments.len() {
            return None;
        }
        let arguments = parsed
            .arguments
            .iter()
            .map(|argument| self.resolve(argument))
            .collect::<Option<Vec<_>>>()?;
        Some(TypeDescriptor {
            assembly: key.assembly,
            name: key.name,
            arguments,
        })
    }

    fn follow_renames(&self, assembly: &str, name: &str) -> Option<TypeKey> {
        let mut key = TypeKey::new(assembly, name);
        // A chain can visit each mapping at most once; anything longer is a cycle.
        for _ in 0..=self.renames.len() {
            if self.types.contains_key(&key) {
                return Some(key);
            }
            key = self.renames.get(&key)?.clone();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .register("quote", "QuoteOpened")
            .register("quote", "PremiumCalculated")
            .register("std", "String")
            .register_generic("std", "List", 1)
            .register_generic("std", "Map", 2);
        registry
            .register_rename(("quote", "PremiumQuoted"), ("quote", "PremiumCalculated"))
            .unwrap();
        registry
    }

    fn assert_unresolvable(result: Result<TypeDescriptor, DomainError>) {
        match result {
            Err(DomainError::UnresolvableType { .. }) => {}
            other => panic!("expected UnresolvableType, got {other:?}"),
        }
    }

    #[test]
    fn test_bind_to_type_resolves_current_type() {
        let descriptor = registry().bind_to_type("quote", "QuoteOpened").unwrap();

        assert!(descriptor.is("quote", "QuoteOpened"));
    }

    #[test]
    fn test_bind_to_type_follows_rename() {
        let descriptor = registry().bind_to_type("quote", "PremiumQuoted").unwrap();

        assert!(descriptor.is("quote", "PremiumCalculated"));
    }

    #[test]
    fn test_bind_to_type_follows_rename_chain_across_assemblies() {
        // Arrange
        let mut registry = registry();
        registry
            .register_rename(("legacy.quotes", "QuoteCreated"), ("quote", "QuoteStarted"))
            .unwrap()
            .register_rename(("quote", "QuoteStarted"), ("quote", "QuoteOpened"))
            .unwrap();

        // Act
        let descriptor = registry.bind_to_type("legacy.quotes", "QuoteCreated").unwrap();

        // Assert
        assert!(descriptor.is("quote", "QuoteOpened"));
    }

    #[test]
    fn test_bind_to_type_rebinds_generic_argument() {
        let descriptor = registry()
            .bind_to_type("std", "List<quote:PremiumQuoted>")
            .unwrap();

        assert_eq!(
            descriptor,
            TypeDescriptor::generic(
                "std",
                "List",
                vec![TypeDescriptor::new("quote", "PremiumCalculated")]
            )
        );
        assert_eq!(descriptor.type_name(), "List<quote:PremiumCalculated>");
    }

    #[test]
    fn test_bind_to_type_rebinds_nested_generic_arguments() {
        let descriptor = registry()
            .bind_to_type("std", "Map<std:String, std:List<quote:PremiumQuoted>>")
            .unwrap();

        assert_eq!(
            descriptor.to_string(),
            "std:Map<std:String, std:List<quote:PremiumCalculated>>"
        );
    }

    #[test]
    fn test_bind_to_type_fails_closed_for_unknown_type() {
        assert_unresolvable(registry().bind_to_type("quote", "ClaimFiled"));
    }

    #[test]
    fn test_bind_to_type_fails_closed_for_unknown_generic_argument() {
        assert_unresolvable(registry().bind_to_type("std", "List<quote:ClaimFiled>"));
    }

    #[test]
    fn test_bind_to_type_rejects_wrong_generic_arity() {
        let registry = registry();

        assert_unresolvable(registry.bind_to_type("std", "List"));
        assert_unresolvable(registry.bind_to_type("std", "List<std:String, std:String>"));
        assert_unresolvable(registry.bind_to_type("quote", "QuoteOpened<std:String>"));
    }

    #[test]
    fn test_bind_to_type_rejects_malformed_names() {
        let registry = registry();

        assert_unresolvable(registry.bind_to_type("std", "List<quote:QuoteOpened"));
        assert_unresolvable(registry.bind_to_type("std", "List<QuoteOpened>"));
        assert_unresolvable(registry.bind_to_type("std", "List<>"));
        assert_unresolvable(registry.bind_to_type("", "QuoteOpened"));
    }

    #[test]
    fn test_bind_to_type_detects_rename_cycle() {
        let mut registry = registry();
        registry
            .register_rename(("quote", "A"), ("quote", "B"))
            .unwrap()
            .register_rename(("quote", "B"), ("quote", "A"))
            .unwrap();

        assert_unresolvable(registry.bind_to_type("quote", "A"));
    }

    #[test]
    fn test_bind_to_name_produces_current_canonical_name() {
        let historical = TypeDescriptor::generic(
            "std",
            "List",
            vec![TypeDescriptor::new("quote", "PremiumQuoted")],
        );

        let (assembly, type_name) = registry().bind_to_name(&historical).unwrap();

        assert_eq!(assembly, "std");
        assert_eq!(type_name, "List<quote:PremiumCalculated>");
    }

    #[test]
    fn test_bind_to_name_rejects_unregistered_type() {
        let result = registry().bind_to_name(&TypeDescriptor::new("quote", "Unknown"));

        assert!(matches!(result, Err(DomainError::UnresolvableType { .. })));
    }

    #[test]
    fn test_register_rename_rejects_current_type_as_source() {
        let result =
            registry().register_rename(("quote", "QuoteOpened"), ("quote", "PremiumCalculated")).map(|_| ());

        assert!(matches!(result, Err(DomainError::InvalidOperation(_))));
    }

    #[test]
    fn test_register_rename_rejects_conflicting_target() {
        let result =
            registry().register_rename(("quote", "PremiumQuoted"), ("quote", "QuoteOpened")).map(|_| ());

        assert!(matches!(result, Err(DomainError::InvalidOperation(_))));
    }
}
