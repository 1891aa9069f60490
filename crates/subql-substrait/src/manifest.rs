//! Function extension declarations
//!
//! Producers intern every function they emit into a [`FunctionManifest`];
//! consumers rebuild the anchor table from the plan's declarations.

use crate::error::{Result, SubstraitError};
use std::collections::{HashMap, HashSet};
use substrait::proto::extensions::simple_extension_declaration::{ExtensionFunction, MappingType};
use substrait::proto::extensions::{SimpleExtensionDeclaration, SimpleExtensionUri};

/// Interns compound function names to anchors, starting at 1. Every
/// function references the extension URI it was declared with.
#[derive(Debug, Default)]
pub struct FunctionManifest {
    anchors: HashMap<String, u32>,
    functions: Vec<(String, u32)>,
    uris: Vec<String>,
}

impl FunctionManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor for `name`, allocating the next one on first use.
    pub fn anchor(&mut self, name: &str, uri: &str) -> u32 {
        if let Some(anchor) = self.anchors.get(name) {
            return *anchor;
        }
        let uri_anchor = self.uri_anchor(uri);
        self.functions.push((name.to_string(), uri_anchor));
        let anchor = self.functions.len() as u32;
        self.anchors.insert(name.to_string(), anchor);
        anchor
    }

    fn uri_anchor(&mut self, uri: &str) -> u32 {
        match self.uris.iter().position(|u| u == uri) {
            Some(i) => i as u32 + 1,
            None => {
                self.uris.push(uri.to_string());
                self.uris.len() as u32
            }
        }
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Extension URIs and function declarations, both in anchor order.
    #[allow(deprecated)]
    pub fn into_parts(self) -> (Vec<SimpleExtensionUri>, Vec<SimpleExtensionDeclaration>) {
        let uris = self
            .uris
            .into_iter()
            .enumerate()
            .map(|(i, uri)| SimpleExtensionUri {
                extension_uri_anchor: i as u32 + 1,
                uri,
            })
            .collect();
        let declarations = self
            .functions
            .into_iter()
            .enumerate()
            .map(|(i, (name, uri_anchor))| SimpleExtensionDeclaration {
                mapping_type: Some(MappingType::ExtensionFunction(ExtensionFunction {
                    extension_uri_reference: uri_anchor,
                    function_anchor: i as u32 + 1,
                    name,
                    ..Default::default()
                })),
            })
            .collect();
        (uris, declarations)
    }
}

/// Anchor → declared function name, as read from a plan.
#[derive(Debug, Default)]
pub struct FunctionTable {
    functions: HashMap<u32, String>,
}

impl FunctionTable {
    /// Plans that declare no URIs (URN-only producers) skip the URI check.
    #[allow(deprecated)]
    pub fn from_extensions(
        uris: &[SimpleExtensionUri],
        extensions: &[SimpleExtensionDeclaration],
    ) -> Result<Self> {
        let declared: HashSet<u32> = uris.iter().map(|u| u.extension_uri_anchor).collect();
        let mut functions = HashMap::new();
        for declaration in extensions {
            // Type declarations are skipped; user-defined types fail in the type mapping.
            let Some(MappingType::ExtensionFunction(function)) = &declaration.mapping_type else {
                continue;
            };
            if !declared.is_empty() && !declared.contains(&function.extension_uri_reference) {
                return Err(SubstraitError::MalformedPlan(format!(
                    "function '{}' references undeclared extension URI {}",
                    function.name, function.extension_uri_reference
                )));
            }
            match functions.get(&function.function_anchor) {
                Some(existing) if existing != &function.name => {
                    return Err(SubstraitError::MalformedPlan(format!(
                        "function anchor {} declared as both '{}' and '{}'",
                        function.function_anchor, existing, function.name
                    )));
                }
                Some(_) => {}
                None => {
                    functions.insert(function.function_anchor, function.name.clone());
                }
            }
        }
        Ok(Self { functions })
    }

    /// Declared name for an anchor, without its signature suffix.
    pub fn base_name(&self, anchor: u32) -> Result<&str> {
        let name = self.functions.get(&anchor).ok_or_else(|| {
            SubstraitError::MalformedPlan(format!("function anchor {} is not declared", anchor))
        })?;
        Ok(name.split(':').next().unwrap_or(name))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
