//! Token stream to IR builder.
//!
//! The parser is a state machine with explicit `current_object`,
//! `current_attribute` and `current_enum` frames. Heading tokens finalize the
//! previous frame before opening the next one, so malformed frames surface as
//! errors at the point the document moves on. Unlike the validator, the
//! parser fails fast: structural faults here mean the IR cannot be built at
//! all.

use crate::codec::tokenizer::{Token, TokenKind};
use crate::error::MarkModelError;
use crate::model::{
    is_base_type, to_pascal_case, AttrDefault, AttrKind, Attribute, DataModel, Enumeration,
    Object,
};
use crate::remote::{prune_to, LibraryLoader, RemoteSpec, SchemaCache};

/// Parse a validated token stream into a [`DataModel`]. Remote type
/// declarations are rejected; use [`parse_with_loader`] to resolve them.
pub fn parse(tokens: &[Token]) -> Result<DataModel, MarkModelError> {
    ParserState::new(None, None).run(tokens)
}

/// Parse a validated token stream, resolving remote type declarations
/// through `loader` and memoizing fetched models in `cache`.
pub fn parse_with_loader(
    tokens: &[Token],
    loader: &dyn LibraryLoader,
    cache: &mut SchemaCache,
) -> Result<DataModel, MarkModelError> {
    ParserState::new(Some(loader), Some(cache)).run(tokens)
}

struct ParserState<'a> {
    model: DataModel,
    current_object: Option<Object>,
    current_attribute: Option<Attribute>,
    current_enum: Option<Enumeration>,
    loader: Option<&'a dyn LibraryLoader>,
    cache: Option<&'a mut SchemaCache>,
}

impl<'a> ParserState<'a> {
    fn new(
        loader: Option<&'a dyn LibraryLoader>,
        cache: Option<&'a mut SchemaCache>,
    ) -> ParserState<'a> {
        ParserState {
            model: DataModel::default(),
            current_object: None,
            current_attribute: None,
            current_enum: None,
            loader,
            cache,
        }
    }

    #[tracing::instrument(skip_all)]
    fn run(mut self, tokens: &[Token]) -> Result<DataModel, MarkModelError> {
        for (index, token) in tokens.iter().enumerate() {
            self.step(index, token)?;
        }
        self.resolve_kinds();
        self.record_compositions();
        tracing::debug!(
            objects = self.model.objects.len(),
            enums = self.model.enums.len(),
            "built model '{}'",
            self.model.name
        );
        Ok(self.model)
    }

    fn step(&mut self, index: usize, token: &Token) -> Result<(), MarkModelError> {
        match token.kind {
            TokenKind::Module => {
                self.model.name = token.content().to_string();
            }
            TokenKind::Object => {
                self.finalize_attribute()?;
                self.finalize_object();
                self.finalize_enum();
                if token.content().is_empty() {
                    return Err(MarkModelError::Parse(format!(
                        "object heading at token {index} has no name"
                    )));
                }
                self.current_object = Some(Object {
                    name: token.content().to_string(),
                    ..Default::default()
                });
            }
            TokenKind::Parent => {
                let object = self.current_object.as_mut().ok_or_else(|| {
                    MarkModelError::Parse(format!(
                        "inheritance marker at token {index} outside of an object"
                    ))
                })?;
                if object.parent.is_some() {
                    return Err(MarkModelError::Parse(format!(
                        "object '{}' declares more than one parent",
                        object.name
                    )));
                }
                object.parent = Some(token.content().to_string());
                self.model
                    .inherits
                    .push((token.content().to_string(), object.name.clone()));
            }
            TokenKind::Attribute => {
                self.finalize_attribute()?;
                if self.current_object.is_none() {
                    return Err(MarkModelError::Parse(format!(
                        "attribute '{}' declared outside of an object",
                        token.content()
                    )));
                }
                self.current_attribute = Some(Attribute {
                    name: token.content().to_string(),
                    ..Default::default()
                });
            }
            TokenKind::Required => {
                if let Some(attribute) = self.current_attribute.as_mut() {
                    attribute.required = true;
                }
            }
            TokenKind::Multiple => {
                if let Some(attribute) = self.current_attribute.as_mut() {
                    attribute.multiple = true;
                }
            }
            TokenKind::Type => self.handle_type(token.content())?,
            TokenKind::Reference => {
                if let Some(attribute) = self.current_attribute.as_mut() {
                    attribute.reference = Some(token.content().to_string());
                }
            }
            TokenKind::Option => {
                let Some((key, value)) = token.content().split_once(':') else {
                    return Err(MarkModelError::Parse(format!(
                        "malformed option '{}' at token {index}",
                        token.content()
                    )));
                };
                let key = key.trim().to_lowercase();
                let value = value.trim().to_string();
                if let Some(attribute) = self.current_attribute.as_mut() {
                    if key == "default" {
                        attribute.default = Some(AttrDefault::Scalar(value));
                    } else {
                        attribute.options.insert(key, value);
                    }
                } else {
                    tracing::warn!("dropping option '{key}' outside of an attribute");
                }
            }
            TokenKind::Description => {
                let content = token.content();
                if let Some(attribute) = self.current_attribute.as_mut() {
                    if attribute.description.is_empty() {
                        attribute.description = content.to_string();
                    } else {
                        attribute.description.push(' ');
                        attribute.description.push_str(content);
                    }
                } else if let Some(enumeration) = self.current_enum.as_mut() {
                    push_doc_line(&mut enumeration.docstring, content);
                } else if let Some(object) = self.current_object.as_mut() {
                    push_doc_line(&mut object.docstring, content);
                } else {
                    push_doc_line(&mut self.model.docstring, content);
                }
            }
            TokenKind::Enum => {
                self.finalize_attribute()?;
                self.finalize_object();
                self.finalize_enum();
                self.current_enum = Some(Enumeration {
                    name: token.content().to_string(),
                    ..Default::default()
                });
            }
            TokenKind::Mapping => {
                if let Some(enumeration) = self.current_enum.as_mut() {
                    let Some((key, value)) = token.content().split_once('=') else {
                        return Err(MarkModelError::Parse(format!(
                            "malformed enum mapping '{}' at token {index}",
                            token.content()
                        )));
                    };
                    enumeration.mappings.push((
                        key.trim().to_string(),
                        value.trim().trim_matches('"').to_string(),
                    ));
                }
            }
            TokenKind::EndOfModel => {
                self.finalize_attribute()?;
                self.finalize_object();
                self.finalize_enum();
            }
        }
        Ok(())
    }

    /// Append a type declaration to the current attribute, decomposing
    /// reference, small-type and remote syntax.
    fn handle_type(&mut self, content: &str) -> Result<(), MarkModelError> {
        if self.current_attribute.is_none() {
            return Err(MarkModelError::Parse(format!(
                "type '{content}' declared outside of an attribute"
            )));
        }
        if let Some(remote) = RemoteSpec::parse(content) {
            return self.handle_remote_type(remote?);
        }
        if content.starts_with('{') {
            return self.handle_small_type(content);
        }
        let attribute = self.attribute_mut(content)?;
        if let Some(target) = content.strip_prefix('@') {
            // Reference attribute: stored as a plain string, the target is
            // kept as a soft foreign-key constraint.
            attribute.reference = Some(target.to_string());
            attribute.dtypes.push("string".to_string());
        } else {
            attribute.dtypes.push(content.to_string());
        }
        Ok(())
    }

    fn handle_remote_type(&mut self, spec: RemoteSpec) -> Result<(), MarkModelError> {
        let (Some(loader), Some(cache)) = (self.loader, self.cache.as_deref_mut()) else {
            return Err(MarkModelError::Remote(format!(
                "remote type '{}' requires a schema loader",
                spec.object
            )));
        };
        let remote = cache.resolve(&spec, loader)?;
        let pruned = prune_to(remote, &spec.object)?;
        let slot = self
            .model
            .external_objects
            .entry(spec.address.to_string())
            .or_default();
        for object in pruned {
            if !slot.iter().any(|o| o.name == object.name) {
                slot.push(object);
            }
        }
        if let Some(attribute) = self.current_attribute.as_mut() {
            attribute.dtypes.push(spec.object);
        }
        Ok(())
    }

    fn attribute_mut(&mut self, context: &str) -> Result<&mut Attribute, MarkModelError> {
        self.current_attribute.as_mut().ok_or_else(|| {
            MarkModelError::Parse(format!("type '{context}' declared outside of an attribute"))
        })
    }

    /// Parse `{name: type, ...}` into a synthetic subtype object owned by the
    /// enclosing object and named after the attribute.
    fn handle_small_type(&mut self, content: &str) -> Result<(), MarkModelError> {
        let inner = content
            .strip_prefix('{')
            .and_then(|c| c.strip_suffix('}'))
            .ok_or_else(|| {
                MarkModelError::Parse(format!("malformed small type '{content}'"))
            })?;
        let attribute = self.attribute_mut(content)?;
        let subtype_name = to_pascal_case(&attribute.name);
        let mut subtype = Object {
            name: subtype_name.clone(),
            ..Default::default()
        };
        for field in inner.split(',') {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            let (name, dtype) = field.split_once(':').ok_or_else(|| {
                MarkModelError::Parse(format!(
                    "small type field '{field}' is missing a type"
                ))
            })?;
            subtype.attributes.push(Attribute {
                name: name.trim().to_string(),
                dtypes: vec![dtype.trim().to_string()],
                ..Default::default()
            });
        }
        if subtype.attributes.is_empty() {
            return Err(MarkModelError::Parse(format!(
                "small type on attribute '{}' has no fields",
                attribute.name
            )));
        }
        attribute.dtypes.push(subtype_name.clone());
        attribute.default = Some(AttrDefault::SubtypeFactory(subtype_name));
        let object = self.current_object.as_mut().ok_or_else(|| {
            MarkModelError::Parse(format!("small type '{content}' outside of an object"))
        })?;
        object.subtypes.push(subtype);
        Ok(())
    }

    /// Close the open attribute, rejecting it when mandatory fields are
    /// missing, and normalize its default against the required and multiple
    /// flags.
    fn finalize_attribute(&mut self) -> Result<(), MarkModelError> {
        let Some(mut attribute) = self.current_attribute.take() else {
            return Ok(());
        };
        let object_name = self
            .current_object
            .as_ref()
            .map(|o| o.name.as_str())
            .unwrap_or_default();
        if attribute.dtypes.is_empty() {
            return Err(MarkModelError::Parse(format!(
                "attribute '{}' of object '{object_name}' has no type",
                attribute.name
            )));
        }
        if attribute.description.is_empty() {
            return Err(MarkModelError::Parse(format!(
                "attribute '{}' of object '{object_name}' has no description",
                attribute.name
            )));
        }
        if attribute.required {
            attribute.default = None;
        } else if attribute.multiple {
            attribute.default = Some(AttrDefault::ListFactory);
        }
        if let Some(object) = self.current_object.as_mut() {
            object.attributes.push(attribute);
        }
        Ok(())
    }

    fn finalize_object(&mut self) {
        if let Some(object) = self.current_object.take() {
            self.model.objects.push(object);
        }
    }

    fn finalize_enum(&mut self) {
        if let Some(enumeration) = self.current_enum.take() {
            self.model.enums.push(enumeration);
        }
    }

    /// Decide each attribute's storage shape now that every object and enum
    /// of the module is known.
    fn resolve_kinds(&mut self) {
        let object_names: Vec<String> = self
            .model
            .objects
            .iter()
            .flat_map(|o| std::iter::once(o.name.clone()).chain(o.subtypes.iter().map(|s| s.name.clone())))
            .chain(
                self.model
                    .external_objects
                    .values()
                    .flat_map(|objs| objs.iter().map(|o| o.name.clone())),
            )
            .collect();
        let enum_names: Vec<String> = self.model.enums.iter().map(|e| e.name.clone()).collect();
        for object in &mut self.model.objects {
            for attribute in object
                .attributes
                .iter_mut()
                .chain(object.subtypes.iter_mut().flat_map(|s| s.attributes.iter_mut()))
            {
                let is_object = attribute
                    .dtypes
                    .iter()
                    .any(|d| object_names.contains(d));
                let is_enum = attribute.dtypes.iter().any(|d| enum_names.contains(d));
                attribute.kind = match (attribute.multiple, is_object, is_enum) {
                    (true, true, _) => AttrKind::ListOfObject,
                    (true, false, _) => AttrKind::ListOfScalar,
                    (false, true, _) => AttrKind::Object,
                    (false, false, true) => AttrKind::Enumeration,
                    (false, false, false) => AttrKind::Scalar,
                };
            }
        }
    }

    /// Record a composition edge for every attribute whose type names another
    /// defined object, local or external.
    fn record_compositions(&mut self) {
        let mut edges = Vec::new();
        for object in &self.model.objects {
            for attribute in &object.attributes {
                for dtype in &attribute.dtypes {
                    if is_base_type(dtype) || self.model.enumeration(dtype).is_some() {
                        continue;
                    }
                    if self.model.object(dtype).is_some() {
                        edges.push((object.name.clone(), dtype.clone()));
                    }
                }
            }
        }
        edges.dedup();
        self.model.compositions = edges;
    }
}

fn push_doc_line(docstring: &mut String, line: &str) {
    if !docstring.is_empty() {
        docstring.push('\n');
    }
    docstring.push_str(line);
}
