//! # markmodel
//!
//! A Rust library for turning Markdown data-model descriptions into a validated,
//! serializable intermediate representation, and for re-linking instance data
//! between two such models.
//!
//! ## Overview
//!
//! markmodel consumes a constrained Markdown dialect in which headings declare
//! modules, objects and enumerations, and list items declare attributes with
//! their types and options. It produces a [`model::DataModel`]: a pure data
//! structure holding objects, attributes, enumerations, inheritance edges and
//! composition edges, ready for consumption by a code emitter.
//!
//! The pipeline has three stages:
//!
//! 1. **Tokenize** ([`codec::tokenizer`]): regex-driven line substitution turns
//!    heading and list markup into a flat `(TokenKind, content)` stream.
//! 2. **Validate** ([`codec::validator`]): the stream is checked against a
//!    declarative rule tree ([`codec::grammar`]) of per-token-kind ordering and
//!    occurrence constraints. All findings are collected into a structured
//!    report before anything is treated as fatal.
//! 3. **Parse** ([`codec::parser`]): a stateful walker over the same stream
//!    accumulates the object/attribute/enum IR, resolving inline sub-types,
//!    reference attributes and remote type imports along the way.
//!
//! Separately, the [`linker`] module maps concrete indexed instance paths
//! (`measurements/0/values/2`) from one schema onto another schema's meta-paths
//! and reassembles a nested instance tree with collision-free, order-preserving
//! index allocation.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use markmodel::codec::compile;
//!
//! fn main() -> Result<(), markmodel::MarkModelError> {
//!     let markdown = std::fs::read_to_string("model.md")?;
//!     let model = compile(&markdown)?;
//!     for object in &model.objects {
//!         println!("{}: {} attributes", object.name, object.attributes.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module guide
//!
//! - [`codec`]: tokenizer, grammar, validator, parser and the `compile` entry point
//! - [`model`]: the IR types and the built-in primitive type registry
//! - [`linker`]: guide trees, indexed/meta paths and instance re-linking
//! - [`remote`]: remote schema loading seam and the content-addressed cache
//! - [`error`]: the crate-wide [`MarkModelError`]

pub mod codec;
pub mod error;
pub mod linker;
pub mod model;
pub mod remote;

pub use error::*;
