//! The document pipeline: tokenize, validate, parse.
//!
//! [`compile`] is the standard entry point. It runs the three stages in
//! order and refuses to hand a token stream to the IR builder when the
//! validator produced any finding, so a caller either gets a well-formed
//! [`DataModel`](crate::model::DataModel) or a report naming every fault.

pub mod grammar;
pub mod parser;
pub mod tokenizer;
pub mod validator;

use once_cell::sync::Lazy;

use crate::error::MarkModelError;
use crate::model::DataModel;
use crate::remote::{LibraryLoader, SchemaCache};

/// The rule tree is immutable after construction and shared across every
/// validation run in the process.
static RULE_TREE: Lazy<grammar::RuleTree> =
    Lazy::new(|| grammar::RuleTree::compile().expect("grammar rule table is well-formed"));

/// Compile a model document into its IR. Any validation finding is fatal and
/// carries the full rendered report.
#[tracing::instrument(skip_all)]
pub fn compile(text: &str) -> Result<DataModel, MarkModelError> {
    let tokens = tokenizer::tokenize(text);
    check(&tokens)?;
    parser::parse(&tokens)
}

/// Like [`compile`], resolving remote type declarations through `loader`.
#[tracing::instrument(skip_all)]
pub fn compile_with_loader(
    text: &str,
    loader: &dyn LibraryLoader,
    cache: &mut SchemaCache,
) -> Result<DataModel, MarkModelError> {
    let tokens = tokenizer::tokenize(text);
    check(&tokens)?;
    parser::parse_with_loader(&tokens, loader, cache)
}

fn check(tokens: &[tokenizer::Token]) -> Result<(), MarkModelError> {
    let report = validator::validate(tokens, &RULE_TREE);
    if report.is_valid() {
        Ok(())
    } else {
        Err(MarkModelError::Validation {
            count: report.findings.len(),
            report: report.render(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_valid_document() {
        let model = compile(
            "# Chemistry\n\n### Sample\n\n- __name__\n  - Type: string\n  - Description: n\n",
        )
        .unwrap();
        assert_eq!(model.name, "Chemistry");
        assert_eq!(model.objects.len(), 1);
    }

    #[test]
    fn test_compile_rejects_invalid_document() {
        let err = compile("# Chemistry\n\n### Sample\n\n- __name__\n  - Type: string\n")
            .unwrap_err();
        match err {
            MarkModelError::Validation { count, report } => {
                assert_eq!(count, 1);
                assert!(report.contains("Object Sample"));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }
}
