//! Generic recursive traversal over the token tree
//!
//! The walker visits every token pre-order: parent before children, siblings
//! in document order. Per-token traversal priority:
//! 1. Tables: header cells in column order, then body rows row-major.
//! 2. Lists: item tokens in document order (items recurse again into their
//!    own nested fields).
//! 3. Extension-declared child-token fields for this kind, in declaration
//!    order, resolved through [`Token::named_children_mut`].
//! 4. The generic nested `tokens` field.
//! 5. Otherwise the token is a leaf.
//!
//! Visitor results from the token and all sub-walks are flattened into one
//! sequence in visitation order; the async dispatch path uses that sequence
//! to wait on every outstanding mutation.

use crate::extensions::ExtensionRegistry;
use crate::token::Token;

/// Walk `tokens`, invoking `visit` once per token, and collect the results
/// in visitation order.
pub fn walk<T, F>(tokens: &mut [Token], registry: &ExtensionRegistry, visit: &mut F) -> Vec<T>
where
    F: FnMut(&mut Token) -> T,
{
    let mut values = Vec::new();
    walk_into(tokens, registry, visit, &mut values);
    values
}

fn walk_into<T, F>(
    tokens: &mut [Token],
    registry: &ExtensionRegistry,
    visit: &mut F,
    values: &mut Vec<T>,
) where
    F: FnMut(&mut Token) -> T,
{
    for token in tokens {
        values.push(visit(token));

        match token {
            Token::Table { header, rows, .. } => {
                for cell in header.iter_mut() {
                    walk_into(&mut cell.tokens, registry, visit, values);
                }
                for row in rows.iter_mut() {
                    for cell in row.iter_mut() {
                        walk_into(&mut cell.tokens, registry, visit, values);
                    }
                }
            }
            Token::List { items, .. } => {
                walk_into(items, registry, visit, values);
            }
            _ => {
                let declared = registry.child_fields(token.kind()).map(|f| f.to_vec());
                if let Some(fields) = declared {
                    for field in &fields {
                        if let Some(children) = token.named_children_mut(field) {
                            walk_into(children, registry, visit, values);
                        }
                    }
                } else if let Some(nested) = token.nested_tokens_mut() {
                    walk_into(nested, registry, visit, values);
                }
            }
        }
    }
}
