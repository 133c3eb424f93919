//! `{name}` placeholder substitution for path templates.
//!
//! Templates use brace placeholders (`{doc}/{file}`), with `{{` and `}}` as
//! literal braces. Every placeholder must be bound; an unbound name is a
//! configuration error and never renders as an empty string.

use crate::bindings::NameBindings;
use crate::error::TemplateError;

pub fn render(template: &str, bindings: &NameBindings) -> Result<String, TemplateError> {
    let mut rendered = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((position, ch)) = chars.next() {
        match ch {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    rendered.push('{');
                    continue;
                }

                let mut field = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    field.push(inner);
                }
                if !closed {
                    return Err(TemplateError::Unclosed {
                        position,
                        template: template.to_string(),
                    });
                }

                let value = lookup(&field, template, bindings)?;
                rendered.push_str(value);
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    rendered.push('}');
                    continue;
                }
                return Err(TemplateError::StrayClose {
                    position,
                    template: template.to_string(),
                });
            }
            other => rendered.push(other),
        }
    }

    Ok(rendered)
}

/// Names referenced by a template, in order of appearance.
pub fn placeholders(template: &str) -> Result<Vec<String>, TemplateError> {
    let mut names = Vec::new();
    let mut chars = template.char_indices().peekable();
    while let Some((position, ch)) = chars.next() {
        match ch {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
            }
            '{' => {
                let Some(length) = template[position + 1..].find('}') else {
                    return Err(TemplateError::Unclosed {
                        position,
                        template: template.to_string(),
                    });
                };
                let field = &template[position + 1..position + 1 + length];
                validate_field(field, template)?;
                chars.by_ref().take_while(|(_, inner)| *inner != '}').count();
                names.push(field.to_string());
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
            }
            '}' => {
                return Err(TemplateError::StrayClose {
                    position,
                    template: template.to_string(),
                });
            }
            _ => {}
        }
    }
    Ok(names)
}

fn lookup<'a>(
    field: &str,
    template: &str,
    bindings: &'a NameBindings,
) -> Result<&'a str, TemplateError> {
    validate_field(field, template)?;
    bindings
        .get(field)
        .ok_or_else(|| TemplateError::MissingName {
            name: field.to_string(),
            template: template.to_string(),
        })
}

fn validate_field(field: &str, template: &str) -> Result<(), TemplateError> {
    let is_identifier = field
        .chars()
        .next()
        .is_some_and(|first| first.is_alphabetic() || first == '_')
        && field.chars().all(|ch| ch.is_alphanumeric() || ch == '_');

    if is_identifier {
        Ok(())
    } else {
        Err(TemplateError::UnsupportedField {
            field: field.to_string(),
            template: template.to_string(),
        })
    }
}
