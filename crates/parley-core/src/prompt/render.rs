//! `$name` / `${name}` placeholder substitution.
//!
//! Identifiers are ASCII letters, digits and underscores, not starting with
//! a digit. `$$` yields a literal `$`. A `$` followed by anything else is
//! kept as is.

use parley_types::context::ContextVars;
use parley_types::error::RenderError;

/// Render `template` against `vars`.
///
/// Every key in `required` must be present in `vars`; the first missing one
/// (in declaration order) is reported before any substitution happens.
pub fn render(
    template: &str,
    vars: &ContextVars,
    required: &[String],
) -> Result<String, RenderError> {
    if let Some(missing) = required.iter().find(|k| !vars.contains_key(k.as_str())) {
        return Err(RenderError::MissingContextVariable(missing.clone()));
    }

    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }

        out.push_str(&template[literal_start..i]);
        let next = bytes.get(i + 1).copied();

        match next {
            Some(b'$') => {
                out.push('$');
                i += 2;
            }
            Some(b'{') => {
                let start = i + 2;
                let close = template[start..]
                    .find('}')
                    .map(|offset| start + offset)
                    .ok_or(RenderError::MalformedPlaceholder(i))?;
                let name = &template[start..close];
                if !is_identifier(name) {
                    return Err(RenderError::MalformedPlaceholder(i));
                }
                out.push_str(&lookup(vars, name)?);
                i = close + 1;
            }
            Some(c) if is_ident_start(c) => {
                let start = i + 1;
                let end = bytes[start..]
                    .iter()
                    .position(|b| !is_ident_continue(*b))
                    .map_or(bytes.len(), |offset| start + offset);
                out.push_str(&lookup(vars, &template[start..end])?);
                i = end;
            }
            _ => {
                out.push('$');
                i += 1;
            }
        }
        literal_start = i;
    }

    out.push_str(&template[literal_start..]);
    Ok(out)
}

fn lookup(vars: &ContextVars, name: &str) -> Result<String, RenderError> {
    match vars.get(name) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(RenderError::UnresolvedPlaceholder(name.to_string())),
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_identifier(name: &str) -> bool {
    let mut bytes = name.bytes();
    bytes.next().is_some_and(is_ident_start) && bytes.all(is_ident_continue)
}
