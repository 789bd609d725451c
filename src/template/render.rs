//! `{name}` placeholder substitution.
//!
//! `{{` and `}}` produce literal braces. A `{` that does not start a
//! well-formed `{identifier}` is copied through unchanged, so JSON examples
//! inside prompt bodies survive; an identifier left open at the end of the
//! body is malformed.

use crate::template::TemplateError;
use std::collections::BTreeMap;

pub type Variables = BTreeMap<String, String>;

#[derive(Debug, PartialEq)]
enum Piece<'a> {
    Text(&'a str),
    Var(&'a str),
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize<'a>(template: &str, body: &'a str) -> Result<Vec<Piece<'a>>, TemplateError> {
    let mut pieces = Vec::new();
    let bytes = body.as_bytes();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                pieces.push(Piece::Text(&body[text_start..=i]));
                i += 2;
                text_start = i;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                pieces.push(Piece::Text(&body[text_start..=i]));
                i += 2;
                text_start = i;
            }
            b'{' => {
                let rest = &body[i + 1..];
                let ident_len = rest.find(|c: char| !is_ident(c)).unwrap_or(rest.len());
                match rest[ident_len..].chars().next() {
                    Some('}') if ident_len > 0 => {
                        pieces.push(Piece::Text(&body[text_start..i]));
                        pieces.push(Piece::Var(&rest[..ident_len]));
                        i += ident_len + 2;
                        text_start = i;
                    }
                    None if ident_len > 0 => {
                        return Err(TemplateError::Malformed {
                            template: template.to_string(),
                            message: format!("unterminated placeholder {{{}", &rest[..ident_len]),
                        });
                    }
                    _ => i += 1,
                }
            }
            _ => i += 1,
        }
    }
    pieces.push(Piece::Text(&body[text_start..]));
    Ok(pieces)
}

/// Substitutes every placeholder in `body`; `template` names it in errors.
pub fn render_named(
    template: &str,
    body: &str,
    variables: &Variables,
) -> Result<String, TemplateError> {
    let pieces = tokenize(template, body)?;
    let mut out = String::with_capacity(body.len());
    for piece in pieces {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Var(name) => {
                let value = variables
                    .get(name)
                    .ok_or_else(|| TemplateError::MissingVariable {
                        template: template.to_string(),
                        variable: name.to_string(),
                    })?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}

/// Substitutes every placeholder in `body`.
pub fn render(body: &str, variables: &Variables) -> Result<String, TemplateError> {
    render_named("<inline>", body, variables)
}

/// Placeholder names in order of first appearance.
pub fn declared_variables(body: &str) -> Result<Vec<String>, TemplateError> {
    let mut names: Vec<String> = Vec::new();
    for piece in tokenize("<inline>", body)? {
        if let Piece::Var(name) = piece
            && !names.iter().any(|n| n == name)
        {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_placeholders() {
        let out = render("Hello {name}, see {doc}.", &vars(&[("name", "Ada"), ("doc", "x")])).unwrap();
        assert_eq!(out, "Hello Ada, see x.");
    }

    #[test]
    fn repeated_placeholder() {
        let out = render("{a}-{a}", &vars(&[("a", "1")])).unwrap();
        assert_eq!(out, "1-1");
    }

    #[test]
    fn missing_variable_is_error() {
        let err = render_named("analysis/x", "Report: {analysis_report}", &Variables::new()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingVariable {
                template: "analysis/x".to_string(),
                variable: "analysis_report".to_string(),
            }
        );
    }

    #[test]
    fn escaped_braces() {
        let out = render("{{literal}} {v}", &vars(&[("v", "ok")])).unwrap();
        assert_eq!(out, "{literal} ok");
    }

    #[test]
    fn json_braces_pass_through() {
        let body = r#"Return JSON like {"score": 1} for {name}"#;
        let out = render(body, &vars(&[("name", "me")])).unwrap();
        assert_eq!(out, r#"Return JSON like {"score": 1} for me"#);
    }

    #[test]
    fn unterminated_placeholder_is_malformed() {
        let err = render("Dear {client", &vars(&[("client", "x")])).unwrap_err();
        assert!(matches!(err, TemplateError::Malformed { .. }));
    }

    #[test]
    fn values_are_not_rescanned() {
        let out = render("{a}", &vars(&[("a", "{b}")])).unwrap();
        assert_eq!(out, "{b}");
    }

    #[test]
    fn declared_variables_in_order() {
        let names = declared_variables("{b} {a} {{c}} {b} {\"json\": 1}").unwrap();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn multibyte_text_around_placeholders() {
        let out = render("客户：{client}。", &vars(&[("client", "张三")])).unwrap();
        assert_eq!(out, "客户：张三。");
    }
}
