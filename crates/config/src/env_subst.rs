/// Expand `${VAR}` and `${VAR:-fallback}` placeholders from the process
/// environment. Unresolved placeholders without a fallback stay literal.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Same as [`substitute_env`] with an explicit variable lookup.
pub fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated: keep the remainder verbatim.
            out.push_str(&rest[start..]);
            return out;
        };

        let body = &after[..end];
        let (name, fallback) = match body.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (body, None),
        };
        match (name.is_empty(), lookup(name), fallback) {
            (false, Some(value), _) => out.push_str(&value),
            (false, None, Some(fallback)) => out.push_str(fallback),
            _ => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn vars(name: &str) -> Option<String> {
        match name {
            "RAG_HOST" => Some("rag.internal".into()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_with("url = \"http://${RAG_HOST}:8000\"", vars),
            "url = \"http://rag.internal:8000\""
        );
        assert_eq!(substitute_with("x${EMPTY}y", vars), "xy");
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_with("token = \"${RAG_STUDIO_MISSING}\"", vars),
            "token = \"${RAG_STUDIO_MISSING}\""
        );
    }

    #[test]
    fn uses_fallback_when_unset() {
        assert_eq!(substitute_with("${NOPE:-localhost}", vars), "localhost");
        assert_eq!(substitute_with("${RAG_HOST:-localhost}", vars), "rag.internal");
    }

    #[test]
    fn malformed_placeholders_stay_literal() {
        assert_eq!(substitute_with("${}", vars), "${}");
        assert_eq!(substitute_with("a ${RAG_HOST", vars), "a ${RAG_HOST");
        assert_eq!(substitute_with("cost: $5", vars), "cost: $5");
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_with("plain text", vars), "plain text");
    }
}
