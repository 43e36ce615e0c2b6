/// Replace `${ENV_VAR}` placeholders in a raw config file.
///
/// Unset variables and unterminated placeholders are kept verbatim so a
/// missing secret shows up as an obviously-wrong literal instead of an empty
/// string.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated: emit the remainder untouched.
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match (!name.is_empty()).then(|| lookup(name)).flatten() {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake(name: &str) -> Option<String> {
        match name {
            "SERVICE_TOKEN" => Some("svc-123".into()),
            "PORT" => Some("8080".into()),
            _ => None,
        }
    }

    #[test]
    fn replaces_known_placeholders() {
        assert_eq!(
            substitute_with("token = \"${SERVICE_TOKEN}\"\nport = ${PORT}", fake),
            "token = \"svc-123\"\nport = 8080"
        );
    }

    #[test]
    fn keeps_unknown_placeholder() {
        assert_eq!(substitute_with("x=${NOPE}", fake), "x=${NOPE}");
    }

    #[test]
    fn keeps_unterminated_placeholder() {
        assert_eq!(substitute_with("x=${PORT", fake), "x=${PORT");
    }

    #[test]
    fn empty_name_is_literal() {
        assert_eq!(substitute_with("a${}b", fake), "a${}b");
    }

    #[test]
    fn reads_process_environment() {
        assert_eq!(
            substitute_env("${AGENTGATE_SURELY_UNSET_VAR_XYZ}"),
            "${AGENTGATE_SURELY_UNSET_VAR_XYZ}"
        );
        assert_eq!(substitute_env("no placeholders"), "no placeholders");
    }
}
