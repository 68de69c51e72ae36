// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Dot-segment decomposition of the syslog hostname into
//! `(org, space, app)`, ported from `Parser.ParseHost`.

/// `a` -> `("", "", "a")`; `a.b` -> `("a", "b", "")`; `a.b.c.d` -> `("a",
/// "b", "c.d")` — everything past the second dot is rejoined verbatim so
/// an app name containing dots survives.
pub fn parse_host(hostname: &str) -> (String, String, String) {
    let segments: Vec<&str> = hostname.split('.').collect();
    match segments.len() {
        0 => (String::new(), String::new(), String::new()),
        1 => (String::new(), String::new(), segments[0].to_string()),
        2 => (segments[0].to_string(), segments[1].to_string(), String::new()),
        _ => (
            segments[0].to_string(),
            segments[1].to_string(),
            segments[2..].join("."),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_segment_is_app_only() {
        assert_eq!(parse_host("myapp"), ("".into(), "".into(), "myapp".into()));
    }

    #[test]
    fn two_segments_are_org_and_space() {
        assert_eq!(
            parse_host("myorg.myspace"),
            ("myorg".into(), "myspace".into(), "".into())
        );
    }

    #[test]
    fn three_plus_segments_rejoin_the_tail() {
        assert_eq!(
            parse_host("myorg.myspace.my.app"),
            ("myorg".into(), "myspace".into(), "my.app".into())
        );
    }
}
