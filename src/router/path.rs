//! Slash-delimited target path helpers

/// Join two target paths, normalising separators and `.`/`..` segments.
///
/// Empty components are ignored, so `join("", "deb") == "deb"` and
/// `join("jammy", "") == "jammy"`.
pub fn join(base: &str, name: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for seg in base.split('/').chain(name.split('/')) {
        match seg {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            seg => out.push(seg),
        }
    }
    out.join("/")
}

/// Proper prefixes of `target` at segment boundaries, longest first.
///
/// `prefixes("a/b/c")` yields `"a/b"` then `"a"`.
pub fn prefixes(target: &str) -> impl Iterator<Item = &str> {
    target
        .char_indices()
        .rev()
        .filter(|&(_, c)| c == '/')
        .map(move |(i, _)| &target[..i])
        .filter(|p| !p.is_empty())
}

/// Parent path of a target, empty for a top-level name
pub fn group_of(name: &str) -> &str {
    name.rsplit_once('/').map_or("", |(group, _)| group)
}

/// Remove a matched prefix and the separator that follows it
pub fn trim_prefix<'a>(target: &'a str, prefix: &str) -> &'a str {
    let rest = target.strip_prefix(prefix).unwrap_or(target);
    rest.strip_prefix('/').unwrap_or(rest)
}
