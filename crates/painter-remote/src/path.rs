/// Canonical form for paths sent to the remote side: surrounding quotes and
/// whitespace trimmed, forward slashes, runs of slashes collapsed. A leading
/// `//` (network share) is kept.
pub fn normalize_remote_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('"').trim();
    let forward = trimmed.replace('\\', "/");
    let (prefix, rest) = match forward.strip_prefix("//") {
        Some(rest) => ("//", rest),
        None => ("", forward.as_str()),
    };
    let mut out = String::with_capacity(forward.len());
    out.push_str(prefix);
    let mut previous_slash = false;
    for c in rest.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_windows_paths() {
        assert_eq!(
            normalize_remote_path(" \"D:\\out\\\\model.spp\" "),
            "D:/out/model.spp"
        );
    }

    #[test]
    fn keeps_network_share_prefix() {
        assert_eq!(
            normalize_remote_path("\\\\server\\share\\\\a.png"),
            "//server/share/a.png"
        );
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(normalize_remote_path("  "), "");
    }
}
