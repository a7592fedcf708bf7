//! Route pattern normalization and splitting.
//!
//! A pattern string is first cleaned lexically (duplicate slashes, `.`
//! and `..` components), then cut into tokens: maximal static runs,
//! single-segment parameters (`:`) and the trailing catch-all (`*`).
//!
//! Token boundary rules:
//!
//! - the first token is always a static run starting with `/`, so the
//!   tree root is always a static node;
//! - a static run immediately before a `:`/`*` token ends with `/`;
//! - a static run immediately after a `:`/`*` token does *not* start
//!   with `/` — matching consumes that separator as the capture
//!   boundary.
//!
//! `split_pattern("a/b/c/:/*/a")` is `["/a/b/c/", ":", "*", "a"]`.

use std::fmt;

/// One token of a split route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternToken {
    /// A literal run of one or more path segments.
    Static(String),
    /// A single-segment parameter (`:`); any trailing name is discarded.
    Param,
    /// The trailing catch-all (`*`).
    CatchAll,
}

impl PatternToken {
    /// The node label this token produces in the tree.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Static(run) => run,
            Self::Param => ":",
            Self::CatchAll => "*",
        }
    }

    /// True for `:` and `*` tokens.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Param | Self::CatchAll)
    }
}

impl fmt::Display for PatternToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lexically clean a path: collapse duplicate slashes, drop `.`
/// components and resolve `..` against preceding segments.
///
/// Degenerate inputs (`""`, `"."`, `"/"`, `"//"`) clean to `""` or `"/"`.
#[must_use]
pub fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            _ => segments.push(segment),
        }
    }
    let joined = segments.join("/");
    if rooted {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Split a route pattern into tokens.
///
/// The result is never empty; patterns that clean to nothing or to `/`
/// yield the single token `/`.
#[must_use]
pub fn split_pattern(pattern: &str) -> Vec<PatternToken> {
    let cleaned = clean(pattern);
    if cleaned.is_empty() || cleaned == "/" {
        return vec![PatternToken::Static("/".to_owned())];
    }
    let cleaned = cleaned.strip_prefix('/').unwrap_or(&cleaned);

    let mut tokens = Vec::new();
    let mut run = String::new();
    let mut in_static = true;
    for segment in cleaned.split('/') {
        let marker = match segment.as_bytes().first() {
            Some(b':') => PatternToken::Param,
            Some(b'*') => PatternToken::CatchAll,
            _ => {
                if in_static {
                    run.push('/');
                } else {
                    in_static = true;
                }
                run.push_str(segment);
                continue;
            }
        };
        if in_static {
            run.push('/');
            in_static = false;
        }
        if !run.is_empty() {
            tokens.push(PatternToken::Static(std::mem::take(&mut run)));
        }
        tokens.push(marker);
    }
    if !run.is_empty() {
        tokens.push(PatternToken::Static(run));
    }
    tokens
}

/// Length of the longest common prefix of `a` and `b`, in bytes.
#[must_use]
pub(crate) fn common_prefix_len(a: &str, b: &str) -> usize {
    a.as_bytes()
        .iter()
        .zip(b.as_bytes())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Longest common prefix length that ends on a character boundary.
///
/// Labels are UTF-8 strings, so a split point inside a multi-byte
/// character has to back off to the previous boundary. Zero means the
/// strings share no complete character and cannot be split apart.
#[must_use]
pub(crate) fn common_prefix_boundary(a: &str, b: &str) -> usize {
    let mut keep = common_prefix_len(a, b);
    // Shared bytes make the boundary structure of both strings agree
    // below `keep`, so checking one of them is enough.
    while keep > 0 && !a.is_char_boundary(keep) {
        keep -= 1;
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_token(run: &str) -> PatternToken {
        PatternToken::Static(run.to_owned())
    }

    #[test]
    fn clean_collapses_slashes_and_dots() {
        assert_eq!(clean("/a//b"), "/a/b");
        assert_eq!(clean("/a/./b"), "/a/b");
        assert_eq!(clean("/a/../b"), "/b");
        assert_eq!(clean("/a/b/"), "/a/b");
        assert_eq!(clean("/.."), "/");
        assert_eq!(clean("/"), "/");
        assert_eq!(clean(""), "");
        assert_eq!(clean("."), "");
    }

    #[test]
    fn clean_keeps_relative_parent_refs() {
        assert_eq!(clean("../a"), "../a");
        assert_eq!(clean("a/b/c"), "a/b/c");
    }

    #[test]
    fn degenerate_patterns_yield_root_token() {
        assert_eq!(split_pattern(""), vec![static_token("/")]);
        assert_eq!(split_pattern("/"), vec![static_token("/")]);
        assert_eq!(split_pattern("//"), vec![static_token("/")]);
    }

    #[test]
    fn static_segments_coalesce_into_one_run() {
        assert_eq!(split_pattern("/users"), vec![static_token("/users")]);
        assert_eq!(split_pattern("a/b/c"), vec![static_token("/a/b/c")]);
    }

    #[test]
    fn mixed_pattern_boundaries() {
        assert_eq!(
            split_pattern("a/b/c/:/*/a"),
            vec![
                static_token("/a/b/c/"),
                PatternToken::Param,
                PatternToken::CatchAll,
                static_token("a"),
            ]
        );
    }

    #[test]
    fn leading_placeholder_gets_root_run() {
        assert_eq!(
            split_pattern(":/a/b/*123/"),
            vec![
                static_token("/"),
                PatternToken::Param,
                static_token("a/b/"),
                PatternToken::CatchAll,
            ]
        );
    }

    #[test]
    fn param_names_are_discarded() {
        assert_eq!(
            split_pattern("/users/:id/posts"),
            vec![
                static_token("/users/"),
                PatternToken::Param,
                static_token("posts"),
            ]
        );
    }

    #[test]
    fn chained_placeholders_produce_no_empty_runs() {
        assert_eq!(
            split_pattern("/3/:/5/:/*"),
            vec![
                static_token("/3/"),
                PatternToken::Param,
                static_token("5/"),
                PatternToken::Param,
                PatternToken::CatchAll,
            ]
        );
    }

    #[test]
    fn common_prefix_lengths() {
        assert_eq!(common_prefix_len("abc4", "abc123"), 3);
        assert_eq!(common_prefix_len("abc4", "bc123"), 0);
        assert_eq!(common_prefix_len("/0", "/"), 1);
        assert_eq!(common_prefix_len("same", "same"), 4);
    }

    #[test]
    fn common_prefix_backs_off_to_char_boundaries() {
        // "é" and "è" share their UTF-8 lead byte only.
        assert_eq!(common_prefix_boundary("/café", "/cafè"), 4);
        assert_eq!(common_prefix_boundary("é1", "è2"), 0);
        assert_eq!(common_prefix_boundary("abc4", "abc123"), 3);
    }
}
