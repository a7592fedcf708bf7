//! Error types.

use std::fmt;

/// Error returned when a route cannot be registered.
///
/// Registration fails fast: when any variant is returned the tree is
/// left exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// The method string is not one of the nine recognized methods.
    InvalidMethod {
        /// The rejected method string.
        method: String,
    },
    /// A token was added after a catch-all, which must stay terminal.
    CatchAllTerminal {
        /// The token that could not be added.
        token: String,
        /// Full path of the catch-all node it was added to.
        at: String,
    },
    /// The parent already has a placeholder child of the other kind.
    ParamKindConflict {
        /// The token that could not be added.
        token: String,
        /// Full path of the parent node.
        at: String,
        /// Label of the existing placeholder child (`:` or `*`).
        existing: String,
    },
    /// A placeholder and static children cannot share a parent.
    KindExclusion {
        /// The token that could not be added.
        token: String,
        /// Full path of the parent node.
        at: String,
        /// Label of the conflicting existing child.
        existing: String,
    },
    /// The pattern diverges from an existing route inside a multi-byte
    /// character, so there is no split point.
    PathParse {
        /// The token that could not be added.
        token: String,
        /// Full path of the node it diverged from.
        at: String,
    },
}

impl RouteError {
    pub(crate) fn invalid_method(method: &str) -> Self {
        Self::InvalidMethod {
            method: method.to_owned(),
        }
    }

    pub(crate) fn catch_all_terminal(token: &str, at: &str) -> Self {
        Self::CatchAllTerminal {
            token: token.to_owned(),
            at: at.to_owned(),
        }
    }

    pub(crate) fn param_kind_conflict(token: &str, at: &str, existing: &str) -> Self {
        Self::ParamKindConflict {
            token: token.to_owned(),
            at: at.to_owned(),
            existing: existing.to_owned(),
        }
    }

    pub(crate) fn kind_exclusion(token: &str, at: &str, existing: &str) -> Self {
        Self::KindExclusion {
            token: token.to_owned(),
            at: at.to_owned(),
            existing: existing.to_owned(),
        }
    }

    pub(crate) fn path_parse(token: &str, at: &str) -> Self {
        Self::PathParse {
            token: token.to_owned(),
            at: at.to_owned(),
        }
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMethod { method } => {
                write!(f, "invalid http method '{method}'")
            }
            Self::CatchAllTerminal { token, at } => {
                write!(f, "can't add '{token}' to '{at}'")
            }
            Self::ParamKindConflict {
                token,
                at,
                existing,
            } => {
                write!(f, "can't add '{token}' to '{at}' has sub param '{existing}'")
            }
            Self::KindExclusion {
                token,
                at,
                existing,
            } => {
                if existing == ":" || existing == "*" {
                    write!(f, "can't add '{token}' to '{at}' has sub param '{existing}'")
                } else {
                    write!(
                        f,
                        "can't add '{token}' to '{at}' has sub static '{existing}'"
                    )
                }
            }
            Self::PathParse { token, at } => {
                write!(
                    f,
                    "can't add '{token}' to '{at}': diverges inside a multi-byte character"
                )
            }
        }
    }
}

impl std::error::Error for RouteError {}

/// Error returned when registering a file tree.
///
/// Wraps either the filesystem failure or the route registration failure.
#[derive(Debug)]
pub enum FileTreeError {
    /// Reading the file or directory failed.
    Io(std::io::Error),
    /// Registering a file's route failed.
    Route(RouteError),
}

impl fmt::Display for FileTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "file tree registration failed: {err}"),
            Self::Route(err) => write!(f, "file tree registration failed: {err}"),
        }
    }
}

impl std::error::Error for FileTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Route(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for FileTreeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<RouteError> for FileTreeError {
    fn from(err: RouteError) -> Self {
        Self::Route(err)
    }
}
