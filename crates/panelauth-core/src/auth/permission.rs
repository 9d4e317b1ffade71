//! Button-level permission checks.
//!
//! Permissions are opaque strings such as `system:user:add`. A permission set
//! consisting of exactly the single entry `*:*:*` grants everything.

/// Wildcard permission granting everything when it is the only entry.
pub const ALL_PERMISSIONS: &str = "*:*:*";

/// What a caller needs: one permission, or all of several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Required<'a> {
    One(&'a str),
    All(Vec<&'a str>),
}

impl Required<'_> {
    fn is_empty(&self) -> bool {
        match self {
            Required::One(p) => p.is_empty(),
            Required::All(ps) => ps.is_empty(),
        }
    }
}

impl<'a> From<&'a str> for Required<'a> {
    fn from(p: &'a str) -> Self {
        Required::One(p)
    }
}

impl<'a> From<&'a String> for Required<'a> {
    fn from(p: &'a String) -> Self {
        Required::One(p.as_str())
    }
}

impl<'a> From<&'a [&'a str]> for Required<'a> {
    fn from(ps: &'a [&'a str]) -> Self {
        Required::All(ps.to_vec())
    }
}

impl<'a, const N: usize> From<[&'a str; N]> for Required<'a> {
    fn from(ps: [&'a str; N]) -> Self {
        Required::All(ps.to_vec())
    }
}

impl<'a> From<&'a [String]> for Required<'a> {
    fn from(ps: &'a [String]) -> Self {
        Required::All(ps.iter().map(String::as_str).collect())
    }
}

impl<'a> From<&'a Vec<String>> for Required<'a> {
    fn from(ps: &'a Vec<String>) -> Self {
        Required::from(ps.as_slice())
    }
}

/// Check `required` against a granted permission set.
///
/// Several required permissions are conjunctive: every one must be granted.
/// An empty requirement is never satisfied. This differs from the web
/// panel's `hasPerms`, which granted an empty list.
pub fn has_permission<'a>(granted: &[String], required: impl Into<Required<'a>>) -> bool {
    let required = required.into();
    if required.is_empty() {
        return false;
    }
    if granted.len() == 1 && granted[0] == ALL_PERMISSIONS {
        return true;
    }

    let grants = |p: &str| granted.iter().any(|g| g == p);
    match required {
        Required::One(p) => grants(p),
        Required::All(ps) => ps.into_iter().all(grants),
    }
}
