//! Specifier classification and logical-name normalisation.

use crate::error::ResolveError;

/// The engine-provided SDK specifier.
pub const SDK_SPECIFIER: &str = "@/cloud-sdk";

/// Marker for workspace-root specifiers.
const ROOT_MARKER: &str = "@/";

/// What a `require` specifier refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Specifier<'a> {
    /// The reserved SDK alias.
    Sdk,
    /// A workspace function, by canonical logical name.
    Local(String),
    /// An external package, delegated to the host registry unchanged.
    Package(&'a str),
}

/// Whether `specifier` names a workspace function.
pub fn is_local(specifier: &str) -> bool {
    specifier.starts_with(ROOT_MARKER) || specifier.starts_with("./") || specifier.starts_with("../")
}

/// Classify `specifier` as required from the module named `from`.
///
/// Relative specifiers resolve against the directory of `from`'s logical
/// name. A trailing `.{extension}` is stripped so that `./util.ns` and
/// `./util` name the same function.
pub fn classify<'a>(
    specifier: &'a str,
    from: &str,
    extension: &str,
) -> Result<Specifier<'a>, ResolveError> {
    if specifier == SDK_SPECIFIER {
        return Ok(Specifier::Sdk);
    }
    if !is_local(specifier) {
        return Ok(Specifier::Package(specifier));
    }

    let joined = match specifier.strip_prefix(ROOT_MARKER) {
        Some(rest) => normalize(rest),
        None => {
            let dir = match from.rfind('/') {
                Some(idx) => &from[..idx],
                None => "",
            };
            normalize(&format!("{dir}/{specifier}"))
        }
    };

    let name = joined.ok_or_else(|| ResolveError::ModuleNotFound {
        specifier: specifier.to_string(),
        name: specifier.to_string(),
    })?;

    let suffix = format!(".{extension}");
    let name = match name.strip_suffix(&suffix) {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => name,
    };
    Ok(Specifier::Local(name))
}

/// Collapse `.` and `..` segments of a `/`-separated path.
///
/// Returns `None` when the path climbs above the root or names nothing.
pub(crate) fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
