//! Module name handling
//!
//! Module names are dotted (`pkg.sub.Name`). Sources store them as
//! slash-separated paths with [`MODULE_EXTENSION`].

/// File extension of stored module images
pub const MODULE_EXTENSION: &str = ".mod";

/// Device-style names that cannot exist as plain files on some platforms
pub const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Normalize a name to dotted form
pub fn normalize(name: &str) -> String {
    name.replace('/', ".").trim_matches('.').to_string()
}

/// Storage path of a module inside a source
pub fn resource_path(name: &str) -> String {
    format!("{}{}", name.replace('.', "/"), MODULE_EXTENSION)
}

/// Package part of a name, `None` for names without a namespace
pub fn package_of(name: &str) -> Option<&str> {
    name.rfind('.').map(|idx| &name[..idx])
}

/// Manifest key for a package (`pkg/sub/`)
pub fn package_path(package: &str) -> String {
    format!("{}/", package.replace('.', "/"))
}

/// Underscore-prefixed fallback for names colliding with a reserved device name
///
/// Only dot-less names qualify. Matching is a case-insensitive prefix test.
pub fn reserved_fallback(name: &str) -> Option<String> {
    if name.contains('.') {
        return None;
    }
    let upper = name.to_ascii_uppercase();
    RESERVED_NAMES
        .iter()
        .any(|reserved| upper.starts_with(reserved))
        .then(|| format!("_{}", name))
}

/// Literal prefix match against a set of exclusions
pub fn matches_any<'a, I>(name: &str, prefixes: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    prefixes.into_iter().any(|prefix| name.starts_with(prefix))
}
