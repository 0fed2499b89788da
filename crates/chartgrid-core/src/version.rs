//! Version ordering for application versions.
//!
//! Chart versions are compared as semantic versions, so "1.10.0" sorts after
//! "1.2.0". Versions that are not valid semver even after lenient
//! normalization sort after every valid one, lexically among themselves.

use std::cmp::Ordering;

use semver::Version;

use crate::types::ApplicationVersion;

/// Parse a chart version, tolerating a leading `v` and missing minor/patch
/// components ("v1.2" → 1.2.0).
pub fn parse_lenient(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    if let Ok(v) = Version::parse(trimmed) {
        return Some(v);
    }

    // Pad the numeric core only; pre-release/build suffixes stay attached.
    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, rest) = trimmed.split_at(split_at);
    let parts = core.split('.').count();
    if parts == 0 || parts >= 3 {
        return None;
    }
    let padded = format!("{core}{}{rest}", ".0".repeat(3 - parts));
    Version::parse(&padded).ok()
}

/// Compare two version strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_lenient(a), parse_lenient(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Sort versions ascending by semantic version, creation time as tie-break.
pub fn sort_versions(versions: &mut [ApplicationVersion]) {
    versions.sort_by(|a, b| {
        compare_versions(&a.version, &b.version)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}
