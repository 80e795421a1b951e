//! Hierarchical repository layout.
//!
//! `group/with/slashes/artifact/version/artifact-version[-classifier].ext`
//!
//! Local paths and remote URL suffixes are built from the same segment list
//! so the two layouts only differ by root and separator.

use std::path::{Path, PathBuf};

use url::Url;

use crate::coordinate::Coordinate;
use crate::error::{ResolverError, ResolverResult};

pub fn segments(coord: &Coordinate) -> Vec<String> {
    let mut out: Vec<String> = coord
        .group()
        .map(|group| {
            group
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    out.push(coord.artifact().to_string());
    out.push(coord.version().to_string());
    out.push(coord.file_name());
    out
}

/// Path relative to a repository root, using host separators.
pub fn relative_path(coord: &Coordinate) -> PathBuf {
    segments(coord).iter().collect()
}

/// URL suffix relative to a repository base, always `/`-separated.
pub fn url_suffix(coord: &Coordinate) -> String {
    segments(coord).join("/")
}

pub fn local_path(root: &Path, coord: &Coordinate) -> PathBuf {
    root.join(relative_path(coord))
}

/// Appends the layout to `base` one percent-encoded segment at a time, so
/// no field can turn into a query or fragment.
pub fn remote_url(base: &Url, coord: &Coordinate) -> ResolverResult<Url> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|()| {
            ResolverError::Configuration(format!("cannot build URL for {coord} under {base}"))
        })?
        .pop_if_empty()
        .extend(segments(coord));
    Ok(url)
}
