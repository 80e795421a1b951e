use std::fmt;
use std::str::FromStr;

use crate::error::{ResolverError, ResolverResult};

pub const DEFAULT_EXTENSION: &str = "jar";

/// Identity of one artifact in a hierarchical repository.
///
/// Textual form: `group:artifact:version[:classifier][@extension]`. The
/// group may be empty (`:artifact:version`) in which case it contributes no
/// path segment to the layout. The repository pin is not part of the textual
/// form; set it with [`Coordinate::with_repository`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    group: Option<String>,
    artifact: String,
    version: String,
    classifier: Option<String>,
    extension: String,
    repository: Option<String>,
}

impl Coordinate {
    pub fn new(
        group: Option<&str>,
        artifact: impl Into<String>,
        version: impl Into<String>,
    ) -> ResolverResult<Self> {
        let artifact = artifact.into();
        let version = version.into();
        if artifact.trim().is_empty() {
            return Err(invalid(&artifact, "artifact id must not be empty"));
        }
        if version.trim().is_empty() {
            return Err(invalid(&version, "version must not be empty"));
        }
        if let Some(group) = group {
            check_segment(group, "group")?;
        }
        check_segment(&artifact, "artifact id")?;
        check_segment(&version, "version")?;
        Ok(Self {
            group: group.filter(|g| !g.is_empty()).map(str::to_string),
            artifact,
            version,
            classifier: None,
            extension: DEFAULT_EXTENSION.to_string(),
            repository: None,
        })
    }

    /// An empty classifier clears it.
    pub fn with_classifier(mut self, classifier: impl Into<String>) -> ResolverResult<Self> {
        let classifier = classifier.into();
        check_segment(&classifier, "classifier")?;
        self.classifier = (!classifier.is_empty()).then_some(classifier);
        Ok(self)
    }

    /// An empty extension keeps the current one.
    pub fn with_extension(mut self, extension: impl Into<String>) -> ResolverResult<Self> {
        let extension = extension.into();
        check_segment(&extension, "extension")?;
        if !extension.is_empty() {
            self.extension = extension;
        }
        Ok(self)
    }

    /// Restrict resolution to the repository with this id.
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn classifier(&self) -> Option<&str> {
        self.classifier.as_deref()
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn repository(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    /// `artifact-version[-classifier].extension`
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(c) => format!(
                "{}-{}-{}.{}",
                self.artifact, self.version, c, self.extension
            ),
            None => format!("{}-{}.{}", self.artifact, self.version, self.extension),
        }
    }
}

impl FromStr for Coordinate {
    type Err = ResolverError;

    fn from_str(input: &str) -> ResolverResult<Self> {
        let (body, extension) = match input.rsplit_once('@') {
            Some((body, ext)) if !ext.is_empty() => (body, Some(ext)),
            Some(_) => return Err(invalid(input, "empty extension after '@'")),
            None => (input, None),
        };

        let parts: Vec<&str> = body.split(':').collect();
        let (group, artifact, version, classifier) = match parts.as_slice() {
            [group, artifact, version] => (*group, *artifact, *version, None),
            [group, artifact, version, classifier] => {
                (*group, *artifact, *version, Some(*classifier))
            }
            _ => {
                return Err(invalid(
                    input,
                    "expected group:artifact:version[:classifier][@extension]",
                ));
            }
        };

        let reword = |err: ResolverError| match err {
            ResolverError::InvalidCoordinate { reason, .. } => invalid(input, &reason),
            other => other,
        };
        let mut coord = Coordinate::new(Some(group), artifact, version).map_err(reword)?;
        if let Some(classifier) = classifier {
            coord = coord.with_classifier(classifier).map_err(reword)?;
        }
        if let Some(extension) = extension {
            coord = coord.with_extension(extension).map_err(reword)?;
        }
        Ok(coord)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.group.as_deref().unwrap_or_default(),
            self.artifact,
            self.version
        )?;
        if let Some(c) = &self.classifier {
            write!(f, ":{c}")?;
        }
        if self.extension != DEFAULT_EXTENSION {
            write!(f, "@{}", self.extension)?;
        }
        Ok(())
    }
}

/// Every field becomes part of a path or URL segment, so it must not be
/// able to name another directory.
fn check_segment(value: &str, field: &str) -> ResolverResult<()> {
    if value.contains(['/', '\\']) {
        return Err(invalid(value, &format!("{field} must not contain path separators")));
    }
    if value.chars().any(char::is_control) {
        return Err(invalid(value, &format!("{field} must not contain control characters")));
    }
    if value == "." || value == ".." {
        return Err(invalid(value, &format!("{field} must not be a relative path segment")));
    }
    Ok(())
}

fn invalid(input: &str, reason: &str) -> ResolverError {
    ResolverError::InvalidCoordinate {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
