//! Known-identity registry: reference encodings loaded from a directory tree.

use crate::files::extension_allowed;
use crate::provider::EncodingProvider;
use crate::types::Encoding;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("cannot read known-faces directory {path}: {source}")]
    UnreadableRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Immutable map from identity name to that identity's reference encodings.
///
/// Identity names are the sub-directory names under the known-faces root.
/// Iteration is in lexicographic name order, which is also the match
/// engine's tie-break order. Built once at startup and swapped wholesale;
/// there is no partial mutation.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    identities: BTreeMap<String, Vec<Encoding>>,
}

impl IdentityRegistry {
    /// Build a registry from pre-computed encodings.
    ///
    /// Identities with no encodings are dropped, never stored empty.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<Encoding>)>,
    {
        let identities = entries
            .into_iter()
            .filter(|(_, references)| !references.is_empty())
            .collect();
        Self { identities }
    }

    /// Load reference encodings for every identity under `root`.
    ///
    /// Each sub-directory is one identity; every file in it that passes the
    /// extension allow-list is run through the provider and the first
    /// detected face's encoding becomes a reference (reference photos are
    /// assumed to contain one face; extras are ignored). Files that fail to
    /// decode or yield no face are logged and skipped. Identities that end
    /// up with zero references are omitted entirely.
    pub fn load<P: EncodingProvider>(
        provider: &P,
        root: &Path,
        allowed_extensions: &[String],
    ) -> Result<Self, RegistryError> {
        let mut identities = BTreeMap::new();

        for dir in sorted_entries(root).map_err(|source| RegistryError::UnreadableRoot {
            path: root.to_path_buf(),
            source,
        })? {
            if !dir.is_dir() {
                continue;
            }
            let name = match dir.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            tracing::info!(identity = %name, "loading reference images");
            let references = load_references(provider, &dir, allowed_extensions);

            if references.is_empty() {
                tracing::warn!(identity = %name, "no usable reference encodings; identity omitted");
            } else {
                tracing::info!(identity = %name, references = references.len(), "identity loaded");
                identities.insert(name, references);
            }
        }

        Ok(Self { identities })
    }

    /// Identities and their references, in lexicographic name order.
    pub fn identities(&self) -> impl Iterator<Item = (&str, &[Encoding])> {
        self.identities
            .iter()
            .map(|(name, refs)| (name.as_str(), refs.as_slice()))
    }

    pub fn get(&self, identity: &str) -> Option<&[Encoding]> {
        self.identities.get(identity).map(|refs| refs.as_slice())
    }

    /// Number of identities.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Total reference encodings across all identities.
    pub fn reference_count(&self) -> usize {
        self.identities.values().map(Vec::len).sum()
    }
}

fn load_references<P: EncodingProvider>(
    provider: &P,
    identity_dir: &Path,
    allowed_extensions: &[String],
) -> Vec<Encoding> {
    let files = match sorted_entries(identity_dir) {
        Ok(files) => files,
        Err(error) => {
            tracing::warn!(dir = %identity_dir.display(), %error, "cannot list identity directory");
            return Vec::new();
        }
    };

    let mut references = Vec::new();
    for file in files {
        if !file.is_file() || !extension_allowed(&file, allowed_extensions) {
            continue;
        }
        match provider.detect_faces(&file) {
            Ok(faces) => match faces.into_iter().next() {
                Some(face) => {
                    tracing::debug!(file = %file.display(), "reference encoding loaded");
                    references.push(face.encoding);
                }
                None => {
                    tracing::warn!(file = %file.display(), "no face found in reference image");
                }
            },
            Err(error) => {
                tracing::warn!(file = %file.display(), %error, "skipping unreadable reference image");
            }
        }
    }
    references
}

/// Directory entries sorted by name, for deterministic load order.
fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    Ok(entries)
}
