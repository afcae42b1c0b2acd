/// Extension-based routing of files to configured categories.
///
/// Each configured category owns a list of extensions. Lookup is
/// case-insensitive and uses the last dot-separated segment of the file
/// name. Files whose extension is missing or unknown can optionally be
/// identified from their header bytes.
///
/// # Examples
///
/// ```
/// use autosorter::classifier::Classifier;
/// use autosorter::config::CategoryConfig;
/// use std::path::Path;
///
/// let classifier = Classifier::new(
///     &[CategoryConfig::new("Pictures", "~/Pictures", &["png", "jpg"])],
///     false,
/// );
/// let hit = classifier.classify(Path::new("/dl/Photo.PNG")).unwrap();
/// assert_eq!(hit.category, "Pictures");
/// assert!(classifier.classify(Path::new("/dl/notes.xyz")).is_none());
/// ```
use crate::config::CategoryConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How a category was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationMethod {
    Extension,
    /// Identified from file content because the extension did not match.
    Sniffed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: String,
    /// Category base destination as configured (not tilde-expanded).
    pub destination: PathBuf,
    /// The extension that matched.
    pub extension: String,
    pub method: ClassificationMethod,
}

/// Maps extensions to categories.
#[derive(Debug, Clone)]
pub struct Classifier {
    categories: Vec<CategoryConfig>,
    extension_map: HashMap<String, usize>,
    sniff_unknown: bool,
}

impl Classifier {
    /// Build the lookup table. The first category listing an extension wins.
    pub fn new(categories: &[CategoryConfig], sniff_unknown: bool) -> Self {
        let mut extension_map = HashMap::new();
        for (index, category) in categories.iter().enumerate() {
            for ext in &category.extensions {
                extension_map
                    .entry(ext.trim_start_matches('.').to_lowercase())
                    .or_insert(index);
            }
        }

        Self {
            categories: categories.to_vec(),
            extension_map,
            sniff_unknown,
        }
    }

    pub fn category_names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }

    /// Category for a bare extension, ignoring case.
    pub fn category_for_extension(&self, ext: &str) -> Option<&CategoryConfig> {
        self.extension_map
            .get(&ext.to_lowercase())
            .map(|&index| &self.categories[index])
    }

    /// Classify a file by extension, falling back to content sniffing.
    pub fn classify(&self, path: &Path) -> Option<Classification> {
        if let Some(ext) = extension_of(path)
            && let Some(category) = self.category_for_extension(&ext)
        {
            return Some(Classification {
                category: category.name.clone(),
                destination: category.destination.clone(),
                extension: ext,
                method: ClassificationMethod::Extension,
            });
        }

        if !self.sniff_unknown {
            return None;
        }

        let kind = infer::get_from_path(path).ok().flatten()?;
        let sniffed = kind.extension();
        let category = self.category_for_extension(sniffed)?;
        debug!(
            "Identified {} as {} ({}) from content",
            path.display(),
            sniffed,
            kind.mime_type()
        );

        Some(Classification {
            category: category.name.clone(),
            destination: category.destination.clone(),
            extension: sniffed.to_string(),
            method: ClassificationMethod::Sniffed,
        })
    }
}

/// Lowercased extension: the text after the last `.` in the file name.
///
/// Returns `None` when there is no dot, the name ends in a dot, or the name
/// is a dotfile such as `.bashrc`.
pub fn extension_of(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    if ext.is_empty() { None } else { Some(ext) }
}
