//! Document sources for the index phase

use super::SearchError;
use crate::chunking::{Document, DocumentKind, DocumentMetadata};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Documents loaded from a source, plus the ones that could not be read
#[derive(Debug, Default)]
pub struct SourceBatch {
    pub documents: Vec<Document>,
    pub unreadable: Vec<String>,
}

/// Anything that can produce documents for indexing
pub trait DocumentSource {
    /// Short human-readable description for logs
    fn describe(&self) -> String;

    /// Load every document. Individual unreadable documents are reported in the batch,
    /// not as an error.
    fn load(&self) -> Result<SourceBatch, SearchError>;
}

/// Files under a directory tree selected by glob patterns
pub struct FileTreeSource {
    root: PathBuf,
    include: GlobSet,
    exclude_dirs: Vec<String>,
    max_files: Option<usize>,
}

impl FileTreeSource {
    /// `include_patterns` are matched against the path relative to `root`; `*` crosses
    /// directory boundaries so `*.rb` selects Ruby files at any depth.
    pub fn new(
        root: &Path,
        include_patterns: &[String],
        exclude_dirs: &[String],
        max_files: Option<usize>,
    ) -> Result<Self, SearchError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in include_patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(false)
                .build()
                .map_err(|e| SearchError::InvalidPattern(format!("{}: {}", pattern, e)))?;
            builder.add(glob);
        }
        let include = builder
            .build()
            .map_err(|e| SearchError::InvalidPattern(e.to_string()))?;

        Ok(Self {
            root: root.to_path_buf(),
            include,
            exclude_dirs: exclude_dirs.to_vec(),
            max_files,
        })
    }

    /// Whether a directory (given relative to the root) is excluded
    ///
    /// Plain names match a directory at any depth; entries containing `/` match a
    /// relative path suffix such as `vendor/bundle`.
    fn is_excluded(&self, relative: &str) -> bool {
        let name = relative.rsplit('/').next().unwrap_or(relative);
        self.exclude_dirs.iter().any(|excluded| {
            if excluded.contains('/') {
                let excluded = excluded.trim_matches('/');
                relative == excluded || relative.ends_with(&format!("/{}", excluded))
            } else {
                name == excluded
            }
        })
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

impl DocumentSource for FileTreeSource {
    fn describe(&self) -> String {
        format!("file tree {}", self.root.display())
    }

    fn load(&self) -> Result<SourceBatch, SearchError> {
        if !self.root.is_dir() {
            return Err(SearchError::Io {
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
                context: format!("Cannot index {:?}", self.root),
            });
        }

        let mut batch = SourceBatch::default();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !self.is_excluded(&relative_path(&self.root, entry.path()))
            });

        for entry in walker {
            if self
                .max_files
                .is_some_and(|max| batch.documents.len() >= max)
            {
                debug!("Reached max_files limit of {:?}", self.max_files);
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    let path = e
                        .path()
                        .map(|p| relative_path(&self.root, p))
                        .unwrap_or_default();
                    batch.unreadable.push(path);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = relative_path(&self.root, entry.path());
            if !self.include.is_match(&relative) {
                continue;
            }

            match std::fs::read(entry.path()) {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    batch.documents.push(Document::new(relative, text));
                }
                Err(e) => {
                    warn!("Skipping unreadable file {}: {}", relative, e);
                    batch.unreadable.push(relative);
                }
            }
        }

        debug!(
            "Loaded {} documents from {:?} ({} unreadable)",
            batch.documents.len(),
            self.root,
            batch.unreadable.len()
        );

        Ok(batch)
    }
}

/// One wiki page from a JSON-lines export
#[derive(Debug, Clone, Deserialize)]
pub struct WikiPage {
    pub page_id: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    pub space: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub content: String,
}

impl WikiPage {
    pub fn into_document(self) -> Document {
        let path = format!("wiki/{}/{}", self.space, self.page_id);
        let text = format!("{}\n\n{}", self.title, self.content);
        Document::new(path, text)
            .with_kind(DocumentKind::Generic)
            .with_metadata(DocumentMetadata {
                collection: None,
                space: Some(self.space),
                title: Some(self.title),
                url: self.url,
                labels: self.labels,
            })
    }
}

/// Wiki pages exported one JSON object per line
pub struct PageExportSource {
    path: PathBuf,
}

impl PageExportSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl DocumentSource for PageExportSource {
    fn describe(&self) -> String {
        format!("page export {}", self.path.display())
    }

    fn load(&self) -> Result<SourceBatch, SearchError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| SearchError::Io {
            source: e,
            context: format!("Failed to read page export: {:?}", self.path),
        })?;

        let mut batch = SourceBatch::default();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WikiPage>(line) {
                Ok(page) => batch.documents.push(page.into_document()),
                Err(e) => {
                    warn!("Skipping malformed page on line {}: {}", number + 1, e);
                    batch
                        .unreadable
                        .push(format!("{}:{}", self.path.display(), number + 1));
                }
            }
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &[u8]) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_file_tree_filters() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "app/models/user.rb", b"class User\nend\n");
        write(root, "app/models/notes.txt", b"ignored");
        write(root, "node_modules/pkg/index.js", b"module.exports = 1;");
        write(root, "vendor/bundle/gem.rb", b"class Gem\nend\n");
        write(root, "vendor/other/keep.rb", b"class Keep\nend\n");
        write(root, "web/app.js", b"export function main() {}\n");

        let source = FileTreeSource::new(
            root,
            &strings(&["*.rb", "*.js"]),
            &strings(&["node_modules", "vendor/bundle"]),
            None,
        )
        .unwrap();

        let batch = source.load().unwrap();
        let paths: Vec<&str> = batch.documents.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["app/models/user.rb", "vendor/other/keep.rb", "web/app.js"]);
        assert!(batch.unreadable.is_empty());
    }

    #[test]
    fn test_file_tree_max_files_and_lossy_decode() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.py", b"print('a')\n");
        write(temp.path(), "b.py", b"caf\xe9 = 1\n");
        write(temp.path(), "c.py", b"print('c')\n");

        let source =
            FileTreeSource::new(temp.path(), &strings(&["*.py"]), &[], Some(2)).unwrap();
        let batch = source.load().unwrap();

        assert_eq!(batch.documents.len(), 2);
        assert!(batch.documents[1].text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_invalid_glob() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            FileTreeSource::new(temp.path(), &strings(&["a[b"]), &[], None),
            Err(SearchError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_page_export() {
        let temp = TempDir::new().unwrap();
        let export = temp.path().join("pages.jsonl");
        std::fs::write(
            &export,
            concat!(
                r#"{"page_id":"981","title":"SSO setup","url":"https://wiki.example.com/981","space":"SUP","labels":["sso"],"content":"Configure the IdP metadata."}"#,
                "\n\n",
                "not json\n",
            ),
        )
        .unwrap();

        let batch = PageExportSource::new(&export).load().unwrap();
        assert_eq!(batch.documents.len(), 1);
        assert_eq!(batch.unreadable.len(), 1);

        let doc = &batch.documents[0];
        assert_eq!(doc.path, "wiki/SUP/981");
        assert_eq!(doc.kind, DocumentKind::Generic);
        assert_eq!(doc.metadata.title.as_deref(), Some("SSO setup"));
        assert_eq!(doc.metadata.labels, vec!["sso"]);
        assert!(doc.text.starts_with("SSO setup\n\nConfigure"));
    }
}
