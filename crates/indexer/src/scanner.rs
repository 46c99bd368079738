use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

const MAX_FILE_SIZE_BYTES: u64 = 1_048_576; // 1 MB

/// Extensions the chunker can do something useful with; everything else
/// falls through to the window fallback anyway, so the list stays
/// code-centric.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "rs", "py", "pyw", "js", "mjs", "cjs", "jsx", "ts", "tsx", "go", "java", "c", "h", "cpp",
    "cc", "cxx", "hpp", "hh", "hxx", "md", "toml", "yaml", "yml",
];

const IGNORED_SCOPES: &[&str] = &[
    ".git",
    ".idea",
    ".vscode",
    "node_modules",
    "build",
    "dist",
    "coverage",
    "target",
    ".venv",
    "__pycache__",
    "vendor",
    "third_party",
];

/// Scanner for finding indexable source files in a project
pub struct FileScanner {
    root: PathBuf,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Scan the project for source files (.gitignore aware).
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let root = self.root.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true);
        builder.filter_entry(move |entry| !Self::is_ignored_scope(entry.path(), &root));

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let Some(file_type) = entry.file_type() else {
                        continue;
                    };
                    if !file_type.is_file() {
                        continue;
                    }

                    let path = entry.path();
                    if let Ok(meta) = entry.metadata() {
                        if meta.len() > MAX_FILE_SIZE_BYTES {
                            log::debug!(
                                "skipping large file {} ({} bytes)",
                                path.display(),
                                meta.len()
                            );
                            continue;
                        }
                    }

                    if !Self::is_source_file(path) {
                        continue;
                    }

                    files.push(path.to_path_buf());
                }
                Err(e) => log::warn!("failed to read entry: {e}"),
            }
        }

        files.sort();
        log::info!("found {} source files", files.len());
        files
    }

    fn is_source_file(path: &Path) -> bool {
        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            let ext = ext.to_lowercase();
            return SUPPORTED_EXTENSIONS
                .iter()
                .any(|candidate| candidate == &ext);
        }
        false
    }

    fn is_ignored_scope(path: &Path, root: &Path) -> bool {
        if let Ok(relative) = path.strip_prefix(root) {
            for component in relative.components() {
                if let std::path::Component::Normal(name) = component {
                    let lowered = name.to_string_lossy().to_lowercase();
                    if IGNORED_SCOPES.iter().any(|ignored| ignored == &lowered) {
                        return true;
                    }
                }
            }
        }
        false
    }
}
