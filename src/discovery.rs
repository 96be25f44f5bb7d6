//! Workspace file discovery.
//!
//! Walks the workspace while respecting .gitignore rules, the default
//! exclude list, and the configured include/exclude globs. Produces
//! de-duplicated, workspace-relative paths.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::path::Path;

pub struct FileDiscovery {
    include: GlobSet,
    exclude: GlobSet,
    defaults: GlobSet,
    max_file_size: u64,
}

impl FileDiscovery {
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            include: build_globset(config.include_patterns.iter().map(String::as_str))?,
            exclude: build_globset(config.exclude_patterns.iter().map(String::as_str))?,
            defaults: build_globset(default_exclude_patterns().into_iter())?,
            max_file_size: config.max_file_size,
        })
    }

    /// Discover all candidate files under `root`, as sorted relative paths.
    pub fn discover(&self, root: &Path) -> Result<Vec<String>> {
        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false)
            .build();

        // BTreeSet de-duplicates and keeps the listing deterministic.
        let mut files = BTreeSet::new();

        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }

            let rel = path.strip_prefix(root).unwrap_or(path);
            if self.is_excluded(rel) {
                continue;
            }
            if let Ok(metadata) = std::fs::metadata(path) {
                if metadata.len() > self.max_file_size {
                    continue;
                }
            }

            let mut rel_str = rel.to_string_lossy().to_string();
            if rel_str.contains('\\') {
                rel_str = rel_str.replace('\\', "/");
            }
            files.insert(rel_str);
        }

        Ok(files.into_iter().collect())
    }

    fn is_excluded(&self, rel: &Path) -> bool {
        let excluded = self.defaults.is_match(rel) || self.exclude.is_match(rel);
        excluded && !self.include.is_match(rel)
    }
}

fn default_exclude_patterns() -> Vec<&'static str> {
    vec![
        "**/.git/**",
        "**/.codescope/**",
        "**/target/**",
        "**/node_modules/**",
        "**/dist/**",
        "**/build/**",
        "**/out/**",
        "**/coverage/**",
        "**/vendor/**",
        "**/.venv/**",
        "**/__pycache__/**",
        "**/.next/**",
        "**/package-lock.json",
        "**/yarn.lock",
        "**/pnpm-lock.yaml",
        "**/Cargo.lock",
        "**/*.min.js",
        "**/*.min.css",
        "**/*.map",
        "**/*.png",
        "**/*.jpg",
        "**/*.jpeg",
        "**/*.gif",
        "**/*.webp",
        "**/*.pdf",
        "**/*.zip",
        "**/*.gz",
        "**/*.tar",
        "**/*.tgz",
        "**/*.jar",
        "**/*.wasm",
        "**/*.o",
        "**/*.a",
        "**/*.so",
        "**/*.dylib",
        "**/*.dll",
    ]
}

fn build_globset<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern)
                .map_err(|e| EngineError::Config(format!("bad glob pattern {pattern:?}: {e}")))?,
        );
    }
    builder
        .build()
        .map_err(|e| EngineError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn skips_default_excluded_directories() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/main.ts", "export const a = 1");
        write(temp.path(), "node_modules/pkg/index.js", "module.exports = {}");
        write(temp.path(), "dist/bundle.js", "var x = 1");

        let config = EngineConfig::new(temp.path());
        let discovery = FileDiscovery::from_config(&config).unwrap();
        let files = discovery.discover(temp.path()).unwrap();
        assert_eq!(files, vec!["src/main.ts".to_string()]);
    }

    #[test]
    fn user_excludes_apply() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/a.ts", "export const a = 1");
        write(temp.path(), "src/a.spec.ts", "test()");

        let config = EngineConfig::new(temp.path()).with_exclude("**/*.spec.ts");
        let discovery = FileDiscovery::from_config(&config).unwrap();
        let files = discovery.discover(temp.path()).unwrap();
        assert_eq!(files, vec!["src/a.ts".to_string()]);
    }

    #[test]
    fn include_overrides_exclude() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "vendor/kept.ts", "export const keep = 1");

        let config = EngineConfig::new(temp.path()).with_include("**/vendor/kept.ts");
        let discovery = FileDiscovery::from_config(&config).unwrap();
        let files = discovery.discover(temp.path()).unwrap();
        assert_eq!(files, vec!["vendor/kept.ts".to_string()]);
    }

    #[test]
    fn listing_is_sorted_and_deduplicated() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "b.ts", "export const b = 1");
        write(temp.path(), "a.ts", "export const a = 1");

        let config = EngineConfig::new(temp.path());
        let discovery = FileDiscovery::from_config(&config).unwrap();
        let files = discovery.discover(temp.path()).unwrap();
        assert_eq!(files, vec!["a.ts".to_string(), "b.ts".to_string()]);
    }
}
