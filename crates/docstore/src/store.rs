//! Document manager: the thin composition layer over the cache, the
//! fingerprint index, the section engine and the optimistic write guard.
//!
//! Every structural mutation follows the same shape: snapshot read,
//! in-memory rewrite, conditional write, then cache and index refresh.
//! Nothing is invalidated when the conditional write is rejected, so a
//! stale-write failure leaves both the file and all derived state exactly
//! as they were.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use memchr::memmem;
use parking_lot::Mutex;
use serde::Serialize;

use crate::cache::{AccessContext, CacheHooks, Document, DocumentCache, WatchMode};
use crate::config::StoreConfig;
use crate::error::{DocStoreError, Result};
use crate::fingerprint::{self, collect_markdown_files, extract_keywords, FingerprintIndex};
use crate::guard;
use crate::path::{RootLayout, VirtualPath};
use crate::section::{self, DocumentStats, InsertMode};

// Relative weights of the search scoring pass. A title hit outranks any
// realistic number of body occurrences of a single keyword.
const TITLE_WEIGHT: f64 = 10.0;
const KEYWORD_WEIGHT: f64 = 5.0;
const HEADING_WEIGHT: f64 = 3.0;
const CONTENT_WEIGHT: f64 = 1.0;

/// Longest snippet returned with a search result.
const MAX_SNIPPET_LEN: usize = 160;

/// A scored search hit.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub path: String,
    pub title: String,
    pub score: f64,
    /// First content line containing a query keyword, if any.
    pub snippet: Option<String>,
    pub stats: DocumentStats,
}

/// Audit record written alongside an archived document.
#[derive(Debug, Serialize)]
struct AuditRecord<'a> {
    original_path: &'a str,
    archived_path: &'a str,
    actor: &'a str,
    deleted_at: DateTime<Utc>,
    content_hash: String,
}

/// The document manager.
///
/// Owns one cache and one fingerprint index per instance; construct it
/// explicitly and pass references, there is no process-wide default.
pub struct DocumentStore {
    layout: RootLayout,
    config: StoreConfig,
    cache: DocumentCache,
    fingerprint: Arc<Mutex<FingerprintIndex>>,
}

impl DocumentStore {
    pub fn new(layout: RootLayout, config: StoreConfig) -> Result<Self> {
        Self::with_hooks(layout, config, CacheHooks::new())
    }

    /// Builds a store with caller-supplied observers and addressing
    /// invalidator. The fingerprint index is created and paired with the
    /// cache here; it scans both roots before the watcher starts.
    pub fn with_hooks(layout: RootLayout, config: StoreConfig, hooks: CacheHooks) -> Result<Self> {
        let started = Instant::now();
        let fingerprint = Arc::new(Mutex::new(FingerprintIndex::new(
            config.fingerprint_preview_bytes,
            config.max_keywords,
        )));
        let ignore = config.build_ignore_set()?;
        let indexed = fingerprint.lock().initialize(&layout, &ignore)?;
        log::info!(
            "document store initialized: {indexed} documents fingerprinted in {:?}",
            started.elapsed()
        );

        let cache = DocumentCache::new(
            layout.clone(),
            config.clone(),
            hooks.with_fingerprint_index(fingerprint.clone()),
        )?;
        Ok(Self {
            layout,
            config,
            cache,
            fingerprint,
        })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Returns a document's metadata and heading tree, or `None` if it
    /// does not exist.
    pub fn get_document(
        &self,
        path: &VirtualPath,
        context: AccessContext,
    ) -> Result<Option<Document>> {
        self.cache.get_document(path, context)
    }

    /// Returns one section's markdown (heading line included), addressed
    /// by flat slug or hierarchical slug path. `None` for a missing
    /// document or unknown slug.
    pub fn get_section(&self, path: &VirtualPath, slug: &str) -> Result<Option<String>> {
        self.cache.get_section_content(path, slug)
    }

    /// Returns the markdown a section delete would remove, for
    /// confirmation prompts. `None` for a missing document or slug.
    pub fn section_preview_for_removal(
        &self,
        path: &VirtualPath,
        slug: &str,
    ) -> Result<Option<String>> {
        let fs_path = self.layout.resolve(path);
        let Some(snapshot) = guard::read_snapshot(&fs_path)? else {
            return Ok(None);
        };
        Ok(section::section_content_for_removal(&snapshot.content, slug))
    }

    /// Current mode of the cache's watch subsystem.
    pub fn watch_mode(&self) -> WatchMode {
        self.cache.watch_mode()
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Searches all documents: fingerprint pre-filter, then a precise
    /// scoring pass over the candidates. Results are sorted by descending
    /// score with path as the tiebreak.
    pub fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let candidates = self.fingerprint.lock().find_candidates(query);
        self.score_candidates(query, candidates)
    }

    /// Searches without consulting the fingerprint index, recomputing each
    /// document's keyword set from its preview. Slower than [`search`]
    /// but produces identical results; the index is advisory.
    ///
    /// [`search`]: DocumentStore::search
    pub fn search_unindexed(&self, query: &str) -> Result<Vec<SearchResult>> {
        let ignore = self.config.build_ignore_set()?;
        let mut files = Vec::new();
        collect_markdown_files(&self.layout.docs_root, &mut files)?;
        collect_markdown_files(&self.layout.coordinator_root, &mut files)?;

        let query_keywords = extract_keywords(query, self.config.max_keywords);
        let mut matched = BTreeSet::new();
        for fs_path in files {
            let Some(vpath) = self.layout.virtual_path_for(&fs_path) else {
                continue;
            };
            if ignore.is_match(vpath.relative()) {
                continue;
            }
            let Some((preview, _)) =
                fingerprint::read_preview(&fs_path, self.config.fingerprint_preview_bytes)?
            else {
                continue;
            };
            let keywords = extract_keywords(&preview, self.config.max_keywords);
            if query_keywords.iter().any(|k| keywords.contains(k)) {
                matched.insert(vpath.as_str().to_string());
            }
        }
        self.score_candidates(query, matched)
    }

    fn score_candidates(
        &self,
        query: &str,
        candidates: BTreeSet<String>,
    ) -> Result<Vec<SearchResult>> {
        let query_keywords = extract_keywords(query, self.config.max_keywords);
        let mut results = Vec::new();
        for path in candidates {
            let Ok(vpath) = VirtualPath::parse(&path) else {
                continue;
            };
            // Search-surfaced documents enter the cache with the search
            // boost applied.
            let Some(doc) = self.cache.get_document(&vpath, AccessContext::Search)? else {
                continue;
            };
            let fs_path = self.layout.resolve(&vpath);
            let Some(snapshot) = guard::read_snapshot(&fs_path)? else {
                continue;
            };
            let content_lower = snapshot.content.to_lowercase();
            let title_lower = doc.meta.title.to_lowercase();

            let mut score = 0.0;
            for keyword in &query_keywords {
                if title_lower.contains(keyword.as_str()) {
                    score += TITLE_WEIGHT;
                }
                if doc.meta.keywords.iter().any(|k| k == keyword) {
                    score += KEYWORD_WEIGHT;
                }
                if doc
                    .headings
                    .iter()
                    .any(|h| h.slug.contains(keyword.as_str()))
                {
                    score += HEADING_WEIGHT;
                }
                let occurrences =
                    memmem::find_iter(content_lower.as_bytes(), keyword.as_bytes()).count();
                score += occurrences as f64 * CONTENT_WEIGHT;
            }

            results.push(SearchResult {
                path,
                title: doc.meta.title,
                score,
                snippet: snippet_for(&snapshot.content, &query_keywords),
                stats: doc.meta.stats,
            });
        }
        results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        Ok(results)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Replaces a section's body (subsections included), preserving the
    /// heading line.
    pub fn replace_section(&self, path: &VirtualPath, slug: &str, body: &str) -> Result<()> {
        self.mutate(path, |content| {
            section::replace_section_body(content, slug, body)
        })
    }

    /// Inserts a new heading and body relative to a reference heading.
    pub fn insert_section(
        &self,
        path: &VirtualPath,
        ref_slug: &str,
        mode: InsertMode,
        depth: u8,
        title: &str,
        body: &str,
    ) -> Result<()> {
        self.mutate(path, |content| {
            section::insert_relative(content, ref_slug, mode, depth, title, body)
        })
    }

    /// Renames a heading in place. The slug regenerates from the new
    /// title, so previously handed-out slugs for this section stop
    /// resolving.
    pub fn rename_section(&self, path: &VirtualPath, slug: &str, new_title: &str) -> Result<()> {
        self.mutate(path, |content| {
            section::rename_heading(content, slug, new_title)
        })
    }

    /// Removes a section and its entire span. The terminating heading is
    /// preserved.
    pub fn delete_section(&self, path: &VirtualPath, slug: &str) -> Result<()> {
        self.mutate(path, |content| section::delete_section(content, slug))
    }

    /// The shared mutation shape: snapshot, rewrite, conditional write,
    /// invalidate, re-fingerprint. A failure at any step before the write
    /// leaves everything untouched.
    fn mutate(
        &self,
        path: &VirtualPath,
        rewrite: impl FnOnce(&str) -> Result<String>,
    ) -> Result<()> {
        let fs_path = self.layout.resolve(path);
        let snapshot = guard::read_snapshot(&fs_path)?
            .ok_or_else(|| DocStoreError::DocumentNotFound(path.to_string()))?;
        let updated = rewrite(&snapshot.content)?;
        guard::write_if_unchanged(&fs_path, snapshot.mtime, &updated)?;
        self.cache.invalidate_document(path.as_str());
        self.refresh_fingerprint(path, &fs_path)?;
        Ok(())
    }

    /// Creates a new document, failing if the path is already taken.
    pub fn create_document(&self, path: &VirtualPath, content: &str) -> Result<()> {
        let fs_path = self.layout.resolve(path);
        guard::write_new(&fs_path, content)?;
        self.refresh_fingerprint(path, &fs_path)?;
        log::debug!("created document {path}");
        Ok(())
    }

    /// Deletes a document by moving it into the archive namespace, writing
    /// a JSON audit sidecar next to the archived copy. Returns the archived
    /// virtual path.
    ///
    /// Name collisions in the archive get a numeric suffix (`auth_1.md`,
    /// `auth_2.md`); earlier archived generations are never overwritten.
    pub fn delete_document(&self, path: &VirtualPath, actor: &str) -> Result<String> {
        let fs_path = self.layout.resolve(path);
        let snapshot = guard::read_snapshot(&fs_path)?
            .ok_or_else(|| DocStoreError::DocumentNotFound(path.to_string()))?;

        let archived = self.pick_archive_path(&path.archive_target())?;
        let archive_fs = self.layout.resolve(&archived);
        if let Some(dir) = archive_fs.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::rename(&fs_path, &archive_fs).map_err(|error| {
            DocStoreError::Archive(format!(
                "failed to move {path} to {}: {error}",
                archived.as_str()
            ))
        })?;

        let record = AuditRecord {
            original_path: path.as_str(),
            archived_path: archived.as_str(),
            actor,
            deleted_at: Utc::now(),
            content_hash: fingerprint::content_hash(&snapshot.content),
        };
        let sidecar = archive_fs.with_extension("md.audit");
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|error| DocStoreError::Archive(format!("audit record: {error}")))?;
        std::fs::write(&sidecar, json)?;

        self.invalidate_after_delete(path)?;
        self.refresh_fingerprint(&archived, &archive_fs)?;
        log::info!("archived {path} to {} (actor {actor})", archived.as_str());
        Ok(archived.as_str().to_string())
    }

    /// First free archive path for a desired target, appending `_1`, `_2`
    /// and so on to the file stem until nothing is in the way.
    fn pick_archive_path(&self, target: &str) -> Result<VirtualPath> {
        let base = VirtualPath::parse(target)?;
        if !self.layout.resolve(&base).exists() {
            return Ok(base);
        }
        // Only the final extension comes off; "notes.md.md" keeps its
        // inner one ("notes.md_1.md").
        let stem = target.strip_suffix(".md").unwrap_or(target);
        for n in 1.. {
            let candidate = VirtualPath::parse(&format!("{stem}_{n}.md"))?;
            if !self.layout.resolve(&candidate).exists() {
                return Ok(candidate);
            }
        }
        unreachable!("archive suffix search is unbounded")
    }

    /// Invalidates the deleted document, or its whole namespace when it
    /// has one, since section addresses handed out for any sibling may
    /// reference it. Siblings are unchanged on disk, so their fingerprints
    /// are rebuilt right away; only the deleted document's may stay gone.
    fn invalidate_after_delete(&self, path: &VirtualPath) -> Result<()> {
        let namespace = path.namespace();
        if namespace.is_empty() {
            self.cache.invalidate_document(path.as_str());
            return Ok(());
        }

        let prefix = format!("/{namespace}/");
        let cached: Vec<String> = self
            .cache
            .cached_paths()
            .into_iter()
            .filter(|p| p.starts_with(&prefix))
            .collect();
        self.cache.invalidate_namespace(&prefix);
        // The document itself may not have been cached; its fingerprint
        // still has to go.
        self.cache.invalidate_document(path.as_str());

        for sibling in cached {
            if sibling == path.as_str() {
                continue;
            }
            let Ok(vpath) = VirtualPath::parse(&sibling) else {
                continue;
            };
            let fs_path = self.layout.resolve(&vpath);
            self.refresh_fingerprint(&vpath, &fs_path)?;
        }
        Ok(())
    }

    /// Refreshes one document's fingerprint from disk so search stays
    /// consistent without waiting for the next cache load.
    fn refresh_fingerprint(&self, path: &VirtualPath, fs_path: &std::path::Path) -> Result<()> {
        if let Some((preview, mtime)) =
            fingerprint::read_preview(fs_path, self.config.fingerprint_preview_bytes)?
        {
            self.fingerprint.lock().insert_document(path, &preview, mtime);
        }
        Ok(())
    }
}

/// First content line containing any query keyword, trimmed and capped.
fn snippet_for(content: &str, query_keywords: &[String]) -> Option<String> {
    for line in content.lines() {
        let lower = line.to_lowercase();
        if query_keywords.iter().any(|k| lower.contains(k.as_str())) {
            let trimmed = line.trim();
            if trimmed.len() <= MAX_SNIPPET_LEN {
                return Some(trimmed.to_string());
            }
            let mut cut = MAX_SNIPPET_LEN;
            while !trimmed.is_char_boundary(cut) {
                cut -= 1;
            }
            return Some(format!("{}…", &trimmed[..cut]));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CacheEvent;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        docs_root: std::path::PathBuf,
        store: DocumentStore,
    }

    fn fixture(files: &[(&str, &str)]) -> Fixture {
        fixture_with_hooks(files, CacheHooks::new())
    }

    fn fixture_with_hooks(files: &[(&str, &str)], hooks: CacheHooks) -> Fixture {
        let temp = TempDir::new().unwrap();
        let docs_root = temp.path().join("docs");
        let coord_root = temp.path().join("coord");
        fs::create_dir_all(&docs_root).unwrap();
        fs::create_dir_all(&coord_root).unwrap();
        for (rel, content) in files {
            let path = docs_root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let store = DocumentStore::with_hooks(
            RootLayout::new(&docs_root, &coord_root),
            StoreConfig::default(),
            hooks,
        )
        .unwrap();
        Fixture {
            store,
            docs_root,
            _temp: temp,
        }
    }

    fn vpath(raw: &str) -> VirtualPath {
        VirtualPath::parse(raw).unwrap()
    }

    const GUIDE: &str = "# User Guide\n\n\
        Intro paragraph about authentication.\n\n\
        ## Setup\n\nInstall the prerequisites.\n\n\
        ## Authentication\n\nConfigure JWT tokens here.\n\n\
        ### Token Rotation\n\nRotate regularly.\n";

    #[test]
    fn get_document_and_section() {
        let fx = fixture(&[("guide.md", GUIDE)]);
        let doc = fx
            .store
            .get_document(&vpath("/guide.md"), AccessContext::Direct)
            .unwrap()
            .unwrap();
        assert_eq!(doc.meta.title, "User Guide");
        assert_eq!(doc.headings.len(), 4);

        let section = fx
            .store
            .get_section(&vpath("/guide.md"), "authentication")
            .unwrap()
            .unwrap();
        assert!(section.starts_with("## Authentication"));
        assert!(section.contains("Token Rotation"));

        assert!(fx
            .store
            .get_section(&vpath("/guide.md"), "nope")
            .unwrap()
            .is_none());
        assert!(fx
            .store
            .get_document(&vpath("/ghost.md"), AccessContext::Direct)
            .unwrap()
            .is_none());
    }

    #[test]
    fn replace_section_roundtrip() {
        let fx = fixture(&[("guide.md", GUIDE)]);
        fx.store
            .replace_section(&vpath("/guide.md"), "setup", "Use the installer.")
            .unwrap();

        let updated = fs::read_to_string(fx.docs_root.join("guide.md")).unwrap();
        assert!(updated.contains("Use the installer."));
        assert!(!updated.contains("Install the prerequisites."));
        // Sibling sections untouched.
        assert!(updated.contains("Configure JWT tokens here."));
    }

    #[test]
    fn insert_rename_delete_section() {
        let fx = fixture(&[("guide.md", GUIDE)]);
        let path = vpath("/guide.md");

        fx.store
            .insert_section(
                &path,
                "setup",
                InsertMode::After,
                2,
                "Troubleshooting",
                "Check the logs.",
            )
            .unwrap();
        let content = fs::read_to_string(fx.docs_root.join("guide.md")).unwrap();
        assert!(content.contains("## Troubleshooting"));

        fx.store
            .rename_section(&path, "troubleshooting", "Known Issues")
            .unwrap();
        let content = fs::read_to_string(fx.docs_root.join("guide.md")).unwrap();
        assert!(content.contains("## Known Issues"));
        assert!(!content.contains("## Troubleshooting"));

        fx.store.delete_section(&path, "known-issues").unwrap();
        let content = fs::read_to_string(fx.docs_root.join("guide.md")).unwrap();
        assert!(!content.contains("Known Issues"));
        assert!(content.contains("## Authentication"));
    }

    #[test]
    fn duplicate_sibling_insert_rejected() {
        let fx = fixture(&[("guide.md", GUIDE)]);
        let err = fx
            .store
            .insert_section(
                &vpath("/guide.md"),
                "setup",
                InsertMode::After,
                2,
                "Authentication",
                "dup",
            )
            .unwrap_err();
        assert!(matches!(err, DocStoreError::DuplicateHeading { .. }));
        // The file is untouched.
        assert_eq!(fs::read_to_string(fx.docs_root.join("guide.md")).unwrap(), GUIDE);
    }

    #[test]
    fn mutation_on_missing_document_is_typed() {
        let fx = fixture(&[]);
        let err = fx
            .store
            .replace_section(&vpath("/ghost.md"), "intro", "x")
            .unwrap_err();
        assert!(matches!(err, DocStoreError::DocumentNotFound(_)));
    }

    #[test]
    fn removal_preview_matches_delete() {
        let fx = fixture(&[("guide.md", GUIDE)]);
        let preview = fx
            .store
            .section_preview_for_removal(&vpath("/guide.md"), "token-rotation")
            .unwrap()
            .unwrap();
        assert!(preview.contains("Rotate regularly."));

        fx.store
            .delete_section(&vpath("/guide.md"), "token-rotation")
            .unwrap();
        let content = fs::read_to_string(fx.docs_root.join("guide.md")).unwrap();
        assert!(!content.contains("Rotate regularly."));
    }

    #[test]
    fn create_document_then_find_it() {
        let fx = fixture(&[]);
        fx.store
            .create_document(&vpath("/notes/caching.md"), "# Caching Notes\n\nEviction policy.\n")
            .unwrap();
        assert!(fx.docs_root.join("notes/caching.md").exists());

        let results = fx.store.search("eviction").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "/notes/caching.md");

        let err = fx
            .store
            .create_document(&vpath("/notes/caching.md"), "# Again\n")
            .unwrap_err();
        assert!(matches!(err, DocStoreError::DocumentExists(_)));
    }

    #[test]
    fn search_ranks_title_matches_first() {
        let fx = fixture(&[
            ("auth.md", "# Authentication Guide\n\nTokens and sessions.\n"),
            ("misc.md", "# Miscellany\n\nMentions authentication once.\n"),
        ]);
        let results = fx.store.search("authentication").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "/auth.md");
        assert!(results[0].score > results[1].score);
        assert!(results[1]
            .snippet
            .as_deref()
            .unwrap()
            .contains("authentication once"));
    }

    #[test]
    fn indexed_and_unindexed_search_agree() {
        let fx = fixture(&[
            ("a/cache.md", "# Cache Design\n\ninvalidation and eviction\n"),
            ("a/watch.md", "# Watcher\n\nbackoff and polling\n"),
            ("b/other.md", "# Other\n\nnothing relevant\n"),
        ]);
        for query in ["invalidation", "polling backoff", "cache", "absentword"] {
            let indexed = fx.store.search(query).unwrap();
            let scanned = fx.store.search_unindexed(query).unwrap();
            let paths = |rs: &[SearchResult]| rs.iter().map(|r| r.path.clone()).collect::<Vec<_>>();
            assert_eq!(paths(&indexed), paths(&scanned), "query {query:?}");
        }
    }

    #[test]
    fn search_reflects_mutations() {
        let fx = fixture(&[("doc.md", "# Doc\n\noriginal subject\n")]);
        assert_eq!(fx.store.search("original").unwrap().len(), 1);

        fx.store
            .replace_section(&vpath("/doc.md"), "doc", "rewritten subject matter")
            .unwrap();
        assert!(fx.store.search("original").unwrap().is_empty());
        assert_eq!(fx.store.search("rewritten").unwrap().len(), 1);
    }

    #[test]
    fn delete_document_archives_with_audit() {
        let fx = fixture(&[("specs/auth.md", "# Auth\n\ncontent\n")]);
        let archived = fx
            .store
            .delete_document(&vpath("/specs/auth.md"), "alice")
            .unwrap();
        assert_eq!(archived, "/archived/docs/specs/auth.md");
        assert!(!fx.docs_root.join("specs/auth.md").exists());

        let archive_fs = fx.docs_root.join("archived/docs/specs/auth.md");
        assert!(archive_fs.exists());
        let audit: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(archive_fs.with_extension("md.audit")).unwrap(),
        )
        .unwrap();
        assert_eq!(audit["original_path"], "/specs/auth.md");
        assert_eq!(audit["actor"], "alice");
        assert_eq!(audit["content_hash"].as_str().unwrap().len(), 16);
    }

    #[test]
    fn archive_collisions_get_numeric_suffixes() {
        let fx = fixture(&[("a.md", "# First\n")]);
        assert_eq!(
            fx.store.delete_document(&vpath("/a.md"), "bot").unwrap(),
            "/archived/docs/a.md"
        );

        fx.store.create_document(&vpath("/a.md"), "# Second\n").unwrap();
        assert_eq!(
            fx.store.delete_document(&vpath("/a.md"), "bot").unwrap(),
            "/archived/docs/a_1.md"
        );

        fx.store.create_document(&vpath("/a.md"), "# Third\n").unwrap();
        assert_eq!(
            fx.store.delete_document(&vpath("/a.md"), "bot").unwrap(),
            "/archived/docs/a_2.md"
        );

        // All generations survive.
        assert!(fx.docs_root.join("archived/docs/a.md").exists());
        assert!(fx.docs_root.join("archived/docs/a_1.md").exists());
        assert!(fx.docs_root.join("archived/docs/a_2.md").exists());
    }

    #[test]
    fn delete_invalidates_namespace_and_search() {
        let fx = fixture(&[
            ("specs/auth.md", "# Auth\n\nuniquesubject\n"),
            ("specs/api.md", "# Api\n"),
        ]);
        fx.store
            .get_document(&vpath("/specs/api.md"), AccessContext::Direct)
            .unwrap();
        assert_eq!(fx.store.search("uniquesubject").unwrap().len(), 1);

        fx.store.delete_document(&vpath("/specs/auth.md"), "bot").unwrap();
        // Cached namespace sibling was dropped too.
        assert!(fx.store.cache().cached_paths().is_empty());
        // The live path no longer matches; the archived copy does.
        let results = fx.store.search("uniquesubject").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "/archived/docs/specs/auth.md");
    }

    #[test]
    fn indexed_search_finds_cached_siblings_after_delete() {
        let fx = fixture(&[
            ("specs/auth.md", "# Auth\n"),
            ("specs/api.md", "# Api\n\nsiblingword\n"),
        ]);
        // The sibling is resident in the cache when its neighbor goes.
        fx.store
            .get_document(&vpath("/specs/api.md"), AccessContext::Direct)
            .unwrap();
        fx.store.delete_document(&vpath("/specs/auth.md"), "bot").unwrap();

        // Indexed search runs first so an unindexed scan can't repopulate
        // the index before the assertion.
        let indexed = fx.store.search("siblingword").unwrap();
        assert_eq!(indexed.len(), 1);
        assert_eq!(indexed[0].path, "/specs/api.md");

        let scanned = fx.store.search_unindexed("siblingword").unwrap();
        let paths = |rs: &[SearchResult]| rs.iter().map(|r| r.path.clone()).collect::<Vec<_>>();
        assert_eq!(paths(&indexed), paths(&scanned));
    }

    #[test]
    fn archive_suffix_keeps_inner_md_extension() {
        let fx = fixture(&[("notes.md.md", "# First\n")]);
        assert_eq!(
            fx.store.delete_document(&vpath("/notes.md.md"), "bot").unwrap(),
            "/archived/docs/notes.md.md"
        );

        fx.store.create_document(&vpath("/notes.md.md"), "# Second\n").unwrap();
        assert_eq!(
            fx.store.delete_document(&vpath("/notes.md.md"), "bot").unwrap(),
            "/archived/docs/notes.md_1.md"
        );
    }

    #[test]
    fn stale_write_leaves_cache_and_file_alone() {
        let fx = fixture(&[("doc.md", "# Doc\n\n## Part\n\nbody\n")]);
        let path = vpath("/doc.md");
        let fs_path = fx.docs_root.join("doc.md");

        // Simulate a concurrent external edit between snapshot and write
        // by racing through the guard directly.
        let snapshot = guard::read_snapshot(&fs_path).unwrap().unwrap();
        fs::write(&fs_path, "# Doc\n\n## Part\n\nexternal edit\n").unwrap();
        let file = fs::OpenOptions::new().write(true).open(&fs_path).unwrap();
        file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(5))
            .unwrap();

        let rewritten = section::replace_section_body(&snapshot.content, "part", "mine").unwrap();
        let err = guard::write_if_unchanged(&fs_path, snapshot.mtime, &rewritten).unwrap_err();
        assert!(matches!(err, DocStoreError::StaleWrite(_)));
        assert!(fs::read_to_string(&fs_path).unwrap().contains("external edit"));

        // The store-level mutation sees the fresh snapshot and succeeds.
        fx.store.replace_section(&path, "part", "mine").unwrap();
        assert!(fs::read_to_string(&fs_path).unwrap().contains("mine"));
    }

    #[test]
    fn observers_receive_events_through_store() {
        let events: Arc<Mutex<Vec<CacheEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let hooks = CacheHooks::new().on_event(move |event| sink.lock().push(event.clone()));
        let fx = fixture_with_hooks(&[("doc.md", "# Doc\n")], hooks);

        // Event plumbing is exercised by the watch subsystem; here we only
        // prove the registration survives store construction.
        fx.store
            .get_document(&vpath("/doc.md"), AccessContext::Direct)
            .unwrap();
        assert!(events.lock().iter().all(|e| !matches!(e, CacheEvent::Inconsistency { .. })));
    }

    #[test]
    fn coordinator_namespace_routes_and_archives_separately() {
        let fx = fixture(&[]);
        fx.store
            .create_document(&vpath("/coordinator/tasks/t1.md"), "# Task One\n")
            .unwrap();
        let archived = fx
            .store
            .delete_document(&vpath("/coordinator/tasks/t1.md"), "bot")
            .unwrap();
        assert_eq!(archived, "/archived/coordinator/tasks/t1.md");
        // Archive lives under the docs root regardless of origin.
        assert!(fx
            .docs_root
            .join("archived/coordinator/tasks/t1.md")
            .exists());
    }
}
