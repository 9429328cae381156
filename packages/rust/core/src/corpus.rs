//! Local corpus enumeration and content loading.
//!
//! A corpus directory holds one entry per text unit: either `<ID>.txt` or a
//! directory `<ID>/` containing one or more `*.txt` files.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use docbridge_shared::{ContentLocator, DocBridgeError, IdRange, Result, TextId, TextUnit};

/// Gap detection is skipped for numeric spans wider than this.
const MAX_GAP_SCAN: u64 = 1_000_000;

/// How many missing IDs are spelled out in the warning.
const MISSING_PREVIEW: usize = 20;

/// Result of enumerating a range.
#[derive(Debug, Default)]
pub struct Enumeration {
    /// Units with local content, in natural ID order.
    pub units: Vec<TextUnit>,
    /// IDs expected in the range that have no local content.
    pub missing: Vec<TextId>,
}

/// Enumerates text units under a corpus root.
#[derive(Debug, Clone)]
pub struct CorpusEnumerator {
    root: PathBuf,
    id_list: Option<BTreeSet<TextId>>,
}

impl CorpusEnumerator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            id_list: None,
        }
    }

    /// Restrict enumeration to the given IDs (still intersected with the range).
    pub fn with_id_list(mut self, ids: impl IntoIterator<Item = TextId>) -> Self {
        self.id_list = Some(ids.into_iter().collect());
        self
    }

    /// List the units in `range` that have local content.
    ///
    /// IDs the range implies (numeric gaps, or entries of the ID list) but
    /// which have no content are returned in [`Enumeration::missing`] and
    /// logged as a warning.
    #[instrument(skip_all, fields(root = %self.root.display(), range = %range))]
    pub fn enumerate(&self, range: &IdRange) -> Result<Enumeration> {
        let found = self.scan()?;

        let units: Vec<TextUnit> = found
            .into_iter()
            .filter(|unit| range.contains(&unit.id))
            .filter(|unit| self.id_list.as_ref().is_none_or(|list| list.contains(&unit.id)))
            .collect();

        let missing = self.missing_ids(range, &units);

        if !missing.is_empty() {
            let preview = missing
                .iter()
                .take(MISSING_PREVIEW)
                .map(TextId::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            warn!(
                count = missing.len(),
                ids = %preview,
                "IDs in range have no local content and will be skipped"
            );
        }

        info!(units = units.len(), missing = missing.len(), "corpus enumerated");
        Ok(Enumeration { units, missing })
    }

    /// Every unit under the root, sorted by ID.
    fn scan(&self) -> Result<Vec<TextUnit>> {
        let entries =
            std::fs::read_dir(&self.root).map_err(|e| DocBridgeError::io(&self.root, e))?;

        let mut units: Vec<TextUnit> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DocBridgeError::io(&self.root, e))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            let unit = if path.is_dir() {
                if !has_text_files(&path)? {
                    debug!(dir = %path.display(), "directory has no .txt files, ignoring");
                    continue;
                }
                TextUnit {
                    id: TextId::new(&name),
                    locator: ContentLocator::Directory(path),
                }
            } else if is_text_file(&path) {
                let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned())
                else {
                    continue;
                };
                TextUnit {
                    id: TextId::new(stem),
                    locator: ContentLocator::File(path),
                }
            } else {
                continue;
            };

            if unit.id.is_empty() {
                continue;
            }
            units.push(unit);
        }

        units.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| prefer_file(&a.locator, &b.locator)));
        units.dedup_by(|later, earlier| {
            let duplicate = later.id == earlier.id;
            if duplicate {
                warn!(id = %earlier.id, "both a file and a directory exist; using the file");
            }
            duplicate
        });
        Ok(units)
    }

    /// IDs the caller expects in `range` (numeric gaps, or entries of the ID
    /// list) that none of `units` provides.
    fn missing_ids(&self, range: &IdRange, units: &[TextUnit]) -> Vec<TextId> {
        let covered: BTreeSet<(&str, u64)> = units
            .iter()
            .filter_map(|unit| unit.id.parts())
            .map(|parts| (parts.prefix, parts.number))
            .collect();

        if let Some(list) = &self.id_list {
            let present: BTreeSet<&TextId> = units.iter().map(|u| &u.id).collect();
            return list
                .iter()
                .filter(|id| range.contains(id) && !present.contains(id))
                .filter(|id| !covered_by_variant(id, &covered))
                .cloned()
                .collect();
        }

        let (Some(start), Some(end)) = (range.start.parts(), range.end.parts()) else {
            return Vec::new();
        };
        if start.prefix != end.prefix || end.number - start.number > MAX_GAP_SCAN {
            return Vec::new();
        }

        // Keep zero padding when the start bound uses it (D0001..D0100).
        let width = if start.digits.starts_with('0') {
            start.digits.len()
        } else {
            0
        };
        let mut missing = Vec::new();
        for number in start.number..=end.number {
            if covered.contains(&(start.prefix, number)) {
                continue;
            }
            let id = TextId::new(format!("{}{number:0width$}", start.prefix));
            // Only the bounds can carry a suffix that excludes the bare ID.
            let on_bound = number == start.number || number == end.number;
            if on_bound && !range.contains(&id) {
                continue;
            }
            missing.push(id);
        }
        missing
    }
}

/// `D5` counts as present when a suffixed variant such as `D5a` exists.
fn covered_by_variant(id: &TextId, covered: &BTreeSet<(&str, u64)>) -> bool {
    id.parts().is_some_and(|parts| {
        parts.suffix.is_empty() && covered.contains(&(parts.prefix, parts.number))
    })
}

fn prefer_file(a: &ContentLocator, b: &ContentLocator) -> std::cmp::Ordering {
    let rank = |l: &ContentLocator| match l {
        ContentLocator::File(_) => 0,
        ContentLocator::Directory(_) => 1,
    };
    rank(a).cmp(&rank(b))
}

fn is_text_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "txt")
}

fn has_text_files(dir: &Path) -> Result<bool> {
    let entries = std::fs::read_dir(dir).map_err(|e| DocBridgeError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| DocBridgeError::io(dir, e))?;
        if is_text_file(&entry.path()) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Read an ID list file: one ID per line, blank lines and `#` comments ignored.
pub fn read_id_list(path: &Path) -> Result<Vec<TextId>> {
    let content = std::fs::read_to_string(path).map_err(|e| DocBridgeError::io(path, e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(TextId::new)
        .collect())
}

/// Load the body of a unit.
///
/// Unreadable or empty content is a [`DocBridgeError::Content`] error:
/// retrying the upload would not help.
pub fn load_content(unit: &TextUnit) -> Result<String> {
    let unreadable = |path: &Path, e: std::io::Error| {
        DocBridgeError::content(unit.id.as_str(), format!("cannot read {}: {e}", path.display()))
    };

    let body = match &unit.locator {
        ContentLocator::File(path) => {
            std::fs::read_to_string(path).map_err(|e| unreadable(path.as_path(), e))?
        }
        ContentLocator::Directory(dir) => {
            let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
                .map_err(|e| unreadable(dir.as_path(), e))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| is_text_file(path))
                .collect();
            files.sort();

            let mut parts = Vec::with_capacity(files.len());
            for file in &files {
                parts.push(std::fs::read_to_string(file).map_err(|e| unreadable(file.as_path(), e))?);
            }
            parts.join("\n")
        }
    };

    if body.trim().is_empty() {
        return Err(DocBridgeError::content(unit.id.as_str(), "content is empty"));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct TempCorpus {
        root: PathBuf,
    }

    impl TempCorpus {
        fn new() -> Self {
            let root = std::env::temp_dir().join(format!("docbridge_corpus_{}", Uuid::now_v7()));
            std::fs::create_dir_all(&root).unwrap();
            Self { root }
        }

        fn file(&self, name: &str, body: &str) -> &Self {
            std::fs::write(self.root.join(name), body).unwrap();
            self
        }

        fn dir(&self, name: &str, files: &[(&str, &str)]) -> &Self {
            let dir = self.root.join(name);
            std::fs::create_dir_all(&dir).unwrap();
            for (file, body) in files {
                std::fs::write(dir.join(file), body).unwrap();
            }
            self
        }
    }

    impl Drop for TempCorpus {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    fn range(start: &str, end: &str) -> IdRange {
        IdRange::new(start.into(), end.into()).unwrap()
    }

    fn ids(units: &[TextUnit]) -> Vec<&str> {
        units.iter().map(|u| u.id.as_str()).collect()
    }

    #[test]
    fn enumerates_closed_range_in_natural_order() {
        let corpus = TempCorpus::new();
        corpus
            .file("D10.txt", "ten")
            .file("D2.txt", "two")
            .file("D1.txt", "one")
            .file("D11.txt", "eleven")
            .dir("D3", &[("D3.txt", "three")])
            .file("notes.md", "ignored");

        let result = CorpusEnumerator::new(&corpus.root)
            .enumerate(&range("D2", "D10"))
            .unwrap();

        assert_eq!(ids(&result.units), vec!["D2", "D3", "D10"]);
        let missing: Vec<&str> = result.missing.iter().map(TextId::as_str).collect();
        assert_eq!(missing, vec!["D4", "D5", "D6", "D7", "D8", "D9"]);
    }

    #[test]
    fn suffixed_variant_fills_gap() {
        let corpus = TempCorpus::new();
        corpus.file("D1.txt", "a").file("D2a.txt", "b").file("D3.txt", "c");

        let result = CorpusEnumerator::new(&corpus.root)
            .enumerate(&range("D1", "D3"))
            .unwrap();
        assert_eq!(ids(&result.units), vec!["D1", "D2a", "D3"]);
        assert!(result.missing.is_empty());
    }

    #[test]
    fn wide_sparse_range_finds_every_gap() {
        let corpus = TempCorpus::new();
        for n in (50..=50_000).step_by(50) {
            corpus.file(&format!("D{n}.txt"), "body");
        }

        let started = std::time::Instant::now();
        let result = CorpusEnumerator::new(&corpus.root)
            .enumerate(&range("D1", "D50000"))
            .unwrap();

        assert_eq!(result.units.len(), 1_000);
        assert_eq!(result.missing.len(), 49_000);
        assert_eq!(result.missing[..3], ["D1", "D2", "D3"].map(TextId::new));
        assert_eq!(result.missing.last(), Some(&TextId::new("D49999")));
        assert!(!result.missing.contains(&TextId::new("D100")));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn suffixed_bound_excludes_bare_id() {
        let corpus = TempCorpus::new();
        corpus.file("D5a.txt", "a").file("D7.txt", "c");

        let result = CorpusEnumerator::new(&corpus.root)
            .enumerate(&range("D5b", "D7"))
            .unwrap();
        assert_eq!(ids(&result.units), vec!["D7"]);
        assert_eq!(result.missing, vec![TextId::new("D6")]);
    }

    #[test]
    fn empty_directory_is_not_content() {
        let corpus = TempCorpus::new();
        corpus.file("D1.txt", "a").dir("D2", &[]);

        let result = CorpusEnumerator::new(&corpus.root)
            .enumerate(&range("D1", "D2"))
            .unwrap();
        assert_eq!(ids(&result.units), vec!["D1"]);
        assert_eq!(result.missing, vec![TextId::new("D2")]);
    }

    #[test]
    fn file_wins_over_directory() {
        let corpus = TempCorpus::new();
        corpus
            .file("D1.txt", "from file")
            .dir("D1", &[("part.txt", "from dir")]);

        let result = CorpusEnumerator::new(&corpus.root)
            .enumerate(&range("D1", "D1"))
            .unwrap();
        assert_eq!(result.units.len(), 1);
        assert!(matches!(result.units[0].locator, ContentLocator::File(_)));
    }

    #[test]
    fn id_list_restricts_and_reports_missing() {
        let corpus = TempCorpus::new();
        corpus.file("D1.txt", "a").file("D2.txt", "b").file("D3.txt", "c");

        let result = CorpusEnumerator::new(&corpus.root)
            .with_id_list(["D1", "D3", "D4", "D9"].map(TextId::new))
            .enumerate(&range("D1", "D5"))
            .unwrap();
        assert_eq!(ids(&result.units), vec!["D1", "D3"]);
        assert_eq!(result.missing, vec![TextId::new("D4")]);
    }

    #[test]
    fn zero_padded_gaps() {
        let corpus = TempCorpus::new();
        corpus.file("T0001.txt", "a").file("T0003.txt", "c");

        let result = CorpusEnumerator::new(&corpus.root)
            .enumerate(&range("T0001", "T0003"))
            .unwrap();
        assert_eq!(result.missing, vec![TextId::new("T0002")]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let root = std::env::temp_dir().join(format!("docbridge_absent_{}", Uuid::now_v7()));
        let err = CorpusEnumerator::new(&root)
            .enumerate(&range("D1", "D2"))
            .unwrap_err();
        assert!(matches!(err, DocBridgeError::Io { .. }));
    }

    #[test]
    fn load_content_joins_directory_files_in_order() {
        let corpus = TempCorpus::new();
        corpus.dir("D7", &[("b.txt", "second"), ("a.txt", "first"), ("x.json", "{}")]);

        let unit = TextUnit {
            id: "D7".into(),
            locator: ContentLocator::Directory(corpus.root.join("D7")),
        };
        assert_eq!(load_content(&unit).unwrap(), "first\nsecond");
    }

    #[test]
    fn empty_content_is_a_content_error() {
        let corpus = TempCorpus::new();
        corpus.file("D8.txt", "  \n");

        let unit = TextUnit {
            id: "D8".into(),
            locator: ContentLocator::File(corpus.root.join("D8.txt")),
        };
        let err = load_content(&unit).unwrap_err();
        assert!(matches!(err, DocBridgeError::Content { .. }));
    }

    #[test]
    fn id_list_file_parsing() {
        let corpus = TempCorpus::new();
        corpus.file("ids.list", "D1\n\n# comment\n  D2  \n");
        let ids = read_id_list(&corpus.root.join("ids.list")).unwrap();
        assert_eq!(ids, vec![TextId::new("D1"), TextId::new("D2")]);
    }
}
