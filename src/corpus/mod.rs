pub mod label;

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{
    config::TrainOptions,
    error::{IoResultExt, LangIdError, Result},
};

pub use label::LabelIndex;

/// A training document
/// Created once by the indexer and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub domain_id: u32,
    pub lang_id: u32,
    pub doc_name: String,
    pub path: PathBuf,
}

impl Item {
    /// The instances this item contributes: the whole file, or one per line
    pub fn instances(&self, line_level: bool) -> Result<Vec<Vec<u8>>> {
        let content = fs::read(&self.path).at(&self.path)?;
        if line_level {
            Ok(split_lines(&content).into_iter().map(|l| l.to_vec()).collect())
        } else {
            Ok(vec![content])
        }
    }
}

/// Lines without their terminator
/// A final terminator does not open an extra empty line.
pub fn split_lines(content: &[u8]) -> Vec<&[u8]> {
    if content.is_empty() {
        return Vec::new();
    }
    let body = content.strip_suffix(b"\n").unwrap_or(content);
    body.split(|&b| b == b'\n')
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
        .collect()
}

/// Output of the indexer: items in walk order plus the two label indexes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusIndex {
    pub items: Vec<Item>,
    pub lang_index: LabelIndex,
    pub domain_index: LabelIndex,
}

/// One document found by the walk, before ids are assigned
#[derive(Debug, Clone)]
struct RawEntry {
    domain: String,
    lang: String,
    doc: String,
    path: PathBuf,
    instances: u64,
}

/// Index a corpus laid out as `<root>/<domain>/<lang>/<doc>`
///
/// `root` may also be a text file listing one document path per line, each
/// ending in `<domain>/<lang>/<doc>`. Languages present in fewer than
/// `min_domain` domains are pruned and the surviving ids re-densified.
pub fn index_corpus(root: &Path, options: &TrainOptions) -> Result<CorpusIndex> {
    if options.line_level && options.proportion < 1.0 {
        return Err(LangIdError::config("document sampling cannot be combined with line mode"));
    }
    if !root.exists() {
        return Err(LangIdError::config(format!("corpus {} does not exist", root.display())));
    }
    let entries = if root.is_dir() { walk_tree(root)? } else { read_path_list(root)? };
    log::debug!("found {} candidate documents under {}", entries.len(), root.display());

    let langs: Option<HashSet<&str>> =
        options.langs.as_ref().map(|l| l.iter().map(String::as_str).collect());
    let domains: Option<HashSet<&str>> =
        options.domains.as_ref().map(|d| d.iter().map(String::as_str).collect());
    let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
    let entries: Vec<RawEntry> = entries
        .into_iter()
        .filter(|e| langs.as_ref().map_or(true, |l| l.contains(e.lang.as_str())))
        .filter(|e| domains.as_ref().map_or(true, |d| d.contains(e.domain.as_str())))
        .filter(|_| options.proportion >= 1.0 || rng.gen::<f64>() < options.proportion)
        .collect();
    let entries = if options.line_level { drop_lineless(entries)? } else { entries };

    let entries = prune_min_domain(entries, options.min_domain);
    if entries.is_empty() {
        return Err(LangIdError::config(format!(
            "no documents left in {} after filtering (min_domain = {})",
            root.display(),
            options.min_domain
        )));
    }

    let mut lang_index = LabelIndex::new();
    let mut domain_index = LabelIndex::new();
    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let domain_id = domain_index.id_or_insert(&entry.domain);
        let lang_id = lang_index.id_or_insert(&entry.lang);
        domain_index.add_count(domain_id, entry.instances);
        lang_index.add_count(lang_id, entry.instances);
        items.push(Item { domain_id, lang_id, doc_name: entry.doc, path: entry.path });
    }

    log::info!(
        "[stage] indexed {} documents: {} languages, {} domains",
        items.len(),
        lang_index.len(),
        domain_index.len()
    );
    Ok(CorpusIndex { items, lang_index, domain_index })
}

/// Count the lines of each entry and drop the files without any
///
/// A language made only of such files would train with zero instances.
fn drop_lineless(entries: Vec<RawEntry>) -> Result<Vec<RawEntry>> {
    let before = entries.len();
    let mut kept = Vec::with_capacity(before);
    for mut entry in entries {
        entry.instances = split_lines(&fs::read(&entry.path).at(&entry.path)?).len() as u64;
        if entry.instances > 0 {
            kept.push(entry);
        }
    }
    if kept.len() < before {
        log::info!("skipped {} documents without any line", before - kept.len());
    }
    Ok(kept)
}

/// Drop entries whose language appears in fewer than `min_domain` domains
fn prune_min_domain(entries: Vec<RawEntry>, min_domain: usize) -> Vec<RawEntry> {
    let mut lang_domains: HashMap<&str, HashSet<&str>> = HashMap::new();
    for e in &entries {
        lang_domains.entry(e.lang.as_str()).or_default().insert(e.domain.as_str());
    }
    let keep: HashSet<String> = lang_domains
        .into_iter()
        .filter(|(_, domains)| domains.len() >= min_domain)
        .map(|(lang, _)| lang.to_string())
        .collect();
    let before = entries.len();
    let entries: Vec<RawEntry> = entries.into_iter().filter(|e| keep.contains(&e.lang)).collect();
    if entries.len() < before {
        log::info!(
            "pruned {} documents in languages seen in fewer than {} domains",
            before - entries.len(),
            min_domain
        );
    }
    entries
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)
        .at(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<PathBuf>>>()
        .at(dir)?;
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Files below `dir`, recursively, in sorted order
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for path in sorted_entries(dir)? {
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn walk_tree(root: &Path) -> Result<Vec<RawEntry>> {
    let mut entries = Vec::new();
    for domain_dir in sorted_entries(root)?.into_iter().filter(|p| p.is_dir()) {
        let domain = file_name(&domain_dir);
        for lang_dir in sorted_entries(&domain_dir)?.into_iter().filter(|p| p.is_dir()) {
            let lang = file_name(&lang_dir);
            let mut files = Vec::new();
            collect_files(&lang_dir, &mut files)?;
            for path in files {
                let doc = path
                    .strip_prefix(&lang_dir)
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| file_name(&path));
                entries.push(RawEntry {
                    domain: domain.clone(),
                    lang: lang.clone(),
                    doc,
                    path,
                    instances: 1,
                });
            }
        }
    }
    Ok(entries)
}

fn read_path_list(list: &Path) -> Result<Vec<RawEntry>> {
    let text = fs::read_to_string(list).at(list)?;
    let mut entries = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let path = PathBuf::from(line);
        let parts: Vec<String> = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.len() < 3 {
            return Err(LangIdError::config(format!(
                "path {line:?} does not end in <domain>/<lang>/<doc>"
            )));
        }
        let n = parts.len();
        entries.push(RawEntry {
            domain: parts[n - 3].clone(),
            lang: parts[n - 2].clone(),
            doc: parts[n - 1].clone(),
            path,
            instances: 1,
        });
    }
    Ok(entries)
}

impl CorpusIndex {
    /// Instance count per language
    pub fn lang_dist(&self) -> Vec<u64> {
        self.lang_index.counts()
    }

    /// Instance count per domain
    pub fn domain_dist(&self) -> Vec<u64> {
        self.domain_index.counts()
    }

    /// Write `lang_index`, `domain_index` and `paths` into `out_dir`
    pub fn write(&self, out_dir: &Path) -> Result<()> {
        self.lang_index.write_csv(&out_dir.join("lang_index"))?;
        self.domain_index.write_csv(&out_dir.join("domain_index"))?;
        let paths = out_dir.join("paths");
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(&paths)?;
        for item in &self.items {
            writer.write_record([
                item.domain_id.to_string(),
                item.lang_id.to_string(),
                item.path.to_string_lossy().into_owned(),
            ])?;
        }
        writer.flush().at(&paths)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Write `(domain, lang, doc, content)` documents below `root`
    pub(crate) fn write_corpus(root: &Path, docs: &[(&str, &str, &str, &[u8])]) {
        for (domain, lang, doc, content) in docs {
            let dir = root.join(domain).join(lang);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(doc), content).unwrap();
        }
    }

    #[test]
    fn walk_assigns_ids_in_first_seen_order() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(
            dir.path(),
            &[
                ("d1", "en", "a", b"hello"),
                ("d1", "fr", "b", b"bonjour"),
                ("d2", "en", "c", b"hi"),
            ],
        );
        let index = index_corpus(dir.path(), &TrainOptions::default()).unwrap();
        assert_eq!(index.items.len(), 3);
        assert_eq!(index.lang_index.names().collect::<Vec<_>>(), vec!["en", "fr"]);
        assert_eq!(index.domain_index.names().collect::<Vec<_>>(), vec!["d1", "d2"]);
        assert_eq!(index.lang_dist(), vec![2, 1]);
        assert_eq!(index.items[2].domain_id, 1);
        assert_eq!(index.items[2].lang_id, 0);
    }

    #[test]
    fn min_domain_prunes_and_redensifies() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(
            dir.path(),
            &[
                ("d1", "aa", "x", b"1"),
                ("d1", "bb", "x", b"2"),
                ("d2", "bb", "y", b"3"),
            ],
        );
        let opts = TrainOptions::default().min_domain(2);
        let index = index_corpus(dir.path(), &opts).unwrap();
        assert_eq!(index.lang_index.names().collect::<Vec<_>>(), vec!["bb"]);
        assert!(index.items.iter().all(|i| i.lang_id == 0));
        assert_eq!(index.items.len(), 2);
    }

    #[test]
    fn whitelists_skip_silently() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(
            dir.path(),
            &[("d1", "en", "a", b"x"), ("d1", "de", "b", b"y"), ("d2", "en", "c", b"z")],
        );
        let opts = TrainOptions::default()
            .langs(Some(vec!["en".into()]))
            .domains(Some(vec!["d2".into()]));
        let index = index_corpus(dir.path(), &opts).unwrap();
        assert_eq!(index.items.len(), 1);
        assert_eq!(index.items[0].doc_name, "c");
    }

    #[test]
    fn missing_root_and_empty_result_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = index_corpus(&dir.path().join("nope"), &TrainOptions::default()).unwrap_err();
        assert!(err.is_config());
        write_corpus(dir.path(), &[("d1", "en", "a", b"x")]);
        let err = index_corpus(dir.path(), &TrainOptions::default().min_domain(2)).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn sampling_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let docs: Vec<(String, Vec<u8>)> =
            (0..40).map(|i| (format!("doc{i:02}"), vec![b'a'; 3])).collect();
        let refs: Vec<(&str, &str, &str, &[u8])> =
            docs.iter().map(|(n, c)| ("d", "en", n.as_str(), c.as_slice())).collect();
        write_corpus(dir.path(), &refs);
        let opts = TrainOptions::default().proportion(0.5).seed(7);
        let a = index_corpus(dir.path(), &opts).unwrap();
        let b = index_corpus(dir.path(), &opts).unwrap();
        assert_eq!(a, b);
        assert!(a.items.len() < 40);
    }

    #[test]
    fn line_mode_counts_lines() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), &[("d", "en", "a", b"one\ntwo\nthree\n")]);
        let opts = TrainOptions::default().line_level(true);
        let index = index_corpus(dir.path(), &opts).unwrap();
        assert_eq!(index.lang_dist(), vec![3]);
        let instances = index.items[0].instances(true).unwrap();
        assert_eq!(instances, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
    }

    #[test]
    fn line_mode_drops_languages_without_lines() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(
            dir.path(),
            &[("d", "en", "a", b"the cat\nthe dog\n"), ("d", "xx", "b", b""), ("d", "zz", "c", b"z\n")],
        );
        let opts = TrainOptions::default().line_level(true);
        let index = index_corpus(dir.path(), &opts).unwrap();
        assert_eq!(index.lang_index.names().collect::<Vec<_>>(), vec!["en", "zz"]);
        assert_eq!(index.lang_dist(), vec![2, 1]);
        assert_eq!(index.items[1].lang_id, 1);

        let empty = tempfile::tempdir().unwrap();
        write_corpus(empty.path(), &[("d", "xx", "b", b"")]);
        assert!(index_corpus(empty.path(), &opts).unwrap_err().is_config());
    }

    #[test]
    fn line_mode_rejects_sampling() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), &[("d", "en", "a", b"x")]);
        let opts = TrainOptions::default().line_level(true).proportion(0.5);
        assert!(index_corpus(dir.path(), &opts).unwrap_err().is_config());
    }

    #[test]
    fn path_list_input() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), &[("d1", "en", "a", b"x"), ("d2", "fr", "b", b"y")]);
        let list = dir.path().join("list.txt");
        let text = format!(
            "{}\n{}\n",
            dir.path().join("d1/en/a").display(),
            dir.path().join("d2/fr/b").display()
        );
        fs::write(&list, text).unwrap();
        let index = index_corpus(&list, &TrainOptions::default()).unwrap();
        assert_eq!(index.lang_index.names().collect::<Vec<_>>(), vec!["en", "fr"]);
        assert_eq!(index.domain_index.names().collect::<Vec<_>>(), vec!["d1", "d2"]);
    }

    #[test]
    fn split_lines_handles_terminators() {
        assert!(split_lines(b"").is_empty());
        let expected: Vec<&[u8]> = vec![b"a", b"", b"b"];
        assert_eq!(split_lines(b"a\r\n\nb"), expected);
        assert_eq!(split_lines(b"a\n\nb\n"), expected);
    }

    #[test]
    fn writes_stage_files() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus");
        write_corpus(&corpus, &[("d1", "en", "a", b"x")]);
        let index = index_corpus(&corpus, &TrainOptions::default()).unwrap();
        index.write(dir.path()).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("lang_index")).unwrap(), "en,1\n");
        let paths = fs::read_to_string(dir.path().join("paths")).unwrap();
        assert!(paths.starts_with("0,0,"));
        assert_eq!(LabelIndex::read_csv(&dir.path().join("domain_index")).unwrap().len(), 1);
    }
}
