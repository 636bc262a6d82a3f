//! Read → filter → write pipeline over the resource files of one package.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::document::{Document, split_documents};
use crate::core::filter::Filter;
use crate::error::{Result, SetterError};
use crate::io::config::SettersConfig;
use crate::io::packages::resource_files;

/// Source and sink of the documents a pipeline works on.
pub trait ReadWriter {
    fn read(&mut self) -> Result<Vec<Document>>;
    fn write(&mut self, documents: Vec<Document>) -> Result<()>;
}

/// A resource file as it was read.
#[derive(Debug, Clone)]
struct SourceFile {
    text: String,
    documents: Vec<Document>,
}

/// Reads and writes the resource files of one package directory.
///
/// Document paths are relative to the package directory.
#[derive(Debug)]
pub struct PackageReadWriter {
    dir: PathBuf,
    config: SettersConfig,
    no_delete_files: bool,
    sources: BTreeMap<PathBuf, SourceFile>,
    written: Vec<PathBuf>,
}

impl PackageReadWriter {
    pub fn new(dir: &Path, config: &SettersConfig) -> Self {
        Self {
            dir: dir.to_path_buf(),
            config: config.clone(),
            no_delete_files: false,
            sources: BTreeMap::new(),
            written: Vec::new(),
        }
    }

    /// Keep files and documents that no filter passed on.
    ///
    /// When set, documents missing from the output are taken from the read,
    /// and files with no output documents are left alone.
    pub fn no_delete_files(mut self, enabled: bool) -> Self {
        self.no_delete_files = enabled;
        self
    }

    /// Files written by the last `write`, relative to the package directory.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn assemble(&self, path: &Path, outputs: BTreeMap<usize, Document>) -> String {
        let originals = self
            .sources
            .get(path)
            .map(|source| source.documents.as_slice())
            .unwrap_or_default();
        if !self.no_delete_files {
            return outputs.values().map(Document::render).collect();
        }
        let mut remaining = outputs;
        let mut text = String::new();
        for original in originals {
            match remaining.remove(&original.index()) {
                Some(document) => text.push_str(&document.render()),
                None => text.push_str(original.original()),
            }
        }
        for document in remaining.values() {
            text.push_str(&document.render());
        }
        text
    }
}

impl ReadWriter for PackageReadWriter {
    fn read(&mut self) -> Result<Vec<Document>> {
        self.sources.clear();
        let mut documents = Vec::new();
        for relative in resource_files(&self.dir, &self.config)? {
            let full = self.dir.join(&relative);
            let text = fs::read_to_string(&full).map_err(|err| SetterError::io("read", &full, err))?;
            let parsed = split_documents(&text)
                .into_iter()
                .enumerate()
                .map(|(index, piece)| Document::parse(&relative, index, piece))
                .collect::<Result<Vec<_>>>()?;
            debug!(file = %full.display(), documents = parsed.len(), "read resource file");
            documents.extend(parsed.iter().cloned());
            self.sources.insert(
                relative,
                SourceFile {
                    text,
                    documents: parsed,
                },
            );
        }
        Ok(documents)
    }

    fn write(&mut self, documents: Vec<Document>) -> Result<()> {
        self.written.clear();
        for document in &documents {
            document.validate()?;
        }

        let mut by_file: BTreeMap<PathBuf, BTreeMap<usize, Document>> = BTreeMap::new();
        for document in documents {
            by_file
                .entry(document.path().to_path_buf())
                .or_default()
                .insert(document.index(), document);
        }

        let mut rendered = Vec::with_capacity(by_file.len());
        for (path, outputs) in by_file {
            let text = self.assemble(&path, outputs);
            rendered.push((path, text));
        }

        for (path, text) in &rendered {
            let unchanged = self
                .sources
                .get(path)
                .is_some_and(|source| source.text == *text);
            if unchanged && !self.config.rewrite_unchanged {
                continue;
            }
            let full = self.dir.join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).map_err(|err| SetterError::io("create", parent, err))?;
            }
            fs::write(&full, text).map_err(|err| SetterError::io("write", &full, err))?;
            debug!(file = %full.display(), "wrote resource file");
            self.written.push(path.clone());
        }

        if !self.no_delete_files {
            for path in self.sources.keys() {
                if rendered.iter().any(|(written, _)| written == path) {
                    continue;
                }
                let full = self.dir.join(path);
                fs::remove_file(&full).map_err(|err| SetterError::io("delete", &full, err))?;
                debug!(file = %full.display(), "deleted resource file");
            }
        }
        Ok(())
    }
}

/// A read, a chain of filters, and a write.
pub struct Pipeline<'a> {
    read_writer: &'a mut dyn ReadWriter,
    filters: Vec<&'a mut dyn Filter>,
}

impl<'a> Pipeline<'a> {
    pub fn new(read_writer: &'a mut dyn ReadWriter) -> Self {
        Self {
            read_writer,
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: &'a mut dyn Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Run the pipeline. Nothing is written if reading or any filter fails.
    pub fn execute(self) -> Result<()> {
        let mut documents = self.read_writer.read()?;
        for filter in self.filters {
            documents = filter.filter(documents)?;
        }
        self.read_writer.write(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::Rewrite;

    /// Drops the marker from every binding it sees.
    struct ClearAll;

    impl Filter for ClearAll {
        fn filter(&mut self, documents: Vec<Document>) -> Result<Vec<Document>> {
            Ok(documents
                .into_iter()
                .filter_map(|mut document| {
                    (document.rewrite_bindings(|_| Some(Rewrite::Clear)) > 0).then_some(document)
                })
                .collect())
        }
    }

    struct Fails;

    impl Filter for Fails {
        fn filter(&mut self, _documents: Vec<Document>) -> Result<Vec<Document>> {
            Err(SetterError::SetterNotFound {
                name: "x".to_string(),
            })
        }
    }

    const MULTI: &str = "a: 1 # {\"$kpt-set\":\"a\"}\n---\nb: 2\n";

    fn package() -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("Krmfile"), "kind: Krmfile\n").expect("write");
        fs::write(temp.path().join("multi.yaml"), MULTI).expect("write");
        fs::write(temp.path().join("plain.yaml"), "c: 3\n").expect("write");
        temp
    }

    #[test]
    fn preserve_untouched_keeps_siblings_and_files() {
        let temp = package();
        let mut rw =
            PackageReadWriter::new(temp.path(), &SettersConfig::default()).no_delete_files(true);
        let mut filter = ClearAll;
        Pipeline::new(&mut rw).filter(&mut filter).execute().expect("execute");

        let multi = fs::read_to_string(temp.path().join("multi.yaml")).expect("read");
        assert_eq!(multi, "a: 1\n---\nb: 2\n");
        assert_eq!(
            fs::read_to_string(temp.path().join("plain.yaml")).expect("read"),
            "c: 3\n"
        );
    }

    #[test]
    fn without_preserve_unreturned_documents_and_files_are_dropped() {
        let temp = package();
        let mut rw = PackageReadWriter::new(temp.path(), &SettersConfig::default());
        let mut filter = ClearAll;
        Pipeline::new(&mut rw).filter(&mut filter).execute().expect("execute");

        let multi = fs::read_to_string(temp.path().join("multi.yaml")).expect("read");
        assert_eq!(multi, "a: 1\n");
        assert!(!temp.path().join("plain.yaml").exists());
        assert!(temp.path().join("Krmfile").exists());
    }

    #[test]
    fn failing_filter_writes_nothing() {
        let temp = package();
        let mut rw = PackageReadWriter::new(temp.path(), &SettersConfig::default());
        let mut clear = ClearAll;
        let mut fails = Fails;
        let err = Pipeline::new(&mut rw)
            .filter(&mut clear)
            .filter(&mut fails)
            .execute()
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            fs::read_to_string(temp.path().join("multi.yaml")).expect("read"),
            MULTI
        );
        assert!(temp.path().join("plain.yaml").exists());
    }

    #[test]
    fn malformed_resource_aborts_read() {
        let temp = package();
        fs::write(temp.path().join("bad.yaml"), "a: [1, 2\n").expect("write");
        let mut rw = PackageReadWriter::new(temp.path(), &SettersConfig::default());
        let err = rw.read().unwrap_err();
        assert!(matches!(err, SetterError::Parse { .. }));
    }

    #[test]
    fn unchanged_files_are_only_rewritten_when_configured() {
        let temp = package();
        let mut rw =
            PackageReadWriter::new(temp.path(), &SettersConfig::default()).no_delete_files(true);
        let documents = rw.read().expect("read");
        rw.write(documents).expect("write");
        assert!(rw.written().is_empty());

        let config = SettersConfig {
            rewrite_unchanged: true,
            ..SettersConfig::default()
        };
        let mut rw = PackageReadWriter::new(temp.path(), &config).no_delete_files(true);
        let documents = rw.read().expect("read");
        rw.write(documents).expect("write");
        assert_eq!(
            rw.written(),
            [PathBuf::from("multi.yaml"), PathBuf::from("plain.yaml")]
        );
        assert_eq!(
            fs::read_to_string(temp.path().join("multi.yaml")).expect("read"),
            MULTI
        );
    }
}
