pub mod describe;
pub mod format;
pub mod new;
pub mod search;
pub mod validate;

pub use describe::{describe, DescribeArgs};
pub use format::{format, FormatArgs};
pub use new::{new, NewArgs};
pub use search::{search, SearchArgs};
pub use validate::{validate, ValidateArgs};

use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use structdoc_editor::{Document, ItemId, UndoRedoLog};
use structdoc_schema::{Schema, SchemaLoader};
use tracing::debug;
use walkdir::WalkDir;

/// Options shared by every command that needs a schema.
#[derive(Args, Debug, Clone, Default)]
pub struct SchemaArgs {
    /// Schema directory (overrides `schemaDir` from the config)
    #[arg(long)]
    pub schema_dir: Option<PathBuf>,

    /// Plain collections are written without their wrapper element
    #[arg(long)]
    pub array_mode: bool,
}

/// Config plus the schema it points at.
pub struct Project {
    pub config: Config,
    pub schema: Rc<Schema>,
}

impl Project {
    pub fn open(args: &SchemaArgs, cwd: &str) -> Result<Self> {
        let mut config = Config::load(cwd)?;
        config.array_mode |= args.array_mode;

        let schema_dir = match &args.schema_dir {
            Some(dir) => PathBuf::from(cwd).join(dir),
            None => config.get_schema_dir(cwd),
        };
        let schema = load_schema(&schema_dir, &config.schema_extension)?;
        for warning in schema.warnings() {
            eprintln!("{} {}", "warning:".yellow().bold(), warning);
        }

        Ok(Self {
            config,
            schema: Rc::new(schema),
        })
    }

    pub fn load_document(&self, path: &Path) -> Result<Document> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let document =
            Document::load_with(Rc::clone(&self.schema), &source, self.config.load_options())
                .with_context(|| format!("Cannot load {}", path.display()))?;
        Ok(document.with_history(UndoRedoLog::new().with_grouping(self.config.grouping())))
    }

    pub fn save_document(&self, document: &Document) -> Result<String> {
        Ok(document.save_with(&self.config.save_options())?)
    }
}

/// Merge every schema file under `dir` into one registry.
pub fn load_schema(dir: &Path, extension: &str) -> Result<Schema> {
    if !dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Schema directory does not exist: {}",
            dir.display()
        ));
    }

    let mut loader = SchemaLoader::new();
    let mut count = 0;
    for file in find_files(dir, extension) {
        let text = fs::read_to_string(&file)?;
        loader.add_source(&file.display().to_string(), &text)?;
        debug!(file = %file.display(), "loaded schema source");
        count += 1;
    }

    if count == 0 {
        return Err(anyhow::anyhow!(
            "No .{} files found in {}",
            extension,
            dir.display()
        ));
    }
    Ok(loader.finish()?)
}

/// Files under `dir` with `extension`, in a stable order.
pub fn find_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|e| e.eq_ignore_ascii_case(extension))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// Depth-first walk over the logical item tree.
pub fn walk(document: &Document, id: ItemId, depth: usize, visit: &mut dyn FnMut(ItemId, usize)) {
    visit(id, depth);
    for child in document.tree().logical_children(id) {
        walk(document, child, depth + 1, visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"<Definitions>
        <Struct Name="Note">
          <String Name="Title" Default="Untitled" />
          <Number Name="Priority" Default="1" Min="0" Max="5" Type="INT" />
        </Struct>
    </Definitions>"#;

    fn project_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("schema")).unwrap();
        fs::write(dir.path().join("schema/note.xmldef"), SCHEMA).unwrap();
        fs::write(dir.path().join("schema/readme.txt"), "not a schema").unwrap();
        dir
    }

    #[test]
    fn test_project_loads_schema_from_config_dir() {
        let dir = project_dir();
        let project = Project::open(&SchemaArgs::default(), &dir.path().display().to_string())
            .unwrap();
        assert!(project.schema.root("note").is_some());
    }

    #[test]
    fn test_missing_schema_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Project::open(&SchemaArgs::default(), &dir.path().display().to_string())
            .err()
            .unwrap();
        assert!(err.to_string().contains("does not exist"), "{err}");
    }

    #[test]
    fn test_only_matching_extensions_are_loaded() {
        let dir = project_dir();
        let files = find_files(&dir.path().join("schema"), "xmldef");
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("note.xmldef"));
    }

    #[test]
    fn test_document_round_trip_through_project() {
        let dir = project_dir();
        let project = Project::open(&SchemaArgs::default(), &dir.path().display().to_string())
            .unwrap();
        let path = dir.path().join("todo.xml");
        fs::write(&path, "<Note><Priority>9</Priority></Note>").unwrap();

        let document = project.load_document(&path).unwrap();
        let saved = project.save_document(&document).unwrap();
        assert!(saved.contains("<Priority>5</Priority>"), "{saved}");
        assert!(saved.contains("<Title>Untitled</Title>"), "{saved}");
    }
}
