use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use walkdir::WalkDir;

use crate::wikitext::contains_template;

pub const PAGE_EXTENSION: &str = ".wiki";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Main,
    Category,
    File,
    User,
    Template,
    Module,
    MediaWiki,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "Main",
            Self::Category => "Category",
            Self::File => "File",
            Self::User => "User",
            Self::Template => "Template",
            Self::Module => "Module",
            Self::MediaWiki => "MediaWiki",
        }
    }

    fn from_folder(folder: &str) -> Option<Self> {
        match folder {
            "Category" => Some(Self::Category),
            "File" => Some(Self::File),
            "User" => Some(Self::User),
            "Template" => Some(Self::Template),
            "Module" => Some(Self::Module),
            "MediaWiki" => Some(Self::MediaWiki),
            _ => None,
        }
    }

    /// The bot only ever edits content pages.
    pub fn is_content(self) -> bool {
        matches!(self, Self::Main)
    }
}

/// One page pulled from the store: everything the per-page step needs.
#[derive(Debug, Clone)]
pub struct PageDocument {
    pub title: String,
    pub namespace: Namespace,
    pub text: String,
}

/// The page source collaborator. Supplies the ordered set of pages
/// carrying a template, a per-page document, and a commit that flushes a
/// page's queued mutations as one edit.
pub trait PageStore {
    fn list_pages(&self, template_name: &str) -> Result<Vec<String>>;
    fn load(&self, title: &str) -> Result<PageDocument>;
    fn commit(&mut self, title: &str, new_text: &str, summary: &str) -> Result<()>;
}

/// Title/path codec for the local mirror layout: known namespace folders
/// at the first level, `_` for spaces, `.wiki` files.
pub fn title_for_relative_path(relative: &str) -> (String, Namespace) {
    let normalized = relative.replace('\\', "/");
    let stem = normalized
        .strip_suffix(PAGE_EXTENSION)
        .unwrap_or(&normalized);

    if let Some((folder, rest)) = stem.split_once('/')
        && let Some(namespace) = Namespace::from_folder(folder)
    {
        let name = rest.replace('_', " ");
        return (format!("{}:{name}", namespace.as_str()), namespace);
    }

    (stem.replace('_', " "), Namespace::Main)
}

pub fn relative_path_for_title(title: &str) -> PathBuf {
    let (folder, name) = match title.split_once(':') {
        Some((prefix, rest)) if Namespace::from_folder(prefix).is_some() => {
            (Some(prefix), rest)
        }
        _ => (None, title),
    };
    let filename = format!("{}{PAGE_EXTENSION}", name.replace(' ', "_"));
    match folder {
        Some(folder) => Path::new(folder).join(filename),
        None => PathBuf::from(filename),
    }
}

pub fn namespace_of_title(title: &str) -> Namespace {
    match title.split_once(':') {
        Some((prefix, _)) => Namespace::from_folder(prefix).unwrap_or(Namespace::Main),
        None => Namespace::Main,
    }
}

/// Local mirror of wiki content: one `.wiki` file per page under a content
/// directory. A commit is one whole-file write.
pub struct FilesystemStore {
    content_dir: PathBuf,
}

impl FilesystemStore {
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
        }
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    fn page_path(&self, title: &str) -> PathBuf {
        self.content_dir.join(relative_path_for_title(title))
    }
}

impl PageStore for FilesystemStore {
    fn list_pages(&self, template_name: &str) -> Result<Vec<String>> {
        if !self.content_dir.exists() {
            bail!(
                "content directory {} does not exist",
                self.content_dir.display()
            );
        }

        let mut titles = Vec::new();
        for entry in WalkDir::new(&self.content_dir) {
            let entry =
                entry.with_context(|| format!("failed to walk {}", self.content_dir.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !name.ends_with(PAGE_EXTENSION) {
                continue;
            }
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            if !contains_template(&text, template_name) {
                continue;
            }
            let relative = path.strip_prefix(&self.content_dir).with_context(|| {
                format!(
                    "failed to strip {} from {}",
                    self.content_dir.display(),
                    path.display()
                )
            })?;
            let (title, _) = title_for_relative_path(&relative.to_string_lossy());
            titles.push(title);
        }

        titles.sort();
        Ok(titles)
    }

    fn load(&self, title: &str) -> Result<PageDocument> {
        let path = self.page_path(title);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read page '{title}' at {}", path.display()))?;
        Ok(PageDocument {
            title: title.to_string(),
            namespace: namespace_of_title(title),
            text,
        })
    }

    fn commit(&mut self, title: &str, new_text: &str, _summary: &str) -> Result<()> {
        let path = self.page_path(title);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, new_text)
            .with_context(|| format!("failed to write page '{title}' at {}", path.display()))
    }
}

/// In-memory store for tests and rehearsal runs. Records commit summaries
/// so the one-edit-per-page behavior is observable.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pages: Vec<MemoryPage>,
}

#[derive(Debug, Clone)]
pub struct MemoryPage {
    pub title: String,
    pub namespace: Namespace,
    pub text: String,
    pub commit_summaries: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, title: &str, namespace: Namespace, text: &str) -> Self {
        self.pages.push(MemoryPage {
            title: title.to_string(),
            namespace,
            text: text.to_string(),
            commit_summaries: Vec::new(),
        });
        self
    }

    pub fn page(&self, title: &str) -> Option<&MemoryPage> {
        self.pages.iter().find(|page| page.title == title)
    }
}

impl PageStore for MemoryStore {
    fn list_pages(&self, template_name: &str) -> Result<Vec<String>> {
        Ok(self
            .pages
            .iter()
            .filter(|page| contains_template(&page.text, template_name))
            .map(|page| page.title.clone())
            .collect())
    }

    fn load(&self, title: &str) -> Result<PageDocument> {
        match self.page(title) {
            Some(page) => Ok(PageDocument {
                title: page.title.clone(),
                namespace: page.namespace,
                text: page.text.clone(),
            }),
            None => bail!("page '{title}' not found"),
        }
    }

    fn commit(&mut self, title: &str, new_text: &str, summary: &str) -> Result<()> {
        match self.pages.iter_mut().find(|page| page.title == title) {
            Some(page) => {
                page.text = new_text.to_string();
                page.commit_summaries.push(summary.to_string());
                Ok(())
            }
            None => bail!("page '{title}' not found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn title_codec_roundtrips_main_and_namespaced_pages() {
        let (title, namespace) = title_for_relative_path("Vanguard_class.wiki");
        assert_eq!(title, "Vanguard class");
        assert_eq!(namespace, Namespace::Main);
        assert_eq!(
            relative_path_for_title("Vanguard class"),
            PathBuf::from("Vanguard_class.wiki")
        );

        let (title, namespace) = title_for_relative_path("Template/Ship_infobox.wiki");
        assert_eq!(title, "Template:Ship infobox");
        assert_eq!(namespace, Namespace::Template);
        assert_eq!(
            relative_path_for_title("Template:Ship infobox"),
            Path::new("Template").join("Ship_infobox.wiki")
        );
    }

    #[test]
    fn unknown_folder_stays_in_main_namespace() {
        let (title, namespace) = title_for_relative_path("Guides/Getting_started.wiki");
        assert_eq!(title, "Guides/Getting started");
        assert_eq!(namespace, Namespace::Main);
    }

    #[test]
    fn filesystem_store_lists_pages_carrying_the_template() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        fs::write(root.join("Vanguard.wiki"), "{{Ship infobox|crew=5}}").expect("write");
        fs::write(root.join("Plain.wiki"), "no template here").expect("write");
        fs::create_dir_all(root.join("Template")).expect("mkdir");
        fs::write(
            root.join("Template").join("Ship_infobox.wiki"),
            "{{Ship infobox|crew=docs}}",
        )
        .expect("write");

        let store = FilesystemStore::new(root);
        let titles = store.list_pages("Ship infobox").expect("list");
        assert_eq!(titles, vec!["Template:Ship infobox", "Vanguard"]);
    }

    #[test]
    fn filesystem_store_load_and_commit_roundtrip() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("Vanguard.wiki"), "{{Ship infobox|crew=5}}").expect("write");

        let mut store = FilesystemStore::new(temp.path());
        let doc = store.load("Vanguard").expect("load");
        assert_eq!(doc.namespace, Namespace::Main);
        assert_eq!(doc.text, "{{Ship infobox|crew=5}}");

        store
            .commit("Vanguard", "{{Ship infobox|crew=6}}", "crew fix")
            .expect("commit");
        assert_eq!(
            fs::read_to_string(temp.path().join("Vanguard.wiki")).expect("read"),
            "{{Ship infobox|crew=6}}"
        );
    }

    #[test]
    fn memory_store_records_commit_summaries() {
        let mut store = MemoryStore::new().with_page(
            "Vanguard",
            Namespace::Main,
            "{{Ship infobox|crew=5}}",
        );
        store
            .commit("Vanguard", "{{Ship infobox|crew=6}}", "crew fix")
            .expect("commit");

        let page = store.page("Vanguard").expect("page");
        assert_eq!(page.text, "{{Ship infobox|crew=6}}");
        assert_eq!(page.commit_summaries, vec!["crew fix"]);
        assert!(store.load("Missing").is_err());
    }
}
