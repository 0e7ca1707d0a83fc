//! The source state
//!
//! [`SourceState::read`] walks the source directory and builds one
//! [`SourceStateEntry`] per target. [`SourceState::apply`] reconciles a
//! single target with what is on disk and records what it wrote;
//! [`SourceState::add`] goes the other way and imports targets into the
//! source directory.
//!
//! Special names in the source directory:
//!
//! | Name | Meaning |
//! |------|---------|
//! | `.chezmoidata.{json,toml,yaml}` | template data, merged recursively |
//! | `.chezmoiignore` | template; patterns of targets to ignore |
//! | `.chezmoiremove` | template; patterns of targets to delete |
//! | `.chezmoitemplates/` | named partial templates |
//! | `.chezmoiversion` | minimum tool version |
//!
//! Any other name starting with `.` is skipped.

use crate::actual::ActualStateEntry;
use crate::attr_modifier::AttrModifier;
use crate::entry_state::EntryState;
use crate::error::{Error, Result};
use crate::hash::Contents;
use crate::include::IncludeSet;
use crate::patterns::PatternSet;
use crate::persistent::{ENTRY_STATE_BUCKET, NullPersistentState, PersistentState};
use crate::source_entry::{
    SourceStateDir, SourceStateEntry, SourceStateFile, SourceStateRemove, SourceStateRenameDir,
};
use crate::system::{FileInfo, FileType, System};
use crate::target::TargetStateEntry;
use crate::version::Version;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io;
use tilde_core::Encryption;
use tilde_core::Umask;
use tilde_core::attr::{DirAttr, FileAttr, SourceFileType, is_executable, is_private};
use tilde_core::path::{AbsPath, RelPath, SourceRelPath};
use tilde_template::{TemplateEngine, recursive_merge};
use tracing::{debug, info};

const DATA_PREFIX: &str = ".chezmoidata.";
const IGNORE_NAME: &str = ".chezmoiignore";
const REMOVE_NAME: &str = ".chezmoiremove";
const TEMPLATES_DIR_NAME: &str = ".chezmoitemplates";
const VERSION_NAME: &str = ".chezmoiversion";

/// Called before a target is changed with the target's name, its desired
/// entry state, the entry state last written and the actual entry state
///
/// Returning [`Error::SkipEntry`] leaves the target alone.
pub type PreApplyFn<'h> =
    dyn Fn(&RelPath, Option<&EntryState>, Option<&EntryState>, &EntryState) -> Result<()> + 'h;

/// Options for [`SourceState::apply`]
#[derive(Clone, Copy)]
pub struct ApplyOptions<'h> {
    /// Entry types to apply
    pub include: IncludeSet,
    /// Umask to compare permissions under
    pub umask: Umask,
    /// Hook called before each mutation
    pub pre_apply: Option<&'h PreApplyFn<'h>>,
}

impl Default for ApplyOptions<'_> {
    fn default() -> Self {
        Self {
            include: IncludeSet::ALL,
            umask: Umask::default(),
            pre_apply: None,
        }
    }
}

/// Options for [`SourceState::add`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
    /// Keep empty files
    pub empty: bool,
    /// Encrypt file contents
    pub encrypt: bool,
    /// Mark added directories exact
    pub exact: bool,
    /// Entry types to add
    pub include: IncludeSet,
    /// Mark added files as templates
    pub template: bool,
    /// Umask for writing into the source directory
    pub umask: Umask,
}

struct AddUpdate {
    dest_path: AbsPath,
    entry_state: EntryState,
    source_paths: Vec<RelPath>,
}

/// Source directory model: every managed target and how to produce it
pub struct SourceState<'a> {
    system: &'a dyn System,
    source_dir: AbsPath,
    dest_dir: AbsPath,
    umask: Umask,
    encryption: Option<&'a dyn Encryption>,
    templates: TemplateEngine,
    default_data: Map<String, Value>,
    priority_data: Map<String, Value>,
    data: Map<String, Value>,
    data_value: Value,
    entries: BTreeMap<RelPath, SourceStateEntry>,
    ignore: PatternSet,
    min_version: Option<Version>,
}

impl<'a> SourceState<'a> {
    /// An empty source state for `source_dir`, targeting `dest_dir`
    ///
    /// All reads go through `system`.
    pub fn new(system: &'a dyn System, source_dir: AbsPath, dest_dir: AbsPath) -> Self {
        Self {
            system,
            source_dir,
            dest_dir,
            umask: Umask::default(),
            encryption: None,
            templates: TemplateEngine::new(),
            default_data: Map::new(),
            priority_data: Map::new(),
            data: Map::new(),
            data_value: Value::Object(Map::new()),
            entries: BTreeMap::new(),
            ignore: PatternSet::new(),
            min_version: None,
        }
    }

    /// Use `umask` when comparing and writing permissions
    #[must_use]
    pub fn with_umask(mut self, umask: Umask) -> Self {
        self.umask = umask;
        self
    }

    /// Decrypt and encrypt contents with `encryption`
    #[must_use]
    pub fn with_encryption(mut self, encryption: &'a dyn Encryption) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Render templates with `templates`
    #[must_use]
    pub fn with_template_engine(mut self, templates: TemplateEngine) -> Self {
        self.templates = templates;
        self
    }

    /// Lowest priority template data
    #[must_use]
    pub fn with_default_data(mut self, data: Map<String, Value>) -> Self {
        self.default_data = data;
        self.reset_data();
        self
    }

    /// Template data that overrides everything in the source directory
    #[must_use]
    pub fn with_priority_data(mut self, data: Map<String, Value>) -> Self {
        self.priority_data = data;
        self.reset_data();
        self
    }

    fn reset_data(&mut self) {
        self.data = self.default_data.clone();
        recursive_merge(&mut self.data, &self.priority_data);
        self.data_value = Value::Object(self.data.clone());
    }

    fn merge_data(&mut self, layer: &Map<String, Value>) {
        recursive_merge(&mut self.data, layer);
        recursive_merge(&mut self.data, &self.priority_data);
        self.data_value = Value::Object(self.data.clone());
    }

    /// The source directory
    pub fn source_dir(&self) -> &AbsPath {
        &self.source_dir
    }

    /// The destination directory
    pub fn dest_dir(&self) -> &AbsPath {
        &self.dest_dir
    }

    /// The umask permissions are compared under
    pub fn umask(&self) -> Umask {
        self.umask
    }

    /// The merged template data
    pub fn template_data(&self) -> &Value {
        &self.data_value
    }

    /// The highest version any `.chezmoiversion` requires
    pub fn min_version(&self) -> Option<Version> {
        self.min_version
    }

    /// Whether `target` matches the ignore patterns
    pub fn ignored(&self, target: &RelPath) -> bool {
        self.ignore.includes(target)
    }

    /// The entry producing `target`
    pub fn entry(&self, target: &RelPath) -> Option<&SourceStateEntry> {
        self.entries.get(target)
    }

    /// Every entry, keyed by target
    pub fn entries(&self) -> &BTreeMap<RelPath, SourceStateEntry> {
        &self.entries
    }

    /// Every target name, sorted
    pub fn target_names(&self) -> Vec<RelPath> {
        self.entries.keys().cloned().collect()
    }

    /// Every target name in apply order: by entry order, then by name
    pub fn all_target_names(&self) -> Vec<RelPath> {
        let mut names: Vec<(i32, &RelPath)> = self
            .entries
            .iter()
            .map(|(name, entry)| (entry.order(), name))
            .collect();
        names.sort();
        names.into_iter().map(|(_, name)| name.clone()).collect()
    }

    /// Render `template` against the template data
    ///
    /// # Errors
    ///
    /// Returns error if rendering fails
    pub fn execute_template(&self, name: &str, template: &[u8]) -> Result<Vec<u8>> {
        self.templates
            .render(name, template, &self.data_value)
            .map_err(|source| Error::TemplateRender {
                path: name.to_string(),
                source,
            })
    }

    fn source_abs_path(&self, source: &SourceRelPath) -> Result<AbsPath> {
        Ok(self
            .source_dir
            .join(&RelPath::new(source.as_path().to_path_buf())?))
    }

    /// Read the source directory
    ///
    /// A missing source directory yields an empty source state.
    ///
    /// # Errors
    ///
    /// Returns error if the source directory is not a directory, an entry
    /// cannot be read or parsed, or targets are claimed more than once
    pub fn read(&mut self) -> Result<()> {
        match self.system.lstat(&self.source_dir) {
            Ok(info) if info.is_dir() => {}
            Ok(_) => {
                return Err(Error::NotADirectory {
                    path: self.source_dir.clone(),
                });
            }
            Err(e) if e.is_not_found() => {
                debug!(path = %self.source_dir, "Source directory does not exist");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let mut all: BTreeMap<RelPath, Vec<SourceStateEntry>> = BTreeMap::new();
        let source_dir = self.source_dir.clone();
        self.walk(&source_dir, &SourceRelPath::root(), &mut all)?;

        all.retain(|target, _| !self.ignore.includes(target));
        self.add_exact_removes(&mut all)?;

        let duplicates: Vec<String> = all
            .iter()
            .filter(|(_, entries)| entries.len() > 1)
            .map(|(target, entries)| {
                let origins: Vec<String> = entries.iter().map(SourceStateEntry::origin_name).collect();
                format!("{target}: duplicate target ({})", origins.join(", "))
            })
            .collect();
        if !duplicates.is_empty() {
            return Err(Error::DuplicateTargets(duplicates));
        }

        self.entries = all
            .into_iter()
            .filter_map(|(target, entries)| entries.into_iter().next().map(|e| (target, e)))
            .collect();
        debug!(entries = self.entries.len(), "Read source state");
        Ok(())
    }

    fn walk(
        &mut self,
        dir: &AbsPath,
        source_dir_rel: &SourceRelPath,
        all: &mut BTreeMap<RelPath, Vec<SourceStateEntry>>,
    ) -> Result<()> {
        let system = self.system;
        let target_dir = source_dir_rel.target_rel_path()?;
        for listed in system.read_dir(dir)? {
            let path = dir.join_name(&listed.name);
            let info = if listed.is_symlink() {
                system.stat(&path)?
            } else {
                listed
            };
            let name = info.name.clone();

            if name.starts_with(DATA_PREFIX) {
                if info.is_file() {
                    self.read_data(&path, &name)?;
                }
            } else if name == IGNORE_NAME {
                let text = self.render_file(&path, &source_dir_rel.join_name(&name, false))?;
                self.ignore
                    .add_lines(&target_dir, &text, &source_dir_rel.join_name(&name, false).to_string())?;
            } else if name == REMOVE_NAME {
                let location = source_dir_rel.join_name(&name, false);
                let text = self.render_file(&path, &location)?;
                let mut remove = PatternSet::new();
                remove.add_lines(&target_dir, &text, &location.to_string())?;
                for target in remove.glob(system, &self.dest_dir)? {
                    if self.ignore.includes(&target) {
                        continue;
                    }
                    let entry = SourceStateEntry::Remove(SourceStateRemove::new(target.clone()));
                    all.entry(target).or_default().push(entry);
                }
            } else if name == TEMPLATES_DIR_NAME && info.is_dir() {
                self.read_templates(&path, &path)?;
            } else if name == VERSION_NAME {
                self.read_version(&path)?;
            } else if name.starts_with('.') {
                debug!(path = %path, "Skipping hidden source entry");
            } else {
                match info.file_type {
                    FileType::Dir => {
                        let source_rel = source_dir_rel.join_name(&name, true);
                        let target = source_rel.target_rel_path()?;
                        if self.ignore.includes(&target) {
                            continue;
                        }
                        let attr = DirAttr::parse(&name);
                        let perm = attr.perm();
                        all.entry(target).or_default().push(SourceStateEntry::Dir(
                            SourceStateDir::new(source_rel.clone(), attr, perm),
                        ));
                        self.walk(&path, &source_rel, all)?;
                    }
                    FileType::File => {
                        let source_rel = source_dir_rel.join_name(&name, false);
                        let target = source_rel.target_rel_path()?;
                        if self.ignore.includes(&target) {
                            continue;
                        }
                        let attr = FileAttr::parse(&name);
                        all.entry(target).or_default().push(SourceStateEntry::File(
                            SourceStateFile::from_origin(source_rel, attr, path),
                        ));
                    }
                    other => {
                        return Err(Error::UnsupportedFileType {
                            path,
                            kind: other.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn render_file(&self, path: &AbsPath, source_rel: &SourceRelPath) -> Result<String> {
        let bytes = self.system.read_file(path)?;
        let rendered = self.execute_template(&source_rel.to_string(), &bytes)?;
        Ok(String::from_utf8_lossy(&rendered).into_owned())
    }

    fn read_data(&mut self, path: &AbsPath, name: &str) -> Result<()> {
        let format = name.strip_prefix(DATA_PREFIX).unwrap_or_default();
        let bytes = self.system.read_file(path)?;
        let invalid = |message: String| Error::InvalidData {
            path: path.clone(),
            message,
        };
        let layer: Map<String, Value> = match format {
            "json" => serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))?,
            "toml" => {
                let text = std::str::from_utf8(&bytes).map_err(|e| invalid(e.to_string()))?;
                toml::from_str(text).map_err(|e| invalid(e.to_string()))?
            }
            "yaml" | "yml" => serde_yaml::from_slice(&bytes).map_err(|e| invalid(e.to_string()))?,
            _ => return Err(Error::UnknownFormat { path: path.clone() }),
        };
        debug!(path = %path, keys = layer.len(), "Merging template data");
        self.merge_data(&layer);
        Ok(())
    }

    fn read_templates(&mut self, root: &AbsPath, dir: &AbsPath) -> Result<()> {
        let system = self.system;
        for info in system.read_dir(dir)? {
            let path = dir.join_name(&info.name);
            match info.file_type {
                FileType::Dir => self.read_templates(root, &path)?,
                FileType::File => {
                    let name = path.trim_dir_prefix(root)?.to_slash();
                    let bytes = system.read_file(&path)?;
                    let source = String::from_utf8_lossy(&bytes).into_owned();
                    self.templates
                        .add_template(name.clone(), source)
                        .map_err(|source| Error::TemplateRender { path: name, source })?;
                }
                other => {
                    return Err(Error::UnsupportedFileType {
                        path,
                        kind: other.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn read_version(&mut self, path: &AbsPath) -> Result<()> {
        let bytes = self.system.read_file(path)?;
        let version: Version = String::from_utf8_lossy(&bytes).parse()?;
        if self.min_version.is_none_or(|min| min < version) {
            self.min_version = Some(version);
        }
        Ok(())
    }

    fn add_exact_removes(&self, all: &mut BTreeMap<RelPath, Vec<SourceStateEntry>>) -> Result<()> {
        let exact_dirs: Vec<RelPath> = all
            .iter()
            .filter(|(_, entries)| {
                matches!(entries.as_slice(), [SourceStateEntry::Dir(dir)] if dir.attr.exact)
            })
            .map(|(target, _)| target.clone())
            .collect();
        for target in exact_dirs {
            let infos = match self.system.read_dir(&self.dest_dir.join(&target)) {
                Ok(infos) => infos,
                Err(e)
                    if e.is_not_found() || e.io_kind() == Some(io::ErrorKind::NotADirectory) =>
                {
                    continue;
                }
                Err(e) => return Err(e),
            };
            for info in infos {
                let child = target.join_name(&info.name);
                if all.contains_key(&child) || self.ignore.includes(&child) {
                    continue;
                }
                debug!(path = %child, "Removing unmanaged entry of exact directory");
                all.entry(child.clone())
                    .or_default()
                    .push(SourceStateEntry::Remove(SourceStateRemove::new(child)));
            }
        }
        Ok(())
    }

    /// The target state of `entry`, evaluating it on first use
    ///
    /// # Errors
    ///
    /// Returns error if the source file cannot be read, decrypted or rendered
    pub fn target_state_entry<'e>(
        &self,
        entry: &'e SourceStateEntry,
    ) -> Result<&'e TargetStateEntry> {
        match entry {
            SourceStateEntry::Dir(dir) => Ok(&dir.target),
            SourceStateEntry::Remove(remove) => Ok(&remove.target),
            SourceStateEntry::RenameDir(rename) => Ok(&rename.target),
            SourceStateEntry::File(file) => {
                if let Some(target) = file.target.get() {
                    return Ok(target);
                }
                let target = self.evaluate_file(file)?;
                Ok(file.target.get_or_init(|| target))
            }
        }
    }

    fn evaluate_file(&self, file: &SourceStateFile) -> Result<TargetStateEntry> {
        let source_name = file.source_rel_path.to_string();
        let origin = file
            .origin
            .as_ref()
            .ok_or_else(|| Error::State(format!("{source_name}: no source contents")))?;
        let mut bytes = self.system.read_file(origin)?;
        if file.attr.encrypted {
            let encryption = self.encryption.ok_or_else(|| Error::Decryption {
                path: source_name.clone(),
                message: "no encryption configured".to_string(),
            })?;
            bytes = encryption.decrypt(&bytes).map_err(|e| Error::Decryption {
                path: source_name.clone(),
                message: e.to_string(),
            })?;
        }
        if file.attr.template {
            bytes = self.execute_template(&source_name, &bytes)?;
        }

        let contents = Contents::new(bytes);
        let perm = file.attr.perm();
        Ok(match file.attr.file_type {
            SourceFileType::File if !file.attr.empty && contents.is_blank() => {
                TargetStateEntry::Absent
            }
            SourceFileType::File => TargetStateEntry::File { contents, perm },
            SourceFileType::Present => TargetStateEntry::Present { contents, perm },
            SourceFileType::Script => TargetStateEntry::Script {
                name: file.source_rel_path.target_rel_path()?,
                contents,
                once: file.attr.once,
            },
            SourceFileType::Symlink => TargetStateEntry::Symlink {
                linkname: String::from_utf8_lossy(contents.bytes()).trim().to_string(),
            },
        })
    }

    /// Make `target_dir/target` match the source state
    ///
    /// On success the target's entry state is recorded in `persistent`.
    ///
    /// # Errors
    ///
    /// Returns error if `target` is not managed, cannot be evaluated or
    /// applied, or the pre-apply hook fails. Errors are annotated with the
    /// target name.
    pub fn apply(
        &self,
        target_system: &dyn System,
        persistent: &dyn PersistentState,
        target_dir: &AbsPath,
        target: &RelPath,
        options: &ApplyOptions<'_>,
    ) -> Result<()> {
        let entry = self
            .entries
            .get(target)
            .ok_or_else(|| Error::NotManaged {
                path: target.clone(),
            })?;
        let annotate = |e: Error| {
            if matches!(e, Error::SkipEntry) {
                e
            } else {
                e.context(target.to_string())
            }
        };
        let target_state = self.target_state_entry(entry).map_err(annotate)?;
        apply_target(target_system, persistent, target_dir, target, target_state, options)
            .map_err(annotate)
    }

    /// Apply every target in order, skipping those the hook skips
    ///
    /// # Errors
    ///
    /// Returns the first error that is not a skip
    pub fn apply_all(
        &self,
        target_system: &dyn System,
        persistent: &dyn PersistentState,
        target_dir: &AbsPath,
        options: &ApplyOptions<'_>,
    ) -> Result<()> {
        for target in self.all_target_names() {
            match self.apply(target_system, persistent, target_dir, &target, options) {
                Err(e) if e.is_skip() => debug!(path = %target, "Skipped"),
                other => other?,
            }
        }
        Ok(())
    }

    /// Collect `dest_path` and its unmanaged parents into `infos`
    ///
    /// Parents are added up to the destination directory or the first
    /// parent already in the source state, so [`add`](Self::add) can create
    /// them first.
    ///
    /// # Errors
    ///
    /// Returns error if `dest_path` is outside the destination directory or
    /// cannot be inspected
    pub fn add_dest_path_infos(
        &self,
        infos: &mut BTreeMap<AbsPath, FileInfo>,
        system: &dyn System,
        dest_path: &AbsPath,
        info: Option<FileInfo>,
    ) -> Result<()> {
        dest_path.trim_dir_prefix(&self.dest_dir)?;
        if infos.contains_key(dest_path) {
            return Ok(());
        }
        let info = match info {
            Some(info) => info,
            None => system.lstat(dest_path)?,
        };
        infos.insert(dest_path.clone(), info);

        let mut path = dest_path.dir();
        while path != self.dest_dir && !infos.contains_key(&path) {
            if self.entries.contains_key(&path.trim_dir_prefix(&self.dest_dir)?) {
                break;
            }
            let info = system.lstat(&path)?;
            infos.insert(path.clone(), info);
            path = path.dir();
        }
        Ok(())
    }

    /// Import destination entries into the source directory
    ///
    /// Entries are processed parents first; the parent of every entry must
    /// already be in the source state or be added in the same call. The
    /// actual entry state of each added target is recorded in `persistent`.
    ///
    /// # Errors
    ///
    /// Returns error if a parent is missing, an entry vanished, or writing
    /// into the source directory fails
    pub fn add(
        &self,
        source_system: &dyn System,
        persistent: &dyn PersistentState,
        dest_system: &dyn System,
        infos: &BTreeMap<AbsPath, FileInfo>,
        options: &AddOptions,
    ) -> Result<()> {
        let mut updates = Vec::new();
        let mut new_entries: BTreeMap<RelPath, SourceStateEntry> = BTreeMap::new();
        let mut new_by_target: BTreeMap<RelPath, SourceRelPath> = BTreeMap::new();

        for (dest_path, info) in infos {
            if !options.include.includes_file_type(info.file_type) {
                continue;
            }
            let target = dest_path.trim_dir_prefix(&self.dest_dir)?;

            let parent_target = target.dir();
            let parent_source = if parent_target.is_empty() {
                SourceRelPath::root()
            } else if let Some(source) = new_by_target.get(&parent_target) {
                source.clone()
            } else if let Some(source) = self
                .entries
                .get(&parent_target)
                .and_then(SourceStateEntry::source_rel_path)
            {
                source.clone()
            } else {
                return Err(Error::MissingParent { path: target });
            };

            let actual = ActualStateEntry::read(dest_system, dest_path)?;
            let Some(mut new_entry) = self.new_source_entry(&actual, &target, &parent_source, options)?
            else {
                debug!(path = %dest_path, "Skipping empty file");
                continue;
            };
            let Some(new_source) = new_entry.source_rel_path().cloned() else {
                continue;
            };
            let mut update = AddUpdate {
                dest_path: dest_path.clone(),
                entry_state: actual.entry_state()?,
                source_paths: vec![RelPath::new(new_source.as_path().to_path_buf())?],
            };

            if let Some(old_entry) = self.entries.get(&target)
                && let Some(old_source) = old_entry.source_rel_path()
                && *old_source != new_source
            {
                if old_entry.is_dir() && new_entry.is_dir() {
                    new_entry = SourceStateEntry::RenameDir(SourceStateRenameDir::new(
                        old_source.clone(),
                        new_source.clone(),
                    ));
                } else {
                    let old_path = RelPath::new(old_source.as_path().to_path_buf())?;
                    new_entries.insert(
                        old_path.clone(),
                        SourceStateEntry::Remove(SourceStateRemove::new(old_path.clone())),
                    );
                    update.source_paths.push(old_path);
                }
            }

            new_entries.insert(update.source_paths[0].clone(), new_entry);
            new_by_target.insert(target, new_source);
            updates.push(update);
        }

        let apply_options = ApplyOptions {
            include: IncludeSet::ALL,
            umask: options.umask,
            pre_apply: None,
        };
        for update in updates {
            for source_path in &update.source_paths {
                let Some(entry) = new_entries.get(source_path) else {
                    continue;
                };
                let target_state = self.target_state_entry(entry)?;
                apply_target(
                    source_system,
                    &NullPersistentState,
                    &self.source_dir,
                    source_path,
                    target_state,
                    &apply_options,
                )?;
            }
            info!(path = %update.dest_path, "Added");
            persistent.set(
                ENTRY_STATE_BUCKET,
                update.dest_path.to_string().as_bytes(),
                &update.entry_state.to_bytes()?,
            )?;
        }
        Ok(())
    }

    fn new_source_entry(
        &self,
        actual: &ActualStateEntry<'_>,
        target: &RelPath,
        parent_source: &SourceRelPath,
        options: &AddOptions,
    ) -> Result<Option<SourceStateEntry>> {
        let name = target.base().to_string();
        Ok(Some(match actual {
            ActualStateEntry::Absent { path } => {
                return Err(Error::NotFound { path: path.clone() });
            }
            ActualStateEntry::Dir { perm, .. } => {
                let attr = DirAttr {
                    target_name: name,
                    exact: options.exact,
                    private: is_private(*perm),
                };
                let source = parent_source.join_name(&attr.source_name(), true);
                SourceStateEntry::Dir(SourceStateDir::new(source, attr, 0o777))
            }
            ActualStateEntry::File { path, perm, contents } => {
                let mut bytes = contents.get()?.clone();
                if bytes.is_empty() && !options.empty {
                    return Ok(None);
                }
                let attr = FileAttr {
                    target_name: name,
                    file_type: SourceFileType::File,
                    empty: options.empty,
                    encrypted: options.encrypt,
                    executable: is_executable(*perm),
                    private: is_private(*perm),
                    template: options.template,
                    ..FileAttr::default()
                };
                if options.encrypt {
                    let encryption = self.encryption.ok_or_else(|| Error::Encryption {
                        path: path.to_string(),
                        message: "no encryption configured".to_string(),
                    })?;
                    bytes = encryption.encrypt(&bytes).map_err(|e| Error::Encryption {
                        path: path.to_string(),
                        message: e.to_string(),
                    })?;
                }
                let source = parent_source.join_name(&attr.source_name(), false);
                SourceStateEntry::File(SourceStateFile::with_target(
                    source,
                    attr,
                    TargetStateEntry::File {
                        contents: Contents::new(bytes),
                        perm: 0o666,
                    },
                ))
            }
            ActualStateEntry::Symlink { linkname, .. } => {
                let attr = FileAttr {
                    target_name: name,
                    file_type: SourceFileType::Symlink,
                    template: options.template,
                    ..FileAttr::default()
                };
                let mut bytes = linkname.get()?.clone().into_bytes();
                bytes.push(b'\n');
                let source = parent_source.join_name(&attr.source_name(), false);
                SourceStateEntry::File(SourceStateFile::with_target(
                    source,
                    attr,
                    TargetStateEntry::File {
                        contents: Contents::new(bytes),
                        perm: 0o666,
                    },
                ))
            }
        }))
    }

    /// Change the attributes of `targets` by renaming their source entries
    ///
    /// Targets are processed children first so a directory rename never
    /// invalidates a pending child path. Changing `encrypted` re-encodes the
    /// file contents.
    ///
    /// # Errors
    ///
    /// Returns error if a target is not managed or a rename fails
    pub fn chattr(
        &self,
        source_system: &dyn System,
        modifier: &AttrModifier,
        targets: &[RelPath],
    ) -> Result<()> {
        let mut targets = targets.to_vec();
        targets.sort();
        targets.dedup();
        for target in targets.iter().rev() {
            let entry = self.entries.get(target).ok_or_else(|| Error::NotManaged {
                path: target.clone(),
            })?;
            match entry {
                SourceStateEntry::Dir(dir) => {
                    let new_name = modifier.modify_dir_attr(&dir.attr).source_name();
                    self.rename_source(source_system, &dir.source_rel_path, &new_name)?;
                }
                SourceStateEntry::File(file) => {
                    let new_attr = modifier.modify_file_attr(&file.attr);
                    if new_attr.encrypted == file.attr.encrypted {
                        self.rename_source(source_system, &file.source_rel_path, &new_attr.source_name())?;
                    } else {
                        self.reencode_source(source_system, file, &new_attr)?;
                    }
                }
                SourceStateEntry::Remove(_) | SourceStateEntry::RenameDir(_) => {}
            }
        }
        Ok(())
    }

    fn rename_source(
        &self,
        source_system: &dyn System,
        source: &SourceRelPath,
        new_name: &str,
    ) -> Result<()> {
        if source.file_name() == Some(new_name) {
            return Ok(());
        }
        let from = self.source_abs_path(source)?;
        let to = from.dir().join_name(new_name);
        source_system.rename(&from, &to)?;
        info!(from = %from, to = %to, "Renamed source entry");
        Ok(())
    }

    fn reencode_source(
        &self,
        source_system: &dyn System,
        file: &SourceStateFile,
        new_attr: &FileAttr,
    ) -> Result<()> {
        let from = self.source_abs_path(&file.source_rel_path)?;
        let to = from.dir().join_name(&new_attr.source_name());
        let path = file.source_rel_path.to_string();
        let encryption = self.encryption.ok_or_else(|| Error::Encryption {
            path: path.clone(),
            message: "no encryption configured".to_string(),
        })?;
        let bytes = source_system.read_file(&from)?;
        let bytes = if new_attr.encrypted {
            encryption.encrypt(&bytes).map_err(|e| Error::Encryption {
                path: path.clone(),
                message: e.to_string(),
            })?
        } else {
            encryption.decrypt(&bytes).map_err(|e| Error::Decryption {
                path: path.clone(),
                message: e.to_string(),
            })?
        };
        let perm = source_system.lstat(&from)?.perm;
        source_system.write_file(&to, &bytes, perm)?;
        source_system.remove_all(&from)?;
        info!(from = %from, to = %to, "Re-encoded source entry");
        Ok(())
    }
}

/// Steps shared by apply and add: include gate, probe, hook, mutate, record
fn apply_target(
    system: &dyn System,
    persistent: &dyn PersistentState,
    target_dir: &AbsPath,
    target: &RelPath,
    target_state: &TargetStateEntry,
    options: &ApplyOptions<'_>,
) -> Result<()> {
    if !options.include.includes_target(target_state) {
        return Ok(());
    }
    let path = target_dir.join(target);
    let key = path.to_string();
    let target_entry_state = target_state.entry_state();
    let actual = ActualStateEntry::read(system, &path)?;

    if let Some(pre_apply) = options.pre_apply {
        let last_written = persistent
            .get(ENTRY_STATE_BUCKET, key.as_bytes())?
            .map(|bytes| EntryState::from_bytes(&bytes))
            .transpose()?;
        let actual_entry_state = actual.entry_state()?;
        pre_apply(
            target,
            target_entry_state.as_ref(),
            last_written.as_ref(),
            &actual_entry_state,
        )?;
    }

    debug!(path = %path, "Applying");
    target_state.apply(system, persistent, &actual, options.umask)?;

    if let Some(entry_state) = target_entry_state {
        persistent.set(ENTRY_STATE_BUCKET, key.as_bytes(), &entry_state.to_bytes()?)?;
    }
    Ok(())
}
