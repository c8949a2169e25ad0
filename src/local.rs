//! File-backed repository tree: directories, objects, and the facade.
//!
//! A [`FileRepoDir`] keeps an in-memory cache of its children that
//! [`FileRepoDir::refresh`] reconciles with the directory on disk; cached
//! subtrees survive a refresh so repeated scans stay cheap. Objects stream
//! their bytes through `tokio::fs`, with two write disciplines:
//!
//! - plain writes are exclusive-create (an existing target is an error), and
//! - overwrites go to a `<name>.new` sibling first and are renamed over the
//!   target, which on POSIX filesystems makes the replacement atomic for
//!   concurrent readers.
//!
//! [`FileRepoFs`] layers date addressing on top via a [`RepoFormatter`] and
//! implements the missing-artifact scan that feeds the sync pipe.

use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::calendar::{Date, PeriodType};
use crate::error::{MirrorError, Result};
use crate::format::{RepoFormatter, RepoObjectPath};
use crate::holidays::UsHolidays;
use crate::repo::{ByteStream, RepoDir, RepoEntity, RepoFs, RepoObject, RepoVisitor};

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn tail_components(path: &Path, levels: usize) -> Vec<String> {
    let names: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(os) => Some(os.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let skip = names.len().saturating_sub(levels);
    names[skip..].to_vec()
}

/// A leaf file in the repository tree.
///
/// The handle stores the absolute target path; the file itself may not exist
/// yet (a freshly minted object is materialized by its first write).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRepoObject {
    path: PathBuf,
}

impl FileRepoObject {
    fn new(parent: &Path, name: &str) -> Self {
        FileRepoObject {
            path: parent.join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> String {
        entry_name(&self.path)
    }
}

#[async_trait]
impl RepoEntity for FileRepoObject {
    async fn exists(&self) -> bool {
        self.path.exists()
    }

    fn as_uri(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    fn subpath(&self, levels: usize) -> Vec<String> {
        tail_components(&self.path, levels)
    }
}

#[async_trait]
impl RepoObject for FileRepoObject {
    async fn read(&self, bufsize: usize) -> Result<ByteStream> {
        let file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                MirrorError::NotFound(self.as_uri())
            } else {
                MirrorError::Io(e)
            }
        })?;
        let bufsize = bufsize.max(1);
        let stream = futures_util::stream::try_unfold(file, move |mut file| async move {
            let mut buf = vec![0u8; bufsize];
            let n = file.read(&mut buf).await.map_err(MirrorError::Io)?;
            if n == 0 {
                Ok(None)
            } else {
                buf.truncate(n);
                Ok(Some((Bytes::from(buf), file)))
            }
        });
        Ok(stream.boxed())
    }

    async fn write(&self, mut chunks: ByteStream, overwrite: bool) -> Result<()> {
        let target = if overwrite {
            self.path
                .with_file_name(format!("{}.new", entry_name(&self.path)))
        } else {
            self.path.clone()
        };

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o644);

        let mut file = options.open(&target).await.map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                MirrorError::AlreadyExists(target.to_string_lossy().into_owned())
            } else {
                MirrorError::Io(e)
            }
        })?;

        while let Some(chunk) = chunks.try_next().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        if overwrite {
            tokio::fs::rename(&target, &self.path).await?;
        }
        Ok(())
    }
}

/// One cached entry of a [`FileRepoDir`].
#[derive(Debug)]
pub enum FileRepoEntry {
    Dir(FileRepoDir),
    Object(FileRepoObject),
}

/// A directory in the repository tree with an in-memory child cache.
///
/// Construction resolves the path to its canonical absolute form, creating
/// the directory on disk when missing, and scans the initial children.
#[derive(Debug)]
pub struct FileRepoDir {
    path: PathBuf,
    children: BTreeMap<String, FileRepoEntry>,
}

impl FileRepoDir {
    pub fn new(path: &Path) -> Result<Self> {
        if !path.exists() {
            std::fs::create_dir_all(path)?;
        }
        let mut dir = FileRepoDir {
            path: path.canonicalize()?,
            children: BTreeMap::new(),
        };
        dir.refresh_children()?;
        Ok(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&FileRepoEntry> {
        self.children.get(name)
    }

    /// Resolves a relative component chain to a cached entry.
    pub fn entry_at(&self, components: &[String]) -> Option<&FileRepoEntry> {
        let (first, rest) = components.split_first()?;
        let entry = self.children.get(first)?;
        if rest.is_empty() {
            Some(entry)
        } else {
            match entry {
                FileRepoEntry::Dir(dir) => dir.entry_at(rest),
                FileRepoEntry::Object(_) => None,
            }
        }
    }

    fn refresh_children(&mut self) -> Result<()> {
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type()?.is_dir();
            match self.children.get_mut(&name) {
                Some(FileRepoEntry::Dir(dir)) if is_dir => dir.refresh_children()?,
                Some(_) => {}
                None => {
                    let child = if is_dir {
                        FileRepoEntry::Dir(FileRepoDir::new(&entry.path())?)
                    } else {
                        FileRepoEntry::Object(FileRepoObject::new(&self.path, &name))
                    };
                    self.children.insert(name, child);
                }
            }
        }
        Ok(())
    }

    /// Child names in reverse-sorted order, the order [`FileRepoDir::visit`]
    /// walks them in.
    pub fn sorted_entities(&self) -> Vec<String> {
        self.children.keys().rev().cloned().collect()
    }

    /// Depth-first, name-descending traversal over the cached subtree.
    /// Returns `false` when the visitor aborted the walk.
    pub fn visit(&self, visitor: &mut dyn RepoVisitor) -> bool {
        for entry in self.children.values().rev() {
            let keep_going = match entry {
                FileRepoEntry::Object(object) => visitor.visit(object),
                FileRepoEntry::Dir(dir) => dir.visit(visitor),
            };
            if !keep_going {
                return false;
            }
        }
        true
    }

    /// Timestamp and path of the most recently modified immediate child.
    /// Must not be called on an empty directory.
    pub fn lastmodified(&self) -> Result<(SystemTime, PathBuf)> {
        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let modified = entry.metadata()?.modified()?;
            if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
                newest = Some((modified, entry.path()));
            }
        }
        newest.ok_or_else(|| MirrorError::NotFound(self.as_uri()))
    }
}

#[async_trait]
impl RepoEntity for FileRepoDir {
    async fn exists(&self) -> bool {
        self.path.exists()
    }

    fn as_uri(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    fn subpath(&self, levels: usize) -> Vec<String> {
        tail_components(&self.path, levels)
    }
}

impl RepoDir for FileRepoDir {
    type Object = FileRepoObject;
    type Dir = FileRepoDir;

    fn new_object(&mut self, name: &str) -> Result<FileRepoObject> {
        let object = FileRepoObject::new(&self.path, name);
        self.children
            .insert(name.to_string(), FileRepoEntry::Object(object.clone()));
        Ok(object)
    }

    fn new_dir(&mut self, name: &str) -> Result<&mut FileRepoDir> {
        if !self.children.contains_key(name) {
            let child = FileRepoDir::new(&self.path.join(name))?;
            self.children
                .insert(name.to_string(), FileRepoEntry::Dir(child));
        }
        match self.children.get_mut(name) {
            Some(FileRepoEntry::Dir(dir)) => Ok(dir),
            _ => Err(MirrorError::AlreadyExists(
                self.path.join(name).to_string_lossy().into_owned(),
            )),
        }
    }

    fn refresh(&mut self) -> Result<()> {
        self.refresh_children()
    }
}

/// Builds the URI index of a tree by visiting every object.
struct IndexCollector<'a> {
    index: &'a mut HashSet<String>,
    path_len: usize,
}

impl RepoVisitor for IndexCollector<'_> {
    fn visit(&mut self, object: &dyn RepoObject) -> bool {
        self.index.insert(object.subpath(self.path_len).join("/"));
        true
    }
}

/// Date-addressed facade over a file-backed tree.
pub struct FileRepoFs {
    root: FileRepoDir,
    formatter: Arc<RepoFormatter>,
    index: HashSet<String>,
}

impl FileRepoFs {
    /// Opens (or creates) a repository rooted at `root`.
    ///
    /// The formatter is probed once for both period types so that later
    /// missing-artifact scans cannot trip over an unresolvable macro.
    pub fn new(root: &Path, formatter: RepoFormatter) -> Result<Self> {
        let probe = Date::from_ymd(1994, 1, 3)?;
        formatter.format(PeriodType::Day, probe)?;
        formatter.format(PeriodType::Quarter, probe)?;

        let mut fs = FileRepoFs {
            root: FileRepoDir::new(root)?,
            formatter: Arc::new(formatter),
            index: HashSet::new(),
        };
        fs.rebuild_index();
        Ok(fs)
    }

    pub fn formatter(&self) -> &Arc<RepoFormatter> {
        &self.formatter
    }

    pub fn root(&self) -> &FileRepoDir {
        &self.root
    }

    fn path_len(&self) -> usize {
        self.formatter.repo_format().path_len()
    }

    fn rebuild_index(&mut self) {
        let path_len = self.path_len();
        self.index.clear();
        let mut collector = IndexCollector {
            index: &mut self.index,
            path_len,
        };
        self.root.visit(&mut collector);
    }

    fn lookup(&self, uri: &str) -> Option<FileRepoObject> {
        let components: Vec<String> = uri
            .split('/')
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        match self.root.entry_at(&components) {
            Some(FileRepoEntry::Object(object)) => Some(object.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl RepoFs for FileRepoFs {
    async fn find(&self, period: PeriodType, date: Date) -> Result<Option<Box<dyn RepoObject>>> {
        let path = RepoObjectPath::from_date(period, date, &self.formatter)?;
        self.get_object(&path.uri()).await
    }

    async fn create(&mut self, period: PeriodType, date: Date) -> Result<Box<dyn RepoObject>> {
        let path = RepoObjectPath::from_date(period, date, &self.formatter)?;
        let leaf = path
            .leaf()
            .ok_or_else(|| MirrorError::InvalidPath(path.uri()))?
            .to_string();
        self.new_object(&path.parent_uri(), &leaf).await
    }

    async fn new_object(&mut self, dir_uri: &str, name: &str) -> Result<Box<dyn RepoObject>> {
        let mut dir = &mut self.root;
        for component in dir_uri.split('/').filter(|c| !c.is_empty()) {
            dir = dir.new_dir(component)?;
        }
        Ok(Box::new(dir.new_object(name)?))
    }

    async fn get_object(&self, uri: &str) -> Result<Option<Box<dyn RepoObject>>> {
        Ok(self
            .lookup(uri)
            .map(|object| Box::new(object) as Box<dyn RepoObject>))
    }

    async fn iterate_missing(
        &mut self,
        from: Date,
        to: Date,
    ) -> Result<Box<dyn Iterator<Item = Result<RepoObjectPath>> + Send>> {
        RepoFs::refresh(self).await?;
        debug!(
            from = %from,
            to = %to,
            indexed = self.index.len(),
            "scanning for missing artifacts"
        );
        Ok(Box::new(MissingScan::new(
            self.index.clone(),
            Arc::clone(&self.formatter),
            from,
            to,
        )))
    }

    async fn refresh(&mut self) -> Result<()> {
        RepoDir::refresh(&mut self.root)?;
        self.rebuild_index();
        Ok(())
    }
}

/// Iterator state for the missing-artifact scan; see
/// [`RepoFs::iterate_missing`].
pub struct MissingScan {
    have: HashSet<String>,
    formatter: Arc<RepoFormatter>,
    cursor: Date,
    remaining: i64,
    track_year: i32,
    track_quarter: u32,
    holidays: Arc<UsHolidays>,
    pending: Option<RepoObjectPath>,
}

impl MissingScan {
    fn new(have: HashSet<String>, formatter: Arc<RepoFormatter>, from: Date, to: Date) -> Self {
        MissingScan {
            have,
            formatter,
            cursor: from,
            remaining: to.diff_days(from),
            track_year: from.year(),
            track_quarter: 0,
            holidays: UsHolidays::for_year(from.year()),
            pending: None,
        }
    }
}

impl Iterator for MissingScan {
    type Item = Result<RepoObjectPath>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(day_path) = self.pending.take() {
            return Some(Ok(day_path));
        }
        while self.remaining > 0 {
            let date = self.cursor;
            self.remaining -= 1;
            self.cursor = date.add_days(1);

            if date.year() != self.track_year {
                self.track_year = date.year();
                self.track_quarter = 0;
                self.holidays = UsHolidays::for_year(date.year());
            }
            if date.is_weekend() || self.holidays.contains(date) {
                continue;
            }

            let day_path = match RepoObjectPath::from_date(PeriodType::Day, date, &self.formatter)
            {
                Ok(p) => p,
                Err(e) => return Some(Err(e)),
            };
            if self.have.contains(&day_path.uri()) {
                continue;
            }

            if date.quarter() != self.track_quarter {
                self.track_quarter = date.quarter();
                let quarter_path =
                    match RepoObjectPath::from_date(PeriodType::Quarter, date, &self.formatter) {
                        Ok(p) => p,
                        Err(e) => return Some(Err(e)),
                    };
                self.pending = Some(day_path);
                return Some(Ok(quarter_path));
            }
            return Some(Ok(day_path));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_components_takes_the_last_levels() {
        let path = PathBuf::from("/repo/D/2020/QTR1/master20200125.idx");
        assert_eq!(
            tail_components(&path, 4),
            vec!["D", "2020", "QTR1", "master20200125.idx"]
        );
        assert_eq!(tail_components(&path, 1), vec!["master20200125.idx"]);
        assert_eq!(tail_components(&path, 99).len(), 5);
    }
}
