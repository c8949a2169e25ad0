#![allow(dead_code)]

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt, stream};
use mirrorkit::{
    ByteStream, Date, MirrorError, PeriodType, RepoEntity, RepoFormat, RepoFormatter, RepoFs,
    RepoObject, RepoObjectPath, Result,
};

/// The default sink layout used across the suites.
pub fn formatter() -> RepoFormatter {
    RepoFormatter::new(RepoFormat::edgar_default())
}

/// Lays out a small EDGAR-style tree: the quarterly masters for 2017 Q4 and
/// 2018 Q1 plus every daily file of 2017 Q4 (92 days) and the first 25 days
/// of 2018 Q1.
pub fn edgar_tree(root: &Path) {
    for (quarter_uri, first_day, day_count) in [
        ("2017/QTR4", "2017-10-01", 92),
        ("2018/QTR1", "2018-01-01", 25),
    ] {
        let qdir = root.join("Q").join(quarter_uri);
        std::fs::create_dir_all(&qdir).unwrap();
        std::fs::write(qdir.join("master.idx"), quarter_uri).unwrap();

        let ddir = root.join("D").join(quarter_uri);
        std::fs::create_dir_all(&ddir).unwrap();
        let first = Date::parse(first_day).unwrap();
        for i in 0..day_count {
            let day = first.add_days(i);
            let name = format!(
                "master{}{:02}{:02}.idx",
                day.year(),
                day.month(),
                day.day()
            );
            std::fs::write(ddir.join(name), day.to_string()).unwrap();
        }
    }
}

/// Drains an object's read stream into a string.
pub async fn read_object(object: &dyn RepoObject, bufsize: usize) -> String {
    let mut stream = object.read(bufsize).await.unwrap();
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.try_next().await.unwrap() {
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes).unwrap()
}

/// An in-memory read-only object with fixed content.
pub struct StaticObject {
    uri: String,
    content: String,
}

impl StaticObject {
    pub fn new(uri: impl Into<String>, content: impl Into<String>) -> Self {
        StaticObject {
            uri: uri.into(),
            content: content.into(),
        }
    }
}

#[async_trait]
impl RepoEntity for StaticObject {
    async fn exists(&self) -> bool {
        true
    }

    fn as_uri(&self) -> String {
        self.uri.clone()
    }

    fn subpath(&self, levels: usize) -> Vec<String> {
        let parts: Vec<String> = self.uri.split('/').map(str::to_string).collect();
        let skip = parts.len().saturating_sub(levels);
        parts[skip..].to_vec()
    }
}

#[async_trait]
impl RepoObject for StaticObject {
    async fn read(&self, bufsize: usize) -> Result<ByteStream> {
        let chunks: Vec<Result<Bytes>> = self
            .content
            .as_bytes()
            .chunks(bufsize.max(1))
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn write(&self, _chunks: ByteStream, _overwrite: bool) -> Result<()> {
        Err(MirrorError::Unsupported("write on a static object"))
    }
}

/// A source filesystem that fabricates `"<period> <date>"` content for any
/// requested artifact.
pub struct MockSourceFs;

#[async_trait]
impl RepoFs for MockSourceFs {
    async fn find(&self, period: PeriodType, date: Date) -> Result<Option<Box<dyn RepoObject>>> {
        Ok(Some(Box::new(StaticObject::new(
            format!("mock/{period}/{date}"),
            format!("{period} {date}"),
        ))))
    }

    async fn create(&mut self, _period: PeriodType, _date: Date) -> Result<Box<dyn RepoObject>> {
        Err(MirrorError::Unsupported("create on the mock source"))
    }

    async fn new_object(&mut self, _dir_uri: &str, _name: &str) -> Result<Box<dyn RepoObject>> {
        Err(MirrorError::Unsupported("create on the mock source"))
    }

    async fn get_object(&self, _uri: &str) -> Result<Option<Box<dyn RepoObject>>> {
        Ok(None)
    }

    async fn iterate_missing(
        &mut self,
        _from: Date,
        _to: Date,
    ) -> Result<Box<dyn Iterator<Item = Result<RepoObjectPath>> + Send>> {
        Ok(Box::new(std::iter::empty()))
    }

    async fn refresh(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Wraps a sink filesystem with a scripted missing list and optional fault
/// injection, standing in for prepared repository states.
pub struct ScriptedFs<K: RepoFs> {
    pub inner: K,
    pub missing: Vec<RepoObjectPath>,
    pub fail_create_on: Option<Date>,
    pub fail_scan: bool,
}

impl<K: RepoFs> ScriptedFs<K> {
    pub fn new(inner: K, missing: Vec<RepoObjectPath>) -> Self {
        ScriptedFs {
            inner,
            missing,
            fail_create_on: None,
            fail_scan: false,
        }
    }
}

#[async_trait]
impl<K: RepoFs> RepoFs for ScriptedFs<K> {
    async fn find(&self, period: PeriodType, date: Date) -> Result<Option<Box<dyn RepoObject>>> {
        self.inner.find(period, date).await
    }

    async fn create(&mut self, period: PeriodType, date: Date) -> Result<Box<dyn RepoObject>> {
        if self.fail_create_on == Some(date) {
            return Err(MirrorError::AlreadyExists(date.to_string()));
        }
        self.inner.create(period, date).await
    }

    async fn new_object(&mut self, dir_uri: &str, name: &str) -> Result<Box<dyn RepoObject>> {
        self.inner.new_object(dir_uri, name).await
    }

    async fn get_object(&self, uri: &str) -> Result<Option<Box<dyn RepoObject>>> {
        self.inner.get_object(uri).await
    }

    async fn iterate_missing(
        &mut self,
        _from: Date,
        _to: Date,
    ) -> Result<Box<dyn Iterator<Item = Result<RepoObjectPath>> + Send>> {
        if self.fail_scan {
            return Err(MirrorError::NotFound("scripted scan failure".to_string()));
        }
        let missing = std::mem::take(&mut self.missing);
        Ok(Box::new(missing.into_iter().map(Ok)))
    }

    async fn refresh(&mut self) -> Result<()> {
        self.inner.refresh().await
    }
}
