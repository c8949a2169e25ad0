//! HTTP-backed repository tree.
//!
//! Mirrors the same capability traits as the local tree, backed by `HEAD`
//! and streamed `GET` requests. The remote tree is strictly read-only:
//! writes fail with `Unsupported`, and the missing-artifact scan is empty
//! because gap detection is the sink's job.
//!
//! The stock EDGAR source is built with [`HttpRepoFs::edgar`]: the archive
//! splits daily and quarterly indices into sibling trees, which the path
//! layout expresses with the `{index}` user macro:
//!
//! ```text
//! https://www.sec.gov/Archives/edgar/daily-index/2020/QTR1/master.20200125.idx
//! https://www.sec.gov/Archives/edgar/full-index/2020/QTR1/master.idx
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use reqwest::StatusCode;
use tracing::warn;

use crate::calendar::{Date, PeriodType};
use crate::client::HttpClient;
use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::format::{RepoFormat, RepoFormatter, RepoObjectPath};
use crate::repo::{ByteStream, RepoDir, RepoEntity, RepoFs, RepoObject, RepoVisitor};

/// Resolves the `{index}` macro of the EDGAR source layout.
pub fn index_macro(period: PeriodType, _date: Date) -> String {
    match period {
        PeriodType::Day => "daily-index",
        PeriodType::Quarter => "full-index",
    }
    .to_string()
}

fn join_url(base: &str, rel: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        rel.trim_start_matches('/')
    )
}

fn norm_dir_url(url: &str) -> String {
    format!("{}/", url.trim_end_matches('/'))
}

fn url_tail(url: &str, levels: usize) -> Vec<String> {
    let parts: Vec<String> = url
        .trim_end_matches('/')
        .split('/')
        .map(str::to_string)
        .collect();
    let skip = parts.len().saturating_sub(levels);
    parts[skip..].to_vec()
}

/// A remote artifact addressed by URL.
#[derive(Debug, Clone)]
pub struct HttpRepoObject {
    url: String,
    client: HttpClient,
}

impl HttpRepoObject {
    pub fn new(url: impl Into<String>, client: HttpClient) -> Self {
        HttpRepoObject {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RepoEntity for HttpRepoObject {
    async fn exists(&self) -> bool {
        match self.client.head(&self.url).await {
            Ok(status) => status == StatusCode::OK,
            Err(e) => {
                warn!(url = %self.url, error = %e, "HEAD failed");
                false
            }
        }
    }

    fn as_uri(&self) -> String {
        self.url.clone()
    }

    fn subpath(&self, levels: usize) -> Vec<String> {
        url_tail(&self.url, levels)
    }
}

#[async_trait]
impl RepoObject for HttpRepoObject {
    /// Streams the response body. Chunks arrive at the transport's natural
    /// granularity; `_bufsize` is advisory here. A non-200 response yields
    /// an empty stream rather than an error, so callers that must tell the
    /// two apart check [`RepoEntity::exists`] first.
    async fn read(&self, _bufsize: usize) -> Result<ByteStream> {
        let response = self.client.get(&self.url).await?;
        if response.status() != StatusCode::OK {
            warn!(url = %self.url, status = %response.status(), "GET returned no body");
            return Ok(stream::empty().boxed());
        }
        Ok(response
            .bytes_stream()
            .map_err(MirrorError::Transport)
            .boxed())
    }

    async fn write(&self, _chunks: ByteStream, _overwrite: bool) -> Result<()> {
        Err(MirrorError::Unsupported("write on a remote repository"))
    }
}

/// A remote directory; purely an address, no listing is ever fetched.
#[derive(Debug)]
pub struct HttpRepoDir {
    url: String,
    client: HttpClient,
    children: BTreeMap<String, HttpRepoDir>,
}

impl HttpRepoDir {
    pub fn new(url: &str, client: HttpClient) -> Self {
        HttpRepoDir {
            url: norm_dir_url(url),
            client,
            children: BTreeMap::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Remote listings are not supported, so there is nothing to walk.
    pub fn visit(&self, _visitor: &mut dyn RepoVisitor) -> bool {
        true
    }
}

#[async_trait]
impl RepoEntity for HttpRepoDir {
    async fn exists(&self) -> bool {
        match self.client.head(&self.url).await {
            Ok(status) => status == StatusCode::OK,
            Err(e) => {
                warn!(url = %self.url, error = %e, "HEAD failed");
                false
            }
        }
    }

    fn as_uri(&self) -> String {
        self.url.clone()
    }

    fn subpath(&self, levels: usize) -> Vec<String> {
        url_tail(&self.url, levels)
    }
}

impl RepoDir for HttpRepoDir {
    type Object = HttpRepoObject;
    type Dir = HttpRepoDir;

    fn new_object(&mut self, name: &str) -> Result<HttpRepoObject> {
        Ok(HttpRepoObject::new(
            join_url(&self.url, name),
            self.client.clone(),
        ))
    }

    fn new_dir(&mut self, name: &str) -> Result<&mut HttpRepoDir> {
        if !self.children.contains_key(name) {
            let child = HttpRepoDir::new(&join_url(&self.url, name), self.client.clone());
            self.children.insert(name.to_string(), child);
        }
        self.children
            .get_mut(name)
            .ok_or_else(|| MirrorError::InvalidPath(join_url(&self.url, name)))
    }

    fn refresh(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Date-addressed facade over a remote index tree.
pub struct HttpRepoFs {
    base_url: String,
    client: HttpClient,
    formatter: Arc<RepoFormatter>,
}

impl HttpRepoFs {
    pub fn new(base_url: &str, client: HttpClient, formatter: RepoFormatter) -> Self {
        HttpRepoFs {
            base_url: norm_dir_url(base_url),
            client,
            formatter: Arc::new(formatter),
        }
    }

    /// The stock EDGAR archive source: daily indices under `daily-index/`,
    /// quarterly masters under `full-index/`.
    pub fn edgar(config: &MirrorConfig) -> Result<Self> {
        let client = HttpClient::new(config)?;
        let mut formatter = RepoFormatter::new(RepoFormat::edgar_source());
        formatter.register("index", index_macro);
        Ok(Self::new(&config.base_url, client, formatter))
    }

    pub fn formatter(&self) -> &Arc<RepoFormatter> {
        &self.formatter
    }

    fn object_at(&self, rel_uri: &str) -> HttpRepoObject {
        HttpRepoObject::new(join_url(&self.base_url, rel_uri), self.client.clone())
    }
}

#[async_trait]
impl RepoFs for HttpRepoFs {
    async fn find(&self, period: PeriodType, date: Date) -> Result<Option<Box<dyn RepoObject>>> {
        let path = RepoObjectPath::from_date(period, date, &self.formatter)?;
        self.get_object(&path.uri()).await
    }

    /// The remote tree cannot create anything; the returned handle is only
    /// good for reads, and writing through it fails with `Unsupported`.
    async fn create(&mut self, period: PeriodType, date: Date) -> Result<Box<dyn RepoObject>> {
        let path = RepoObjectPath::from_date(period, date, &self.formatter)?;
        Ok(Box::new(self.object_at(&path.uri())))
    }

    async fn new_object(&mut self, dir_uri: &str, name: &str) -> Result<Box<dyn RepoObject>> {
        let rel = format!("{}/{}", dir_uri.trim_end_matches('/'), name);
        Ok(Box::new(self.object_at(&rel)))
    }

    async fn get_object(&self, uri: &str) -> Result<Option<Box<dyn RepoObject>>> {
        let object = self.object_at(uri);
        if RepoEntity::exists(&object).await {
            Ok(Some(Box::new(object)))
        } else {
            Ok(None)
        }
    }

    /// Gap detection belongs to the sink; a source tree reports nothing.
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
