//! Capability traits shared by the local and remote repository trees.
//!
//! The repository model is a small family of interfaces keyed to what a thing
//! can do rather than a deep inheritance tree:
//!
//! - [`RepoEntity`] — anything addressable: `exists`, `as_uri`, `subpath`.
//! - [`RepoObject`] — a leaf artifact that can additionally stream bytes in
//!   and out.
//! - [`RepoDir`] — a directory that can mint children and reconcile its
//!   in-memory cache with the backing store.
//! - [`RepoFs`] — the facade over a whole tree: date-addressed lookup and
//!   creation, plus the missing-artifact scan that drives a sync.
//! - [`RepoVisitor`] — callback for depth-first traversals.
//!
//! There are two families of implementations: the file-backed tree in
//! [`crate::local`] (read/write) and the HTTP-backed tree in
//! [`crate::remote`] (read-only). The sync pipe only ever talks to
//! [`RepoFs`] and [`RepoObject`], which keeps the polymorphism narrow.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::calendar::{Date, PeriodType};
use crate::error::Result;
use crate::format::RepoObjectPath;

/// Byte-chunk stream produced by object reads and consumed by writes.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Default chunk size for streamed object copies.
pub const DEFAULT_BUFSIZE: usize = 8192;

/// Anything that occupies a location in a repository tree.
#[async_trait]
pub trait RepoEntity: Send + Sync {
    /// Whether the entity is present in the backing store right now.
    async fn exists(&self) -> bool;

    /// The entity's address: an absolute filesystem path or a URL.
    fn as_uri(&self) -> String;

    /// The last `levels` name components of the entity's address, walking
    /// toward the root.
    fn subpath(&self, levels: usize) -> Vec<String>;
}

/// A leaf artifact holding an opaque byte payload.
#[async_trait]
pub trait RepoObject: RepoEntity {
    /// Opens the object for reading and returns a lazy sequence of chunks of
    /// at most `bufsize` bytes each (transports may coalesce differently).
    ///
    /// The underlying handle is released when the stream is exhausted or
    /// dropped early.
    async fn read(&self, bufsize: usize) -> Result<ByteStream>;

    /// Consumes `chunks` into the object.
    ///
    /// With `overwrite` unset the write is exclusive-create and fails with
    /// `AlreadyExists` when the target is present. With `overwrite` set the
    /// payload goes to a temporary sibling first and is renamed over the
    /// target, so concurrent readers see either the old or the new content,
    /// never a mix.
    async fn write(&self, chunks: ByteStream, overwrite: bool) -> Result<()>;
}

/// A directory that can mint children and refresh its view of the store.
pub trait RepoDir: RepoEntity {
    type Object: RepoObject;
    type Dir: RepoDir;

    /// Returns a handle for a child object, registering it in the cache. The
    /// object itself is not materialized until written.
    fn new_object(&mut self, name: &str) -> Result<Self::Object>;

    /// Returns the child directory of that name, creating it as needed.
    fn new_dir(&mut self, name: &str) -> Result<&mut Self::Dir>;

    /// Reconciles the in-memory child cache with the backing store without
    /// discarding already-cached subtrees.
    fn refresh(&mut self) -> Result<()>;
}

/// Callback invoked for each object during a depth-first traversal; returning
/// `false` aborts the walk.
pub trait RepoVisitor {
    fn visit(&mut self, object: &dyn RepoObject) -> bool;
}

/// Facade over one repository tree, addressed by `(period type, date)`.
#[async_trait]
pub trait RepoFs: Send + Sync {
    /// Resolves the canonical path for `(period, date)` and returns the
    /// object if the tree currently has it.
    async fn find(&self, period: PeriodType, date: Date) -> Result<Option<Box<dyn RepoObject>>>;

    /// Returns a writable handle at the canonical path for `(period, date)`,
    /// creating intermediate directories as needed. The object is not
    /// written yet.
    async fn create(&mut self, period: PeriodType, date: Date) -> Result<Box<dyn RepoObject>>;

    /// Like [`RepoFs::create`] with an explicit directory URI and leaf name.
    async fn new_object(&mut self, dir_uri: &str, name: &str) -> Result<Box<dyn RepoObject>>;

    /// Exact-path lookup without date semantics.
    async fn get_object(&self, uri: &str) -> Result<Option<Box<dyn RepoObject>>>;

    /// Enumerates the artifacts that should exist for `[from, to]` per the
    /// trading calendar but are absent from the tree, in date order. When a
    /// quarter is first found to have any missing day, its quarterly master
    /// path is emitted just before that day's path, at most once per
    /// quarter. Weekends and observed holidays never produce day paths.
    ///
    /// The returned iterator owns a snapshot of the tree index, so the
    /// filesystem handle stays free for concurrent `create` calls while
    /// the caller drains it.
    async fn iterate_missing(
        &mut self,
        from: Date,
        to: Date,
    ) -> Result<Box<dyn Iterator<Item = Result<RepoObjectPath>> + Send>>;

    /// Eager form of [`RepoFs::iterate_missing`], collecting URIs.
    async fn find_missing(&mut self, from: Date, to: Date) -> Result<Vec<String>> {
        let mut uris = Vec::new();
        for path in self.iterate_missing(from, to).await? {
            uris.push(path?.uri());
        }
        Ok(uris)
    }

    /// Rebuilds the in-memory index from the backing store.
    async fn refresh(&mut self) -> Result<()>;
}
