//! Non-blocking repository entry points
//!
//! Each call moves the blocking repository operation onto tokio's blocking
//! pool. Once started, the transaction body runs to completion there: a
//! dropped future does not cancel it, and the scope guard still commits or
//! aborts on the worker thread.

use std::sync::Arc;

use crate::error::{RepositoryError, Result};

use super::base::{Collection, Repository};
use super::specification::Specification;

/// `async` facade over a [`Repository`]
pub struct AsyncRepository<C: Collection> {
    inner: Arc<Repository<C>>,
}

impl<C: Collection> AsyncRepository<C> {
    pub fn new(repository: Repository<C>) -> Self {
        Self {
            inner: Arc::new(repository),
        }
    }

    pub fn blocking(&self) -> &Repository<C> {
        &self.inner
    }

    pub async fn save(&self, entity: C::Entity) -> Result<()> {
        self.run(move |repo| repo.save(&entity)).await
    }

    pub async fn insert(&self, entity: C::Entity) -> Result<()> {
        self.run(move |repo| repo.insert(&entity)).await
    }

    pub async fn find_by_id(&self, id: impl Into<String>) -> Result<Option<C::Entity>> {
        let id = id.into();
        self.run(move |repo| repo.find_by_id(&id)).await
    }

    pub async fn find_all(&self) -> Result<Vec<C::Entity>> {
        self.run(|repo| repo.find_all()).await
    }

    pub async fn find_by_workspace(&self, workspace: impl Into<String>) -> Result<Vec<C::Entity>> {
        let workspace = workspace.into();
        self.run(move |repo| repo.find_by_workspace(&workspace)).await
    }

    pub async fn find_with_limit(&self, limit: usize, offset: usize) -> Result<Vec<C::Entity>> {
        self.run(move |repo| repo.find_with_limit(limit, offset)).await
    }

    pub async fn delete(&self, entity: C::Entity) -> Result<()> {
        self.run(move |repo| repo.delete(&entity)).await
    }

    pub async fn delete_by_id(&self, id: impl Into<String>) -> Result<bool> {
        let id = id.into();
        self.run(move |repo| repo.delete_by_id(&id)).await
    }

    pub async fn exists(&self, id: impl Into<String>) -> Result<bool> {
        let id = id.into();
        self.run(move |repo| repo.exists(&id)).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.run(|repo| repo.count()).await
    }

    pub async fn batch_save(&self, entities: Vec<C::Entity>) -> Result<usize> {
        self.run(move |repo| repo.batch_save(&entities)).await
    }

    pub async fn find_by_specification<S>(&self, spec: S) -> Result<Vec<C::Entity>>
    where
        S: Specification<C::Entity> + Send + 'static,
    {
        self.run(move |repo| repo.find_by_specification(&spec)).await
    }

    pub async fn count_by_specification<S>(&self, spec: S) -> Result<usize>
    where
        S: Specification<C::Entity> + Send + 'static,
    {
        self.run(move |repo| repo.count_by_specification(&spec)).await
    }

    /// Run an arbitrary blocking repository closure on the blocking pool
    pub async fn run<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Repository<C>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let repo = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&repo))
            .await
            .map_err(|e| RepositoryError::TaskJoin(e.to_string()))?
    }
}

impl<C: Collection> Clone for AsyncRepository<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Collection> From<Repository<C>> for AsyncRepository<C> {
    fn from(repository: Repository<C>) -> Self {
        Self::new(repository)
    }
}
