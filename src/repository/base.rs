//! Repository Base
//!
//! Uniform CRUD and query surface for one collection inside one workspace.
//!
//! ## Responsibilities
//! - Derive workspace-scoped keys for every entity
//! - Route each operation to the collection's backing file and sub-database
//! - Encode/decode entities through the shared [`EntitySerializer`]
//! - Evaluate specifications in memory over materialised entities
//!
//! ## Query Model
//!
//! There are no secondary indexes. Field and specification queries load the
//! whole workspace run of the collection and filter it in memory, so they
//! are O(n) in the size of that run.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{RepositoryError, Result, SerializationError};
use crate::serialization::{Aggregate, EncodeContext, EntitySerializer, FieldCodec, FieldValue};
use crate::storage::{ReadScope, StorageManager, WriteScope};

use super::keys;
use super::specification::{FieldEquals, Specification};

/// Identity hook and placement of one domain collection
///
/// ```ignore
/// struct Widgets;
///
/// impl Collection for Widgets {
///     type Entity = Widget;
///     const DATABASE: &'static str = "catalog";
///     const SUB_DATABASE: &'static str = "widgets";
///
///     fn entity_id(widget: &Widget) -> String {
///         widget.id.clone()
///     }
/// }
/// ```
pub trait Collection: Send + Sync + 'static {
    type Entity: Aggregate;

    /// Logical database (backing file) holding the collection
    const DATABASE: &'static str;

    /// Sub-database holding the collection
    const SUB_DATABASE: &'static str;

    fn entity_id(entity: &Self::Entity) -> String;
}

/// CRUD and specification queries for collection `C` in one workspace
pub struct Repository<C: Collection> {
    storage: Arc<StorageManager>,
    serializer: Arc<EntitySerializer>,
    workspace: String,
    _collection: PhantomData<fn() -> C>,
}

impl<C: Collection> Repository<C> {
    pub fn new(
        storage: Arc<StorageManager>,
        serializer: Arc<EntitySerializer>,
        workspace: impl Into<String>,
    ) -> Result<Self> {
        let workspace = workspace.into();
        keys::validate_workspace(&workspace)?;
        Ok(Self {
            storage,
            serializer,
            workspace,
            _collection: PhantomData,
        })
    }

    /// Repository bound to the manager's default workspace
    pub fn in_default_workspace(
        storage: Arc<StorageManager>,
        serializer: Arc<EntitySerializer>,
    ) -> Result<Self> {
        let workspace = storage.config().default_workspace.clone();
        Self::new(storage, serializer, workspace)
    }

    /// Same collection, another workspace; shares storage and serializer
    pub fn for_workspace(&self, workspace: impl Into<String>) -> Result<Self> {
        Self::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.serializer),
            workspace,
        )
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    pub fn serializer(&self) -> &Arc<EntitySerializer> {
        &self.serializer
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Upsert an entity under its derived key
    pub fn save(&self, entity: &C::Entity) -> Result<()> {
        let id = C::entity_id(entity);
        let key = keys::storage_key(&self.workspace, &id)?;
        let bytes = self.serializer.serialize(entity)?;

        self.write(|scope| scope.put(&key, &bytes))?;
        tracing::debug!(
            workspace = %self.workspace,
            collection = C::SUB_DATABASE,
            key = %key,
            "entity saved"
        );
        Ok(())
    }

    /// Create an entity, failing if its id is already taken
    ///
    /// Check and put run in one write transaction.
    pub fn insert(&self, entity: &C::Entity) -> Result<()> {
        let id = C::entity_id(entity);
        let key = keys::storage_key(&self.workspace, &id)?;
        let bytes = self.serializer.serialize(entity)?;

        self.write(|scope| {
            if scope.contains(&key)? {
                return Err(RepositoryError::EntityAlreadyExists {
                    collection: C::SUB_DATABASE.to_string(),
                    id: id.clone(),
                });
            }
            scope.put(&key, &bytes)
        })
    }

    /// Delete an entity that must exist
    pub fn delete(&self, entity: &C::Entity) -> Result<()> {
        let id = C::entity_id(entity);
        if self.delete_by_id(&id)? {
            Ok(())
        } else {
            Err(RepositoryError::EntityNotFound {
                collection: C::SUB_DATABASE.to_string(),
                id,
            })
        }
    }

    /// Point delete; returns whether a row existed
    ///
    /// Absence is checked in a read snapshot first, so deleting from a
    /// collection that was never written leaves its sub-database uncreated.
    pub fn delete_by_id(&self, id: &str) -> Result<bool> {
        let key = keys::storage_key(&self.workspace, id)?;
        if !self.read(&self.workspace, |scope| scope.contains(&key))? {
            return Ok(false);
        }
        let existed = self.write(|scope| scope.delete(&key))?;
        if existed {
            tracing::debug!(
                workspace = %self.workspace,
                collection = C::SUB_DATABASE,
                key = %key,
                "entity deleted"
            );
        }
        Ok(existed)
    }

    /// Save each entity in its own transaction; not atomic as a whole
    ///
    /// Stops at the first failure. Returns the number saved.
    pub fn batch_save(&self, entities: &[C::Entity]) -> Result<usize> {
        for entity in entities {
            self.save(entity)?;
        }
        Ok(entities.len())
    }

    /// Delete each id in its own transaction; returns how many existed
    pub fn batch_delete<I, S>(&self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut deleted = 0;
        for id in ids {
            if self.delete_by_id(id.as_ref())? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    // =========================================================================
    // Point Reads
    // =========================================================================

    pub fn find_by_id(&self, id: &str) -> Result<Option<C::Entity>> {
        let key = keys::storage_key(&self.workspace, id)?;
        let bytes = self.read(&self.workspace, |scope| scope.get(&key))?;
        match bytes {
            Some(bytes) => Ok(Some(self.serializer.deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Presence check without decoding the stored envelope
    pub fn exists(&self, id: &str) -> Result<bool> {
        let key = keys::storage_key(&self.workspace, id)?;
        self.read(&self.workspace, |scope| scope.contains(&key))
    }

    // =========================================================================
    // Scans
    // =========================================================================

    /// Every entity of this repository's workspace
    pub fn find_all(&self) -> Result<Vec<C::Entity>> {
        self.scan(&self.workspace, None)
    }

    /// Every entity stored under `workspace`
    pub fn find_by_workspace(&self, workspace: &str) -> Result<Vec<C::Entity>> {
        self.scan(workspace, None)
    }

    /// One page of the workspace run, in key order
    ///
    /// Loads `offset + limit` records and then skips `offset` of them.
    pub fn find_with_limit(&self, limit: usize, offset: usize) -> Result<Vec<C::Entity>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let entities = self.scan(&self.workspace, Some(offset.saturating_add(limit)))?;
        Ok(entities.into_iter().skip(offset).take(limit).collect())
    }

    /// Number of stored records in the workspace, without decoding them
    pub fn count(&self) -> Result<usize> {
        let prefix = keys::workspace_prefix(&self.workspace)?;
        let keys = self.read(&self.workspace, |scope| scope.scan_prefix_keys(&prefix, None))?;
        Ok(keys.len())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Entities whose top-level field `name` equals `value`
    ///
    /// Compares stored documents before decoding, so only matches are
    /// rebuilt into entities.
    pub fn find_by_field_value(&self, name: &str, value: &FieldValue) -> Result<Vec<C::Entity>> {
        let spec = FieldEquals::new(name, value.clone());
        let prefix = keys::workspace_prefix(&self.workspace)?;
        let entries = self.read(&self.workspace, |scope| scope.scan_prefix(&prefix, None))?;

        let mut matches = Vec::new();
        for (key, bytes) in entries {
            let doc = match self.serializer.decode_document(&bytes) {
                Ok(doc) => doc,
                Err(e) => {
                    self.skip_record(&key, &e);
                    continue;
                }
            };
            if !spec.is_satisfied_by(&doc) {
                continue;
            }
            match self.serializer.from_document(doc) {
                Ok(entity) => matches.push(entity),
                Err(e) => self.skip_record(&key, &e),
            }
        }
        Ok(matches)
    }

    /// [`find_by_field_value`](Self::find_by_field_value) with a typed value
    pub fn find_by_field<V: FieldCodec>(&self, name: &str, value: &V) -> Result<Vec<C::Entity>> {
        let cx = EncodeContext::new(self.serializer.registry(), <C::Entity as Aggregate>::TYPE_NAME);
        let encoded = value.encode_field(&cx)?;
        self.find_by_field_value(name, &encoded)
    }

    /// Materialise the workspace run and keep what satisfies `spec`
    pub fn find_by_specification<S>(&self, spec: &S) -> Result<Vec<C::Entity>>
    where
        S: Specification<C::Entity> + ?Sized,
    {
        let mut entities = self.find_all()?;
        entities.retain(|entity| spec.is_satisfied_by(entity));
        Ok(entities)
    }

    pub fn find_one_by_specification<S>(&self, spec: &S) -> Result<Option<C::Entity>>
    where
        S: Specification<C::Entity> + ?Sized,
    {
        Ok(self
            .find_all()?
            .into_iter()
            .find(|entity| spec.is_satisfied_by(entity)))
    }

    pub fn count_by_specification<S>(&self, spec: &S) -> Result<usize>
    where
        S: Specification<C::Entity> + ?Sized,
    {
        Ok(self
            .find_all()?
            .iter()
            .filter(|entity| spec.is_satisfied_by(entity))
            .count())
    }

    pub fn exists_by_specification<S>(&self, spec: &S) -> Result<bool>
    where
        S: Specification<C::Entity> + ?Sized,
    {
        Ok(self
            .find_all()?
            .iter()
            .any(|entity| spec.is_satisfied_by(entity)))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn read<R>(
        &self,
        workspace: &str,
        f: impl FnOnce(&ReadScope) -> Result<R>,
    ) -> Result<R> {
        self.storage
            .read(C::DATABASE, Some(workspace), C::SUB_DATABASE, f)
    }

    fn write<R>(&self, f: impl FnOnce(&mut WriteScope) -> Result<R>) -> Result<R> {
        self.storage
            .write(C::DATABASE, Some(&self.workspace), C::SUB_DATABASE, f)
    }

    /// Prefix scan stopping at the first key outside the workspace run
    ///
    /// Records that fail to decode are logged and skipped.
    fn scan(&self, workspace: &str, limit: Option<usize>) -> Result<Vec<C::Entity>> {
        let prefix = keys::workspace_prefix(workspace)?;
        let entries = self.read(workspace, |scope| scope.scan_prefix(&prefix, limit))?;

        let mut entities = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            match self.serializer.deserialize::<C::Entity>(&bytes) {
                Ok(entity) => entities.push(entity),
                Err(e) => self.skip_record(&key, &e),
            }
        }
        Ok(entities)
    }

    fn skip_record(&self, key: &str, error: &SerializationError) {
        tracing::warn!(
            collection = C::SUB_DATABASE,
            key = %key,
            error = %error,
            "skipping undecodable record"
        );
    }
}

impl<C: Collection> Clone for Repository<C> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            serializer: Arc::clone(&self.serializer),
            workspace: self.workspace.clone(),
            _collection: PhantomData,
        }
    }
}

impl<C: Collection> fmt::Debug for Repository<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("database", &C::DATABASE)
            .field("collection", &C::SUB_DATABASE)
            .field("workspace", &self.workspace)
            .finish()
    }
}
