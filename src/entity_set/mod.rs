//! Typed CRUD facade over one mapped table
//!
//! An [`EntitySet`] executes the command templates of its record type's
//! [`TableDefinition`] against the owning context's connection. Single-entity
//! mutations run through the lifecycle pipeline:
//!
//! ```text
//! invoked -> before hooks -> cancelled? -> return 0
//!                         -> execute -> update RowId -> after hooks -> count
//! ```
//!
//! Bulk paths (`delete_where`, `insert_range`) and reads never fire hooks.
//! Every operation has an `_async` twin that runs the store call on tokio's
//! blocking pool and otherwise behaves identically.

mod events;

use std::any::{Any, TypeId};
use std::sync::Arc;

use tracing::debug;

pub use events::{EntityEvent, EntityEventArgs, Hook};
use events::Hooks;

use crate::database::{ConnectionHandle, DatabaseConn, Params};
use crate::entity::{Entity, UNSET_ROW_ID};
use crate::error::{Error, Result};
use crate::mapping::{TableDefinition, IDENTITY_QUERY, ROW_ID};

/// Placeholder used by [`EntitySet::first_or_default`].
pub const FIELD_VALUE_PARAM: &str = "FieldValue";

/// Predicate matching every row.
pub const MATCH_ALL: &str = "1 = 1";

/// Upper bound on bound values per bulk insert statement (SQLite's
/// `SQLITE_MAX_VARIABLE_NUMBER` for the bundled build).
pub const MAX_VARIABLES: usize = 32766;

/// CRUD facade for the record type `T`.
///
/// Cloning is cheap; clones share the definition, the connection and the
/// registered hooks.
pub struct EntitySet<T: Entity> {
    inner: Arc<SetInner<T>>,
}

struct SetInner<T: Entity> {
    definition: Arc<TableDefinition>,
    handle: ConnectionHandle,
    hooks: Hooks<T>,
}

impl<T: Entity> Clone for EntitySet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Entity> std::fmt::Debug for EntitySet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySet")
            .field("table", &self.inner.definition.table_name)
            .finish()
    }
}

impl<T: Entity> EntitySet<T> {
    /// Bind a set for `T` to a connection. The table definition is taken
    /// from the process-wide cache and built on first use.
    pub fn new(handle: ConnectionHandle) -> Result<Self> {
        let definition = T::definition()?;
        debug!("Attached entity set for [{}]", definition.table_name);
        Ok(Self {
            inner: Arc::new(SetInner {
                definition,
                handle,
                hooks: Hooks::default(),
            }),
        })
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.inner.definition
    }

    pub fn table_name(&self) -> &str {
        &self.inner.definition.table_name
    }

    pub fn property_names(&self) -> &[&'static str] {
        &self.inner.definition.property_names
    }

    pub fn select_template(&self) -> &str {
        &self.inner.definition.select_template
    }

    pub fn insert_template(&self) -> &str {
        &self.inner.definition.insert_template
    }

    pub fn update_template(&self) -> &str {
        &self.inner.definition.update_template
    }

    pub fn delete_template(&self) -> &str {
        &self.inner.definition.delete_template
    }

    pub fn delete_where_template(&self) -> &str {
        &self.inner.definition.delete_where_template
    }

    pub fn exists_template(&self) -> &str {
        &self.inner.definition.exists_template
    }

    pub fn count_template(&self) -> &str {
        &self.inner.definition.count_template
    }

    // ---- hooks ----

    /// Register a hook for `event`. Hooks run in registration order.
    pub fn on<F>(&self, event: EntityEvent, hook: F) -> &Self
    where
        F: Fn(&mut EntityEventArgs<'_, T>) + Send + Sync + 'static,
    {
        self.inner.hooks.add(event, Arc::new(hook));
        self
    }

    pub fn on_before_insert<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut EntityEventArgs<'_, T>) + Send + Sync + 'static,
    {
        self.on(EntityEvent::BeforeInsert, hook)
    }

    pub fn on_after_insert<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut EntityEventArgs<'_, T>) + Send + Sync + 'static,
    {
        self.on(EntityEvent::AfterInsert, hook)
    }

    pub fn on_before_update<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut EntityEventArgs<'_, T>) + Send + Sync + 'static,
    {
        self.on(EntityEvent::BeforeUpdate, hook)
    }

    pub fn on_after_update<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut EntityEventArgs<'_, T>) + Send + Sync + 'static,
    {
        self.on(EntityEvent::AfterUpdate, hook)
    }

    pub fn on_before_delete<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut EntityEventArgs<'_, T>) + Send + Sync + 'static,
    {
        self.on(EntityEvent::BeforeDelete, hook)
    }

    pub fn on_after_delete<F>(&self, hook: F) -> &Self
    where
        F: Fn(&mut EntityEventArgs<'_, T>) + Send + Sync + 'static,
    {
        self.on(EntityEvent::AfterDelete, hook)
    }

    /// Number of hooks registered for `event`.
    pub fn hook_count(&self, event: EntityEvent) -> usize {
        self.inner.hooks.count(event)
    }

    /// Drop every registered hook.
    pub fn clear_hooks(&self) {
        self.inner.hooks.clear();
    }

    // ---- single-entity mutations ----

    /// Insert `entity` and assign its generated `RowId`.
    ///
    /// Returns 0 when a before-insert hook cancels, 1 otherwise.
    pub fn insert(&self, entity: &mut T) -> Result<usize> {
        let mut args = EntityEventArgs::new(entity, self);
        if self.inner.hooks.fire(EntityEvent::BeforeInsert, &mut args) {
            debug!("Insert into [{}] cancelled", self.table_name());
            return Ok(0);
        }

        let params = args.entity.to_params();
        let row_id = self
            .inner
            .handle
            .with(|db| insert_returning_id(db, &self.inner.definition, &params))?;
        args.entity.set_row_id(row_id);

        self.inner.hooks.fire(EntityEvent::AfterInsert, &mut args);
        Ok(1)
    }

    /// Write every mapped column of `entity`, matched by `RowId`.
    pub fn update(&self, entity: &mut T) -> Result<usize> {
        let mut args = EntityEventArgs::new(entity, self);
        if self.inner.hooks.fire(EntityEvent::BeforeUpdate, &mut args) {
            debug!("Update of [{}] cancelled", self.table_name());
            return Ok(0);
        }

        let params = update_params(args.entity);
        let affected = self
            .inner
            .handle
            .with(|db| db.execute(self.update_template(), &params))?;

        self.inner.hooks.fire(EntityEvent::AfterUpdate, &mut args);
        Ok(affected)
    }

    /// Delete `entity` by `RowId` and reset its `RowId`.
    ///
    /// Fails with [`Error::MissingRowId`] if the entity was never stored.
    pub fn delete(&self, entity: &mut T) -> Result<usize> {
        ensure_stored(entity)?;

        let mut args = EntityEventArgs::new(entity, self);
        if self.inner.hooks.fire(EntityEvent::BeforeDelete, &mut args) {
            debug!("Delete from [{}] cancelled", self.table_name());
            return Ok(0);
        }

        let params = row_id_params(args.entity.row_id());
        let affected = self
            .inner
            .handle
            .with(|db| db.execute(self.delete_template(), &params))?;
        args.entity.set_row_id(UNSET_ROW_ID);

        self.inner.hooks.fire(EntityEvent::AfterDelete, &mut args);
        Ok(affected)
    }

    pub async fn insert_async(&self, entity: &mut T) -> Result<usize> {
        let mut args = EntityEventArgs::new(entity, self);
        if self.inner.hooks.fire(EntityEvent::BeforeInsert, &mut args) {
            debug!("Insert into [{}] cancelled", self.table_name());
            return Ok(0);
        }

        let params = args.entity.to_params();
        let definition = self.inner.definition.clone();
        let row_id = self
            .inner
            .handle
            .run(move |db| insert_returning_id(db, &definition, &params))
            .await?;
        args.entity.set_row_id(row_id);

        self.inner.hooks.fire(EntityEvent::AfterInsert, &mut args);
        Ok(1)
    }

    pub async fn update_async(&self, entity: &mut T) -> Result<usize> {
        let mut args = EntityEventArgs::new(entity, self);
        if self.inner.hooks.fire(EntityEvent::BeforeUpdate, &mut args) {
            debug!("Update of [{}] cancelled", self.table_name());
            return Ok(0);
        }

        let params = update_params(args.entity);
        let affected = self.execute_async(Template::Update, params).await?;

        self.inner.hooks.fire(EntityEvent::AfterUpdate, &mut args);
        Ok(affected)
    }

    pub async fn delete_async(&self, entity: &mut T) -> Result<usize> {
        ensure_stored(entity)?;

        let mut args = EntityEventArgs::new(entity, self);
        if self.inner.hooks.fire(EntityEvent::BeforeDelete, &mut args) {
            debug!("Delete from [{}] cancelled", self.table_name());
            return Ok(0);
        }

        let params = row_id_params(args.entity.row_id());
        let affected = self.execute_async(Template::Delete, params).await?;
        args.entity.set_row_id(UNSET_ROW_ID);

        self.inner.hooks.fire(EntityEvent::AfterDelete, &mut args);
        Ok(affected)
    }

    // ---- event-free paths used by the context ----

    pub(crate) fn insert_silently(&self, entity: &mut T) -> Result<usize> {
        let params = entity.to_params();
        let row_id = self
            .inner
            .handle
            .with(|db| insert_returning_id(db, &self.inner.definition, &params))?;
        entity.set_row_id(row_id);
        Ok(1)
    }

    pub(crate) fn update_silently(&self, entity: &T) -> Result<usize> {
        let params = update_params(entity);
        self.inner
            .handle
            .with(|db| db.execute(self.update_template(), &params))
    }

    pub(crate) fn delete_silently(&self, entity: &mut T) -> Result<usize> {
        ensure_stored(entity)?;
        let params = row_id_params(entity.row_id());
        let affected = self
            .inner
            .handle
            .with(|db| db.execute(self.delete_template(), &params))?;
        entity.set_row_id(UNSET_ROW_ID);
        Ok(affected)
    }

    pub(crate) async fn insert_silently_async(&self, entity: &mut T) -> Result<usize> {
        let params = entity.to_params();
        let definition = self.inner.definition.clone();
        let row_id = self
            .inner
            .handle
            .run(move |db| insert_returning_id(db, &definition, &params))
            .await?;
        entity.set_row_id(row_id);
        Ok(1)
    }

    pub(crate) async fn update_silently_async(&self, entity: &T) -> Result<usize> {
        self.execute_async(Template::Update, update_params(entity))
            .await
    }

    pub(crate) async fn delete_silently_async(&self, entity: &mut T) -> Result<usize> {
        ensure_stored(entity)?;
        let affected = self
            .execute_async(Template::Delete, row_id_params(entity.row_id()))
            .await?;
        entity.set_row_id(UNSET_ROW_ID);
        Ok(affected)
    }

    // ---- bulk mutations ----

    /// Delete every row matching `predicate`. No hooks fire.
    ///
    /// The predicate is appended verbatim after `WHERE`.
    pub fn delete_where(&self, predicate: &str, params: Params) -> Result<usize> {
        let sql = self.inner.definition.delete_where(predicate);
        self.inner.handle.with(|db| db.execute(&sql, &params))
    }

    pub async fn delete_where_async(&self, predicate: &str, params: Params) -> Result<usize> {
        let sql = self.inner.definition.delete_where(predicate);
        self.inner
            .handle
            .run(move |db| db.execute(&sql, &params))
            .await
    }

    /// Insert all `entities` with multi-row statements in one transaction.
    ///
    /// Rows are batched so no statement exceeds [`MAX_VARIABLES`] bound
    /// values; either every batch commits or none does. No hooks fire and
    /// `RowId`s are not written back. Fails with [`Error::EmptyRange`] when
    /// `entities` is empty.
    pub fn insert_range(&self, entities: &[T]) -> Result<usize> {
        let statements = self.range_statements(entities)?;
        self.inner
            .handle
            .with(|db| execute_in_transaction(db, &statements))
    }

    pub async fn insert_range_async(&self, entities: &[T]) -> Result<usize> {
        let statements = self.range_statements(entities)?;
        self.inner
            .handle
            .run(move |db| execute_in_transaction(db, &statements))
            .await
    }

    fn range_statements(&self, entities: &[T]) -> Result<Vec<(String, Params)>> {
        if entities.is_empty() {
            return Err(Error::EmptyRange);
        }

        let definition = &self.inner.definition;
        let columns = definition
            .property_names
            .iter()
            .map(|p| format!("[{}]", p))
            .collect::<Vec<_>>()
            .join(", ");
        let rows_per_statement = (MAX_VARIABLES / definition.property_names.len().max(1)).max(1);

        let mut statements = Vec::new();
        for chunk in entities.chunks(rows_per_statement) {
            let mut params = Params::new();
            let mut rows = Vec::with_capacity(chunk.len());
            for (index, entity) in chunk.iter().enumerate() {
                let mut values = entity.to_params();
                let placeholders = definition
                    .property_names
                    .iter()
                    .map(|property| {
                        // r<index>_<column> cannot collide across rows
                        let name = format!("r{}_{}", index, property);
                        let placeholder = format!("@{}", name);
                        let value = values
                            .take(property)
                            .unwrap_or_else(|| Box::new(rusqlite::types::Null));
                        params.push_boxed(name, value);
                        placeholder
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                rows.push(format!("({})", placeholders));
            }

            let sql = format!(
                "INSERT INTO [{}] ({}) VALUES {}",
                definition.table_name,
                columns,
                rows.join(", ")
            );
            statements.push((sql, params));
        }
        Ok(statements)
    }

    // ---- reads ----

    /// Rows matching `predicate`, appended verbatim after `WHERE`.
    pub fn select(&self, predicate: &str, params: Params) -> Result<Vec<T>> {
        let sql = self.inner.definition.select_where(predicate);
        self.inner
            .handle
            .with(|db| db.query_map(&sql, &params, T::from_row))
    }

    pub async fn select_async(&self, predicate: &str, params: Params) -> Result<Vec<T>> {
        let sql = self.inner.definition.select_where(predicate);
        self.inner
            .handle
            .run(move |db| db.query_map(&sql, &params, T::from_row))
            .await
    }

    pub fn select_all(&self) -> Result<Vec<T>> {
        self.select(MATCH_ALL, Params::new())
    }

    pub async fn select_all_async(&self) -> Result<Vec<T>> {
        self.select_async(MATCH_ALL, Params::new()).await
    }

    /// The row with the given `RowId`, if any.
    pub fn single(&self, row_id: i64) -> Result<Option<T>> {
        Ok(self
            .select(&row_id_predicate(), row_id_params(row_id))?
            .into_iter()
            .next())
    }

    pub async fn single_async(&self, row_id: i64) -> Result<Option<T>> {
        Ok(self
            .select_async(&row_id_predicate(), row_id_params(row_id))
            .await?
            .into_iter()
            .next())
    }

    /// The first row whose `field` column equals `value`.
    pub fn first_or_default<V>(&self, field: &str, value: V) -> Result<Option<T>>
    where
        V: rusqlite::ToSql + Send + Sync + 'static,
    {
        let params = Params::new().with(FIELD_VALUE_PARAM, value);
        Ok(self
            .select(&field_predicate(field), params)?
            .into_iter()
            .next())
    }

    pub async fn first_or_default_async<V>(&self, field: &str, value: V) -> Result<Option<T>>
    where
        V: rusqlite::ToSql + Send + Sync + 'static,
    {
        let params = Params::new().with(FIELD_VALUE_PARAM, value);
        Ok(self
            .select_async(&field_predicate(field), params)
            .await?
            .into_iter()
            .next())
    }

    pub fn count(&self) -> Result<i64> {
        self.inner
            .handle
            .with(|db| db.query_scalar(self.count_template(), &Params::new()))
    }

    pub async fn count_async(&self) -> Result<i64> {
        let sql = self.count_template().to_string();
        self.inner
            .handle
            .run(move |db| db.query_scalar(&sql, &Params::new()))
            .await
    }

    pub fn count_where(&self, predicate: &str, params: Params) -> Result<i64> {
        let sql = self.inner.definition.count_where(predicate);
        self.inner.handle.with(|db| db.query_scalar(&sql, &params))
    }

    pub async fn count_where_async(&self, predicate: &str, params: Params) -> Result<i64> {
        let sql = self.inner.definition.count_where(predicate);
        self.inner
            .handle
            .run(move |db| db.query_scalar(&sql, &params))
            .await
    }

    /// Whether the table holds any row.
    pub fn any(&self) -> Result<bool> {
        self.inner
            .handle
            .with(|db| db.query_scalar(self.exists_template(), &Params::new()))
    }

    pub async fn any_async(&self) -> Result<bool> {
        let sql = self.exists_template().to_string();
        self.inner
            .handle
            .run(move |db| db.query_scalar(&sql, &Params::new()))
            .await
    }

    pub fn any_where(&self, predicate: &str, params: Params) -> Result<bool> {
        let sql = self.inner.definition.exists_where(predicate);
        self.inner.handle.with(|db| db.query_scalar(&sql, &params))
    }

    pub async fn any_where_async(&self, predicate: &str, params: Params) -> Result<bool> {
        let sql = self.inner.definition.exists_where(predicate);
        self.inner
            .handle
            .run(move |db| db.query_scalar(&sql, &params))
            .await
    }

    async fn execute_async(&self, template: Template, params: Params) -> Result<usize> {
        let definition = self.inner.definition.clone();
        self.inner
            .handle
            .run(move |db| {
                let sql = match template {
                    Template::Update => &definition.update_template,
                    Template::Delete => &definition.delete_template,
                };
                db.execute(sql, &params)
            })
            .await
    }
}

#[derive(Clone, Copy)]
enum Template {
    Update,
    Delete,
}

fn insert_returning_id(db: &DatabaseConn, definition: &TableDefinition, params: &Params) -> Result<i64> {
    db.execute(definition.insert_statement(), params)?;
    db.query_scalar(IDENTITY_QUERY, &Params::new())
}

fn execute_in_transaction(db: &DatabaseConn, statements: &[(String, Params)]) -> Result<usize> {
    let tx = db.transaction()?;
    let mut affected = 0;
    for (sql, params) in statements {
        affected += db.execute(sql, params)?;
    }
    tx.commit()?;
    Ok(affected)
}

fn ensure_stored<T: Entity>(entity: &T) -> Result<()> {
    if entity.is_stored() {
        Ok(())
    } else {
        Err(Error::MissingRowId(T::descriptor().type_name))
    }
}

fn update_params<T: Entity>(entity: &T) -> Params {
    entity.to_params().with(ROW_ID, entity.row_id())
}

fn row_id_params(row_id: i64) -> Params {
    Params::new().with(ROW_ID, row_id)
}

fn row_id_predicate() -> String {
    format!("[{rid}] = @{rid}", rid = ROW_ID)
}

fn field_predicate(field: &str) -> String {
    format!("[{}] = @{}", field, FIELD_VALUE_PARAM)
}

/// Type-erased view of an entity set, used for runtime-type dispatch.
pub trait AnySet: Send + Sync {
    fn entity_type(&self) -> TypeId;

    fn entity_type_name(&self) -> &'static str;

    fn definition(&self) -> &TableDefinition;

    fn count(&self) -> Result<i64>;

    fn any(&self) -> Result<bool>;

    /// Bulk delete; never fires hooks.
    fn delete_where(&self, predicate: &str, params: Params) -> Result<usize>;

    fn as_any(&self) -> &dyn Any;
}

impl<T: Entity> AnySet for EntitySet<T> {
    fn entity_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn entity_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn definition(&self) -> &TableDefinition {
        EntitySet::definition(self)
    }

    fn count(&self) -> Result<i64> {
        EntitySet::count(self)
    }

    fn any(&self) -> Result<bool> {
        EntitySet::any(self)
    }

    fn delete_where(&self, predicate: &str, params: Params) -> Result<usize> {
        EntitySet::delete_where(self, predicate, params)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
