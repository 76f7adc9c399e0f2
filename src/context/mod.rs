//! Database context
//!
//! A [`Context`] owns one SQLite connection and the entity sets declared by a
//! schema-holder type. Opening a context:
//!
//! 1. opens and configures the connection;
//! 2. lets the schema holder declare its sets through [`DbSchema::declare`];
//! 3. creates every declared table and index in one transaction;
//! 4. fires the database-created callback if any table was missing.
//!
//! ```rust,ignore
//! struct Shop {
//!     orders: EntitySet<Order>,
//! }
//!
//! impl DbSchema for Shop {
//!     fn declare(registry: &mut SetRegistry) -> Result<Self> {
//!         Ok(Shop { orders: registry.set("Orders")? })
//!     }
//! }
//!
//! let shop = Context::<Shop>::builder().path("shop.sqlite3").open()?;
//! shop.orders.insert(&mut order)?;
//! ```
//!
//! The context's generic `insert`/`update`/`delete` resolve the set by
//! entity type and never fire lifecycle hooks.

mod registry;

use std::any::TypeId;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

pub use registry::{ContextEntry, ContextRegistry};

use crate::config::{ConnectionSettings, SqlsetConfig};
use crate::database::{ConnectionHandle, DatabaseConn, Params, SchemaManager, SchemaStatus};
use crate::entity::Entity;
use crate::entity_set::{AnySet, EntitySet};
use crate::error::{Error, Result};

const IN_MEMORY: &str = ":memory:";

/// Implemented by the struct that holds a context's entity sets.
pub trait DbSchema: Sized + Send + Sync + 'static {
    /// Construct every entity set of the schema through `registry`.
    fn declare(registry: &mut SetRegistry) -> Result<Self>;
}

struct NamedSet {
    name: String,
    set: Box<dyn AnySet>,
}

/// Collects the entity sets declared by a [`DbSchema`].
pub struct SetRegistry {
    handle: ConnectionHandle,
    sets: Vec<NamedSet>,
}

impl SetRegistry {
    fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            sets: Vec::new(),
        }
    }

    /// Declare the set `name` for record type `T`.
    ///
    /// The returned handle and the context's type-keyed lookup share one
    /// underlying set.
    pub fn set<T: Entity>(&mut self, name: &str) -> Result<EntitySet<T>> {
        let set = EntitySet::<T>::new(self.handle.clone())?;
        self.sets.push(NamedSet {
            name: name.to_string(),
            set: Box::new(set.clone()),
        });
        Ok(set)
    }
}

type CreatedCallback<S> = Box<dyn FnOnce(&Context<S>) + Send>;

/// Builder for [`Context`].
pub struct ContextBuilder<S: DbSchema> {
    path: Option<PathBuf>,
    settings: ConnectionSettings,
    registry: Option<Arc<ContextRegistry>>,
    on_created: Option<CreatedCallback<S>>,
}

impl<S: DbSchema> Default for ContextBuilder<S> {
    fn default() -> Self {
        Self {
            path: None,
            settings: ConnectionSettings::default(),
            registry: None,
            on_created: None,
        }
    }
}

impl<S: DbSchema> ContextBuilder<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the database in the file at `path`.
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Use a private in-memory database. This is the default.
    pub fn in_memory(mut self) -> Self {
        self.path = None;
        self
    }

    /// Open the database `name` inside the configured data directory with
    /// the configured connection settings.
    ///
    /// The data directory must exist; see [`SqlsetConfig::ensure_data_dir`].
    pub fn from_config(self, config: &SqlsetConfig, name: &str) -> Self {
        self.path(config.database_path(name))
            .settings(config.connection.clone())
    }

    pub fn settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Track the context in `registry` while it is open.
    pub fn registry(mut self, registry: Arc<ContextRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Called once after the schema was created in a database that was
    /// missing at least one table.
    pub fn on_database_created<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&Context<S>) + Send + 'static,
    {
        self.on_created = Some(Box::new(callback));
        self
    }

    pub fn open(self) -> Result<Context<S>> {
        let location = self
            .path
            .as_ref()
            .map(|p| p.to_string_lossy().to_string());
        let db = DatabaseConn::open(location.as_deref(), &self.settings)?;
        let handle = ConnectionHandle::new(db);

        let mut declared = SetRegistry::new(handle.clone());
        let schema = S::declare(&mut declared)?;
        let sets = declared.sets;

        let created = handle.with(|db| {
            let manager = SchemaManager::new(db);
            let status = manager.check_status(sets.iter().map(|s| s.set.definition()))?;
            manager.create_schema(sets.iter().map(|s| s.set.definition()))?;
            Ok(status != SchemaStatus::Current)
        })?;

        let context = Context {
            id: Uuid::new_v4(),
            path: self.path,
            schema,
            sets,
            handle,
            registry: self.registry,
        };

        if let Some(registry) = &context.registry {
            registry.register(ContextEntry {
                id: context.id,
                location: context.location(),
                set_count: context.sets.len(),
                opened_at: Instant::now(),
            });
        }

        info!(
            "Opened context {} at {} with {} entity sets",
            context.id,
            context.location(),
            context.sets.len()
        );

        if created {
            info!("Database created at {}", context.location());
            if let Some(callback) = self.on_created {
                callback(&context);
            }
        }

        Ok(context)
    }
}

/// An open database together with its declared entity sets.
///
/// Dereferences to the schema holder, so declared sets are reachable as
/// fields: `context.orders.select_all()`.
pub struct Context<S: DbSchema> {
    id: Uuid,
    path: Option<PathBuf>,
    schema: S,
    sets: Vec<NamedSet>,
    handle: ConnectionHandle,
    registry: Option<Arc<ContextRegistry>>,
}

impl<S: DbSchema> Context<S> {
    pub fn builder() -> ContextBuilder<S> {
        ContextBuilder::new()
    }

    /// Open a private in-memory context with default settings.
    pub fn open_in_memory() -> Result<Self> {
        Self::builder().in_memory().open()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn schema(&self) -> &S {
        &self.schema
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn location(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| IN_MEMORY.to_string())
    }

    /// Names of the declared sets, in declaration order.
    pub fn set_names(&self) -> Vec<&str> {
        self.sets.iter().map(|s| s.name.as_str()).collect()
    }

    /// The set registered for the record type `type_id`.
    ///
    /// A `TypeId` carries no type name, so the [`Error::UnregisteredType`]
    /// raised here only shows the id. Use [`Context::set_of`] when the type is
    /// known statically; its error names the type.
    pub fn set(&self, type_id: TypeId) -> Result<&dyn AnySet> {
        self.sets
            .iter()
            .find(|s| s.set.entity_type() == type_id)
            .map(|s| s.set.as_ref())
            .ok_or_else(|| Error::UnregisteredType(format!("{:?}", type_id)))
    }

    /// The set declared under `name`.
    pub fn set_named(&self, name: &str) -> Option<&dyn AnySet> {
        self.sets
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.set.as_ref())
    }

    /// The typed set registered for `T`.
    pub fn set_of<T: Entity>(&self) -> Result<EntitySet<T>> {
        self.sets
            .iter()
            .find_map(|s| s.set.as_any().downcast_ref::<EntitySet<T>>())
            .cloned()
            .ok_or_else(|| Error::UnregisteredType(std::any::type_name::<T>().to_string()))
    }

    // ---- generic pass-throughs; no lifecycle hooks ----

    /// Insert through the set registered for `T`, assigning `RowId`.
    pub fn insert<T: Entity>(&self, entity: &mut T) -> Result<usize> {
        self.set_of::<T>()?.insert_silently(entity)
    }

    pub fn update<T: Entity>(&self, entity: &T) -> Result<usize> {
        self.set_of::<T>()?.update_silently(entity)
    }

    pub fn delete<T: Entity>(&self, entity: &mut T) -> Result<usize> {
        self.set_of::<T>()?.delete_silently(entity)
    }

    pub fn select<T: Entity>(&self, predicate: &str, params: Params) -> Result<Vec<T>> {
        self.set_of::<T>()?.select(predicate, params)
    }

    /// Run arbitrary SQL and materialize each row as `T`.
    pub fn query<T: Entity>(&self, sql: &str, params: Params) -> Result<Vec<T>> {
        self.handle
            .with(|db| db.query_map(sql, &params, T::from_row))
    }

    /// Run an arbitrary statement, returning the affected row count.
    pub fn execute(&self, sql: &str, params: Params) -> Result<usize> {
        self.handle.with(|db| db.execute(sql, &params))
    }

    pub async fn insert_async<T: Entity>(&self, entity: &mut T) -> Result<usize> {
        self.set_of::<T>()?.insert_silently_async(entity).await
    }

    pub async fn update_async<T: Entity>(&self, entity: &T) -> Result<usize> {
        self.set_of::<T>()?.update_silently_async(entity).await
    }

    pub async fn delete_async<T: Entity>(&self, entity: &mut T) -> Result<usize> {
        self.set_of::<T>()?.delete_silently_async(entity).await
    }

    pub async fn select_async<T: Entity>(&self, predicate: &str, params: Params) -> Result<Vec<T>> {
        self.set_of::<T>()?.select_async(predicate, params).await
    }

    pub async fn query_async<T: Entity>(&self, sql: &str, params: Params) -> Result<Vec<T>> {
        let sql = sql.to_string();
        self.handle
            .run(move |db| db.query_map(&sql, &params, T::from_row))
            .await
    }

    pub async fn execute_async(&self, sql: &str, params: Params) -> Result<usize> {
        let sql = sql.to_string();
        self.handle
            .run(move |db| db.execute(&sql, &params))
            .await
    }

    /// Rebuild the database file, reclaiming free pages.
    pub fn vacuum(&self) -> Result<()> {
        self.handle.with(|db| SchemaManager::new(db).vacuum())
    }

    pub async fn vacuum_async(&self) -> Result<()> {
        self.handle
            .run(|db| SchemaManager::new(db).vacuum())
            .await
    }

    /// Close the connection and leave the registry.
    ///
    /// Safe to call more than once; every set of this context fails with
    /// [`Error::Closed`] afterwards.
    pub fn close(&self) -> Result<()> {
        if let Some(registry) = &self.registry {
            registry.unregister(&self.id);
        }
        if self.handle.close()? {
            info!("Closed context {}", self.id);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}

impl<S: DbSchema> Deref for Context<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.schema
    }
}

impl<S: DbSchema> Drop for Context<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close context {}: {}", self.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::entity::UNSET_ROW_ID;
    use crate::testing::{order_source, shop_context, Order, ShopSchema, Warehouse};

    struct OrdersOnly {
        orders: EntitySet<Order>,
    }

    impl DbSchema for OrdersOnly {
        fn declare(registry: &mut SetRegistry) -> Result<Self> {
            Ok(OrdersOnly {
                orders: registry.set("Orders")?,
            })
        }
    }

    #[test]
    fn test_open_creates_schema() {
        let context = shop_context();

        assert_eq!(context.set_names(), vec!["Orders", "Warehouses"]);
        let exists = context
            .handle
            .with(|db| Ok((db.table_exists("Order")?, db.table_exists("CustomWarehouse")?)))
            .unwrap();
        assert_eq!(exists, (true, true));
        assert_eq!(context.orders.table_name(), "Order");
        assert_eq!(context.warehouses.table_name(), "CustomWarehouse");
    }

    #[test]
    fn test_database_created_fires_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.sqlite3");
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = fired.clone();
            let context = Context::<ShopSchema>::builder()
                .path(&path)
                .on_database_created(move |ctx| {
                    assert_eq!(ctx.set_names().len(), 2);
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .open()
                .unwrap();
            context.orders.insert(&mut Order::new("John", "Leon")).unwrap();
        }

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let context = Context::<ShopSchema>::builder().path(&path).open().unwrap();
        assert_eq!(context.orders.count().unwrap(), 2);
    }

    #[test]
    fn test_created_fires_when_a_table_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grow.sqlite3");
        drop(Context::<OrdersOnly>::builder().path(&path).open().unwrap());

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let context = Context::<ShopSchema>::builder()
            .path(&path)
            .on_database_created(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .open()
            .unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!context.warehouses.any().unwrap());
    }

    #[test]
    fn test_set_by_type() {
        let context = shop_context();

        let set = context.set(TypeId::of::<Warehouse>()).unwrap();
        assert_eq!(set.definition().table_name, "CustomWarehouse");

        let err = context.set(TypeId::of::<String>()).err().unwrap();
        assert!(matches!(err, Error::UnregisteredType(_)));
        assert!(context.set_named("Orders").is_some());
        assert!(context.set_named("Invoices").is_none());
    }

    #[test]
    fn test_typed_field_and_lookup_share_a_set() {
        let context = shop_context();
        context.orders.on_before_insert(|args| args.cancel = true);

        let looked_up = context.set_of::<Order>().unwrap();
        assert_eq!(
            looked_up.hook_count(crate::entity_set::EntityEvent::BeforeInsert),
            1
        );
        assert_eq!(looked_up.insert(&mut Order::new("John", "Leon")).unwrap(), 0);
    }

    #[test]
    fn test_generic_ops_bypass_hooks() {
        let context = shop_context();
        let fired = Arc::new(AtomicUsize::new(0));
        let before = fired.clone();
        let after = fired.clone();
        context
            .orders
            .on_before_insert(move |args| {
                before.fetch_add(1, Ordering::SeqCst);
                args.cancel = true;
            })
            .on_after_update(move |_| {
                after.fetch_add(1, Ordering::SeqCst);
            });

        let mut order = Order::new("Peter", "Boston");
        assert_eq!(context.insert(&mut order).unwrap(), 1);
        assert!(order.row_id > 0);

        order.amount = 7;
        assert_eq!(context.update(&order).unwrap(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        let found: Vec<Order> = context
            .select("Amount = @Amount", Params::new().with("Amount", 7))
            .unwrap();
        assert_eq!(found, vec![order.clone()]);

        assert_eq!(context.delete(&mut order).unwrap(), 1);
        assert_eq!(order.row_id, UNSET_ROW_ID);
        assert_eq!(context.orders.count().unwrap(), 0);
    }

    #[test]
    fn test_delete_items_inserted_through_context() {
        let context = shop_context();
        let mut orders = order_source();
        for order in orders.iter_mut() {
            context.insert(order).unwrap();
        }
        assert_eq!(context.orders.count().unwrap(), 12);

        for order in orders.iter_mut() {
            assert_eq!(context.delete(order).unwrap(), 1);
        }
        assert!(!context.orders.any().unwrap());
    }

    #[test]
    fn test_generic_ops_require_registration() {
        let context = Context::<OrdersOnly>::open_in_memory().unwrap();
        let mut warehouse = Warehouse::default();

        assert!(matches!(
            context.insert(&mut warehouse),
            Err(Error::UnregisteredType(_))
        ));
        let err = context.set_of::<Warehouse>().unwrap_err();
        assert!(matches!(err, Error::UnregisteredType(ref name) if name.ends_with("Warehouse")));
        assert_eq!(context.orders.count().unwrap(), 0);
    }

    #[test]
    fn test_query_and_execute() {
        let context = shop_context();
        context.orders.insert_range(&order_source()).unwrap();

        let rows: Vec<Order> = context
            .query(
                "SELECT * FROM [Order] WHERE CustomerName = @CustomerName ORDER BY Amount DESC",
                Params::new().with("CustomerName", "Margarita"),
            )
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.windows(2).all(|w| w[0].amount > w[1].amount));

        let shipped = context
            .execute("UPDATE [Order] SET IsShipped = 1", Params::new())
            .unwrap();
        assert_eq!(shipped, 12);
    }

    #[test]
    fn test_warehouse_round_trip() {
        let context = shop_context();
        let mut warehouse = Warehouse {
            unique_id: Some("WH-1".into()),
            name: Some("North".into()),
            byte_property: vec![0, 1, 2, 255],
            description: "not stored".into(),
            ..Default::default()
        };
        context.warehouses.insert(&mut warehouse).unwrap();

        let loaded = context.warehouses.single(warehouse.row_id).unwrap().unwrap();
        assert_eq!(loaded.byte_property, vec![0, 1, 2, 255]);
        assert_eq!(loaded.name.as_deref(), Some("North"));
        assert!(loaded.description.is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let registry = Arc::new(ContextRegistry::new());
        let context = Context::<ShopSchema>::builder()
            .registry(registry.clone())
            .open()
            .unwrap();
        let orders = context.orders.clone();
        assert_eq!(registry.ids(), vec![context.id()]);

        context.close().unwrap();
        context.close().unwrap();
        assert!(context.is_closed());
        assert_eq!(registry.count(), 0);
        assert!(matches!(orders.count(), Err(Error::Closed)));
        assert!(matches!(context.vacuum(), Err(Error::Closed)));
    }

    #[test]
    fn test_drop_leaves_registry() {
        let registry = Arc::new(ContextRegistry::new());
        let open = |registry: &Arc<ContextRegistry>| {
            Context::<ShopSchema>::builder()
                .registry(registry.clone())
                .open()
                .unwrap()
        };

        let first = open(&registry);
        let second = open(&registry);
        assert_eq!(registry.count(), 2);
        assert_ne!(first.id(), second.id());
        assert_eq!(registry.get(&first.id()).unwrap().set_count, 2);

        drop(first);
        assert_eq!(registry.count(), 1);
        drop(second);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = SqlsetConfig {
            data_dir: dir.path().join("data").to_string_lossy().to_string(),
            connection: ConnectionSettings {
                journal_mode: "DELETE".to_string(),
                ..Default::default()
            },
        };
        config.ensure_data_dir().unwrap();

        let context = Context::<ShopSchema>::builder()
            .from_config(&config, "shop")
            .open()
            .unwrap();
        assert_eq!(
            context.path().unwrap().to_string_lossy(),
            config.database_path("shop")
        );
        assert!(context.path().unwrap().exists());
        context.vacuum().unwrap();
    }

    #[tokio::test]
    async fn test_async_generic_ops() {
        let context = shop_context();
        let mut order = Order::new("Margarita", "Guadalajara");

        assert_eq!(context.insert_async(&mut order).await.unwrap(), 1);
        order.shipper_city = Some("Atlanta".into());
        assert_eq!(context.update_async(&order).await.unwrap(), 1);

        let found: Vec<Order> = context
            .select_async(
                "ShipperCity = @ShipperCity",
                Params::new().with("ShipperCity", "Atlanta"),
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let raw: Vec<Order> = context
            .query_async("SELECT * FROM [Order]", Params::new())
            .await
            .unwrap();
        assert_eq!(raw, found);

        assert_eq!(context.delete_async(&mut order).await.unwrap(), 1);
        assert_eq!(
            context
                .execute_async("DELETE FROM [Order]", Params::new())
                .await
                .unwrap(),
            0
        );
        context.vacuum_async().await.unwrap();
    }
}
