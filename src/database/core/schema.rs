//! Database schema management
//!
//! Creates and inspects the tables described by a set of table definitions.

use tracing::info;

use super::connection::DatabaseConn;
use crate::error::Result;
use crate::mapping::TableDefinition;

/// Schema manager for the tables of one context
pub struct SchemaManager<'a> {
    db: &'a DatabaseConn,
}

impl<'a> SchemaManager<'a> {
    /// Create a new schema manager for the given connection
    pub fn new(db: &'a DatabaseConn) -> Self {
        Self { db }
    }

    /// Create every table and index in one transaction
    ///
    /// The DDL of all definitions is concatenated and executed as a single
    /// batch; either all of it commits or none of it does. Every statement is
    /// `IF NOT EXISTS`, so running this against an existing store is a no-op.
    pub fn create_schema<'d, I>(&self, definitions: I) -> Result<()>
    where
        I: IntoIterator<Item = &'d TableDefinition>,
    {
        let mut ddl = String::new();
        let mut tables = 0;
        for definition in definitions {
            ddl.push_str(&definition.table_definition);
            tables += 1;
        }

        let tx = self.db.transaction()?;
        tx.execute_batch(&ddl)?;
        tx.commit()?;

        info!("Created schema for {} tables", tables);
        Ok(())
    }

    /// Check which of the given tables exist
    pub fn check_status<'d, I>(&self, definitions: I) -> Result<SchemaStatus>
    where
        I: IntoIterator<Item = &'d TableDefinition>,
    {
        let mut present = 0;
        let mut missing = Vec::new();
        for definition in definitions {
            if self.db.table_exists(&definition.table_name)? {
                present += 1;
            } else {
                missing.push(definition.table_name.clone());
            }
        }

        Ok(match (present, missing.is_empty()) {
            (_, true) => SchemaStatus::Current,
            (0, false) => SchemaStatus::NotInitialized,
            (_, false) => SchemaStatus::Incomplete { missing },
        })
    }

    /// Reclaim unused space in the database file
    pub fn vacuum(&self) -> Result<()> {
        info!("Running VACUUM");
        self.db.execute_batch("VACUUM")
    }
}

/// Status of the database schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStatus {
    /// None of the mapped tables exist
    NotInitialized,

    /// Every mapped table exists
    Current,

    /// Some mapped tables are missing
    Incomplete { missing: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{order_descriptor, warehouse_descriptor};

    fn definitions() -> Vec<TableDefinition> {
        vec![
            TableDefinition::build(&order_descriptor()).unwrap(),
            TableDefinition::build(&warehouse_descriptor()).unwrap(),
        ]
    }

    #[test]
    fn test_schema_not_initialized() {
        let db = DatabaseConn::open_in_memory().unwrap();
        let manager = SchemaManager::new(&db);

        assert_eq!(
            manager.check_status(&definitions()).unwrap(),
            SchemaStatus::NotInitialized
        );
    }

    #[test]
    fn test_create_schema() {
        let db = DatabaseConn::open_in_memory().unwrap();
        let manager = SchemaManager::new(&db);
        let defs = definitions();

        manager.create_schema(&defs).unwrap();

        assert_eq!(manager.check_status(&defs).unwrap(), SchemaStatus::Current);
        assert!(db.table_exists("Order").unwrap());
        assert!(db.table_exists("CustomWarehouse").unwrap());
        assert!(db.index_exists("UX_Order_UniqueId").unwrap());
        assert!(db.index_exists("IX_Order_CustomerName").unwrap());

        // idempotent
        manager.create_schema(&defs).unwrap();
    }

    #[test]
    fn test_incomplete_schema() {
        let db = DatabaseConn::open_in_memory().unwrap();
        let manager = SchemaManager::new(&db);
        let defs = definitions();

        manager.create_schema(&defs[..1]).unwrap();

        assert_eq!(
            manager.check_status(&defs).unwrap(),
            SchemaStatus::Incomplete {
                missing: vec!["CustomWarehouse".to_string()]
            }
        );
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let db = DatabaseConn::open_in_memory().unwrap();
        let manager = SchemaManager::new(&db);
        let mut broken = TableDefinition::build(&warehouse_descriptor()).unwrap();
        broken.table_definition.push_str("CREATE NONSENSE;");

        let defs = vec![TableDefinition::build(&order_descriptor()).unwrap(), broken];
        assert!(manager.create_schema(&defs).is_err());
        assert!(!db.table_exists("Order").unwrap());
    }

    #[test]
    fn test_vacuum() {
        let db = DatabaseConn::open_in_memory().unwrap();
        let manager = SchemaManager::new(&db);
        manager.create_schema(&definitions()).unwrap();
        assert!(manager.vacuum().is_ok());
    }
}
