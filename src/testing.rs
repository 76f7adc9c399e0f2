//! Shared fixtures for unit tests

use crate::context::{Context, DbSchema, SetRegistry};
use crate::database::{ConnectionHandle, DatabaseConn, Params, SchemaManager};
use crate::entity::{Entity, UNSET_ROW_ID};
use crate::entity_set::EntitySet;
use crate::error::Result;
use crate::mapping::{Field, SemanticType, TypeDescriptor};

pub const CUSTOMERS: [(&str, &str); 3] = [
    ("John", "Leon"),
    ("Peter", "Boston"),
    ("Margarita", "Guadalajara"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ComplexDetail {
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    pub row_id: i64,
    pub unique_id: Option<String>,
    pub customer_name: Option<String>,
    pub shipper_city: Option<String>,
    pub is_shipped: bool,
    pub amount: i32,
    pub shipped_date: Option<String>,
    pub complex_detail: Option<ComplexDetail>,
}

impl Order {
    pub fn new(customer: &str, city: &str) -> Self {
        Self {
            customer_name: Some(customer.to_string()),
            shipper_city: Some(city.to_string()),
            ..Default::default()
        }
    }
}

pub fn order_descriptor() -> TypeDescriptor {
    TypeDescriptor::new("Order")
        .field(Field::of::<String>("UniqueId").unique())
        .field(Field::of::<String>("CustomerName").indexed())
        .field(Field::of::<String>("ShipperCity").max_length(30))
        .field(Field::of::<bool>("IsShipped"))
        .field(Field::of::<i32>("Amount"))
        .field(Field::of::<String>("ShippedDate"))
        .field(Field::new("ComplexDetail", SemanticType::Reference))
}

impl Entity for Order {
    fn descriptor() -> TypeDescriptor {
        order_descriptor()
    }

    fn row_id(&self) -> i64 {
        self.row_id
    }

    fn set_row_id(&mut self, row_id: i64) {
        self.row_id = row_id;
    }

    fn to_params(&self) -> Params {
        Params::new()
            .with("UniqueId", self.unique_id.clone())
            .with("CustomerName", self.customer_name.clone())
            .with("ShipperCity", self.shipper_city.clone())
            .with("IsShipped", self.is_shipped)
            .with("Amount", self.amount)
            .with("ShippedDate", self.shipped_date.clone())
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Order {
            row_id: row.get("RowId")?,
            unique_id: row.get("UniqueId")?,
            customer_name: row.get("CustomerName")?,
            shipper_city: row.get("ShipperCity")?,
            is_shipped: row.get("IsShipped")?,
            amount: row.get("Amount")?,
            shipped_date: row.get("ShippedDate")?,
            complex_detail: None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Warehouse {
    pub row_id: i64,
    pub unique_id: Option<String>,
    pub name: Option<String>,
    pub byte_property: Vec<u8>,
    pub description: String,
}

pub fn warehouse_descriptor() -> TypeDescriptor {
    TypeDescriptor::new("Warehouse")
        .table("CustomWarehouse")
        .field(Field::of::<String>("UniqueId").unique())
        .field(Field::of::<String>("Name"))
        .field(Field::of::<Vec<u8>>("ByteProperty"))
        .field(Field::of::<String>("Description").not_mapped())
}

impl Entity for Warehouse {
    fn descriptor() -> TypeDescriptor {
        warehouse_descriptor()
    }

    fn row_id(&self) -> i64 {
        self.row_id
    }

    fn set_row_id(&mut self, row_id: i64) {
        self.row_id = row_id;
    }

    fn to_params(&self) -> Params {
        Params::new()
            .with("UniqueId", self.unique_id.clone())
            .with("Name", self.name.clone())
            .with("ByteProperty", self.byte_property.clone())
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Warehouse {
            row_id: row.get("RowId")?,
            unique_id: row.get("UniqueId")?,
            name: row.get("Name")?,
            byte_property: row.get("ByteProperty")?,
            description: String::new(),
        })
    }
}

/// Twelve unsaved orders: the three customers repeated four times.
pub fn order_source() -> Vec<Order> {
    (0..12)
        .map(|i| {
            let (customer, city) = CUSTOMERS[i % CUSTOMERS.len()];
            Order {
                row_id: UNSET_ROW_ID,
                is_shipped: i % 2 == 0,
                amount: i as i32 + 1,
                ..Order::new(customer, city)
            }
        })
        .collect()
}

pub struct ShopSchema {
    pub orders: EntitySet<Order>,
    pub warehouses: EntitySet<Warehouse>,
}

impl DbSchema for ShopSchema {
    fn declare(registry: &mut SetRegistry) -> Result<Self> {
        Ok(ShopSchema {
            orders: registry.set("Orders")?,
            warehouses: registry.set("Warehouses")?,
        })
    }
}

pub fn shop_context() -> Context<ShopSchema> {
    Context::builder().in_memory().open().unwrap()
}

/// A standalone order set over a fresh in-memory store.
pub fn order_set() -> EntitySet<Order> {
    let handle = ConnectionHandle::new(DatabaseConn::open_in_memory().unwrap());
    let definition = Order::definition().unwrap();
    handle
        .with(|db| SchemaManager::new(db).create_schema([definition.as_ref()]))
        .unwrap();
    EntitySet::new(handle).unwrap()
}

/// Insert the order source and return the stored orders.
pub fn seeded_orders(set: &EntitySet<Order>) -> Vec<Order> {
    let mut orders = order_source();
    for order in orders.iter_mut() {
        set.insert(order).unwrap();
    }
    orders
}
