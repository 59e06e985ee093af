use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

mod parse;

use crate::frame::Frame;
use crate::service::InventoryService;
use crate::store::StoreError;
use parse::Parse;

pub(crate) const DISPATCH_TARGET: &str = "home_inventory::dispatch";

pub const NEW_INVENTORY: &str = "new_inventory";
pub const LIST_INVENTORY: &str = "list_inventory";
pub const LIST_INVENTORY_ITEMS: &str = "list_inventory_items";
pub const ADD_INVENTORY_ITEMS: &str = "add_inventory_items";

/// Request envelope as sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub requested_func: String,
    /// Absent and `null` both read as no options.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub options: Map<String, Value>,
}

/// Response envelope written back for every decoded request.
///
/// `result` starts out as an empty string and `success` as false; only a
/// recognised operation whose store call succeeded overwrites them. `error`
/// is present only when the store call failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub requested_func: String,
    #[serde(default = "empty_result")]
    pub result: Value,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("missing option `{0}`")]
    MissingOption(&'static str),

    #[error("option `{key}` must be {expected}")]
    InvalidOption {
        key: &'static str,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NewInventory(NewInventory),
    ListInventory(ListInventory),
    ListInventoryItems(ListInventoryItems),
    AddInventoryItems(AddInventoryItems),
    Unknown(Unknown),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInventory {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListInventory;

#[derive(Debug, Clone, PartialEq)]
pub struct ListInventoryItems {
    pub inventory_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddInventoryItems {
    pub inventory_id: i64,
    pub name: String,
    pub count: i64,
}

/// An operation this server does not implement. It is still answered.
#[derive(Debug, Clone, PartialEq)]
pub struct Unknown {
    pub requested_func: String,
}

fn empty_result() -> Value {
    Value::String(String::new())
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Request {
    pub fn new(requested_func: impl ToString, options: Map<String, Value>) -> Request {
        Request {
            requested_func: requested_func.to_string(),
            options,
        }
    }
}

impl Response {
    /// The envelope as initialised before dispatch: empty result, no success.
    pub fn new(requested_func: impl ToString) -> Response {
        Response {
            requested_func: requested_func.to_string(),
            result: empty_result(),
            success: false,
            error: None,
        }
    }

    fn from_outcome<T: Serialize>(requested_func: &str, outcome: Result<T, StoreError>) -> Response {
        let mut response = Response::new(requested_func);

        let value = outcome
            .map_err(|err| err.to_string())
            .and_then(|result| serde_json::to_value(result).map_err(|err| err.to_string()));

        match value {
            Ok(result) => {
                response.result = result;
                response.success = true;
            }
            Err(message) => response.error = Some(message),
        }

        response
    }
}

impl Command {
    pub fn from_frame(frame: &Frame) -> Result<Command, ProtocolError> {
        let request: Request = frame.decode().map_err(ProtocolError::Malformed)?;

        Command::from_request(request)
    }

    pub fn from_request(request: Request) -> Result<Command, ProtocolError> {
        let mut parse = Parse::new(request.options);

        let command = match request.requested_func.as_str() {
            NEW_INVENTORY => Command::NewInventory(NewInventory::parse_options(&mut parse)?),
            LIST_INVENTORY => Command::ListInventory(ListInventory),
            LIST_INVENTORY_ITEMS => {
                Command::ListInventoryItems(ListInventoryItems::parse_options(&mut parse)?)
            }
            ADD_INVENTORY_ITEMS => {
                Command::AddInventoryItems(AddInventoryItems::parse_options(&mut parse)?)
            }
            _ => Command::Unknown(Unknown {
                requested_func: request.requested_func,
            }),
        };

        Ok(command)
    }

    pub fn name(&self) -> &str {
        match self {
            Command::NewInventory(_) => NEW_INVENTORY,
            Command::ListInventory(_) => LIST_INVENTORY,
            Command::ListInventoryItems(_) => LIST_INVENTORY_ITEMS,
            Command::AddInventoryItems(_) => ADD_INVENTORY_ITEMS,
            Command::Unknown(cmd) => cmd.requested_func.as_str(),
        }
    }

    pub async fn apply(self, service: &InventoryService) -> Response {
        debug!(target: DISPATCH_TARGET, operation = self.name(), "dispatching request");

        match self {
            Command::NewInventory(cmd) => cmd.apply(service).await,
            Command::ListInventory(cmd) => cmd.apply(service).await,
            Command::ListInventoryItems(cmd) => cmd.apply(service).await,
            Command::AddInventoryItems(cmd) => cmd.apply(service).await,
            Command::Unknown(cmd) => cmd.apply(),
        }
    }

    pub fn into_request(self) -> Request {
        match self {
            Command::NewInventory(cmd) => cmd.into_request(),
            Command::ListInventory(cmd) => cmd.into_request(),
            Command::ListInventoryItems(cmd) => cmd.into_request(),
            Command::AddInventoryItems(cmd) => cmd.into_request(),
            Command::Unknown(cmd) => Request::new(cmd.requested_func, Map::new()),
        }
    }
}

impl NewInventory {
    pub fn new(name: impl ToString, description: impl ToString) -> NewInventory {
        NewInventory {
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    pub fn into_request(self) -> Request {
        let mut options = Map::new();

        options.insert("inventory_name".into(), self.name.into());
        options.insert("inventory_description".into(), self.description.into());

        Request::new(NEW_INVENTORY, options)
    }

    pub(crate) fn parse_options(parse: &mut Parse) -> Result<NewInventory, ProtocolError> {
        let name = parse.string("inventory_name")?;
        let description = parse.string("inventory_description")?;

        Ok(NewInventory { name, description })
    }

    pub async fn apply(self, service: &InventoryService) -> Response {
        let outcome = service.create_inventory(&self.name, &self.description).await;

        Response::from_outcome(NEW_INVENTORY, outcome)
    }
}

impl ListInventory {
    pub fn new() -> ListInventory {
        ListInventory
    }

    pub fn into_request(self) -> Request {
        Request::new(LIST_INVENTORY, Map::new())
    }

    pub async fn apply(self, service: &InventoryService) -> Response {
        Response::from_outcome(LIST_INVENTORY, service.list_inventories().await)
    }
}

impl ListInventoryItems {
    pub fn new(inventory_id: i64) -> ListInventoryItems {
        ListInventoryItems { inventory_id }
    }

    pub fn into_request(self) -> Request {
        let mut options = Map::new();

        options.insert("inventory_id".into(), self.inventory_id.into());

        Request::new(LIST_INVENTORY_ITEMS, options)
    }

    pub(crate) fn parse_options(parse: &mut Parse) -> Result<ListInventoryItems, ProtocolError> {
        let inventory_id = parse.integer("inventory_id")?;

        Ok(ListInventoryItems { inventory_id })
    }

    pub async fn apply(self, service: &InventoryService) -> Response {
        let outcome = service.list_items(self.inventory_id).await;

        Response::from_outcome(LIST_INVENTORY_ITEMS, outcome)
    }
}

impl AddInventoryItems {
    pub fn new(inventory_id: i64, name: impl ToString, count: i64) -> AddInventoryItems {
        AddInventoryItems {
            inventory_id,
            name: name.to_string(),
            count,
        }
    }

    pub fn into_request(self) -> Request {
        let mut options = Map::new();

        options.insert("inventory_id".into(), self.inventory_id.into());
        options.insert("item_name".into(), self.name.into());
        options.insert("item_count".into(), self.count.into());

        Request::new(ADD_INVENTORY_ITEMS, options)
    }

    pub(crate) fn parse_options(parse: &mut Parse) -> Result<AddInventoryItems, ProtocolError> {
        let inventory_id = parse.integer("inventory_id")?;
        let name = parse.string("item_name")?;
        let count = parse.integer("item_count")?;

        Ok(AddInventoryItems {
            inventory_id,
            name,
            count,
        })
    }

    pub async fn apply(self, service: &InventoryService) -> Response {
        let outcome = service
            .add_item(self.inventory_id, &self.name, self.count)
            .await;

        Response::from_outcome(ADD_INVENTORY_ITEMS, outcome)
    }
}

impl Unknown {
    pub fn apply(self) -> Response {
        debug!(
            target: DISPATCH_TARGET,
            operation = %self.requested_func,
            "unknown operation"
        );

        Response::new(self.requested_func)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::store::{Inventory, InventoryStore, Item, SqliteStore};

    struct BrokenStore;

    #[async_trait]
    impl InventoryStore for BrokenStore {
        async fn list_inventories(&self) -> Result<Vec<Inventory>, StoreError> {
            Err(StoreError::Query(sqlx::Error::PoolClosed))
        }

        async fn create_inventory(&self, _: &str, _: &str, _: &str) -> Result<i64, StoreError> {
            Err(StoreError::Query(sqlx::Error::PoolClosed))
        }

        async fn list_items(&self, _: i64) -> Result<Vec<Item>, StoreError> {
            Err(StoreError::Query(sqlx::Error::PoolClosed))
        }

        async fn create_item(&self, _: i64, _: &str, _: i64) -> Result<i64, StoreError> {
            Err(StoreError::Query(sqlx::Error::PoolClosed))
        }
    }

    fn frame(value: Value) -> Frame {
        Frame::from_message(&value).unwrap()
    }

    async fn sqlite_service() -> InventoryService {
        InventoryService::new(Arc::new(SqliteStore::in_memory().await.unwrap()))
    }

    #[test]
    fn parses_every_known_operation() {
        let cases = [
            (
                json!({"requested_func": "new_inventory", "options": {"inventory_name": "Pantry", "inventory_description": "Food"}}),
                Command::NewInventory(NewInventory::new("Pantry", "Food")),
            ),
            (
                json!({"requested_func": "list_inventory", "options": {}}),
                Command::ListInventory(ListInventory),
            ),
            (
                json!({"requested_func": "list_inventory_items", "options": {"inventory_id": 3}}),
                Command::ListInventoryItems(ListInventoryItems::new(3)),
            ),
            (
                json!({"requested_func": "add_inventory_items", "options": {"inventory_id": 3, "item_name": "Rice", "item_count": 2}}),
                Command::AddInventoryItems(AddInventoryItems::new(3, "Rice", 2)),
            ),
        ];

        for (input, expected) in cases {
            assert_eq!(Command::from_frame(&frame(input)).unwrap(), expected);
        }
    }

    #[test]
    fn client_requests_parse_back_into_the_same_command() {
        let command = Command::AddInventoryItems(AddInventoryItems::new(1, "Flour", 4));
        let request = command.clone().into_request();

        assert_eq!(Command::from_request(request).unwrap(), command);
    }

    #[test]
    fn options_may_be_omitted_for_list_inventory() {
        let command = Command::from_frame(&frame(json!({"requested_func": "list_inventory"})));

        assert_eq!(command.unwrap(), Command::ListInventory(ListInventory));
    }

    #[test]
    fn null_options_read_as_empty() {
        let listed = Command::from_frame(&frame(
            json!({"requested_func": "list_inventory", "options": null}),
        ));
        assert_eq!(listed.unwrap(), Command::ListInventory(ListInventory));

        // Operations that need options still report what is missing.
        let created = Command::from_frame(&frame(
            json!({"requested_func": "new_inventory", "options": null}),
        ));
        assert!(matches!(
            created,
            Err(ProtocolError::MissingOption("inventory_name"))
        ));
    }

    #[test]
    fn missing_option_is_a_protocol_error() {
        let input = json!({"requested_func": "new_inventory", "options": {"inventory_name": "Pantry"}});

        assert!(matches!(
            Command::from_frame(&frame(input)),
            Err(ProtocolError::MissingOption("inventory_description"))
        ));
    }

    #[test]
    fn envelope_without_operation_is_malformed() {
        assert!(matches!(
            Command::from_frame(&frame(json!({"options": {}}))),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn unknown_operation_keeps_default_envelope() {
        let service = sqlite_service().await;
        let command = Command::from_frame(&frame(json!({"requested_func": "drop_tables", "options": {}})));

        let response = command.unwrap().apply(&service).await;

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"requested_func": "drop_tables", "result": "", "success": false})
        );
    }

    #[tokio::test]
    async fn new_inventory_then_list_matches_wire_example() {
        let service = sqlite_service().await;

        let created = Command::NewInventory(NewInventory::new("Pantry", "Kitchen pantry"))
            .apply(&service)
            .await;
        let listed = Command::ListInventory(ListInventory).apply(&service).await;

        assert_eq!(
            serde_json::to_string(&created).unwrap(),
            r#"{"requested_func":"new_inventory","result":1,"success":true}"#
        );
        assert_eq!(
            listed.result,
            json!([{"id": 1, "name": "Pantry", "description": "Kitchen pantry"}])
        );
    }

    #[tokio::test]
    async fn empty_inventory_lists_no_items() {
        let service = sqlite_service().await;
        let id = service.create_inventory("Shed", "").await.unwrap();

        let response = ListInventoryItems::new(id).apply(&service).await;

        assert!(response.success);
        assert_eq!(response.result, json!([]));
    }

    #[tokio::test]
    async fn store_failure_is_reported_not_swallowed() {
        let service = InventoryService::new(Arc::new(BrokenStore));

        let response = ListInventory::new().apply(&service).await;

        assert!(!response.success);
        assert_eq!(response.result, json!(""));
        assert!(response.error.is_some());
    }
}
