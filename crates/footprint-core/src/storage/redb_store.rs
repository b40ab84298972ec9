//! # redb-backed Store
//!
//! A `Datastore` on the redb embedded database, providing:
//! - ACID flushes (one write transaction per flush)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! ## Layout
//!
//! - `rows`: `(entity, key)` -> postcard `Row { fields, links }`
//! - `sequences`: `entity` -> last assigned key
//!
//! `links` holds the foreign keys of `toOne` relations. `toMany` relations
//! are not stored; they are the rows of the target whose `mapped_by` link
//! points back at the owner.

use crate::criteria::{Filter, filter_matches};
use crate::manager::{Datastore, Manager, Query};
use crate::options::{Options, Populate};
use crate::schema::{Cardinality, EntityType, Relation, Schema};
use crate::{FootprintError, Key, NotFound, Record, Related, Result, Value};
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Table for rows: (entity name, key) -> serialized Row bytes
const ROWS: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("rows");

/// Table for key sequences: entity name -> last assigned key
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Stored form of a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Row {
    fields: BTreeMap<String, Value>,
    links: BTreeMap<String, Key>,
}

fn storage_error(e: impl std::fmt::Display) -> FootprintError {
    FootprintError::Persistence(e.to_string())
}

fn encode(row: &Row) -> Result<Vec<u8>> {
    postcard::to_allocvec(row).map_err(storage_error)
}

fn decode(bytes: &[u8]) -> Result<Row> {
    postcard::from_bytes(bytes).map_err(storage_error)
}

fn read_row<T>(table: &T, entity: &str, key: Key) -> Result<Option<Row>>
where
    T: ReadableTable<(&'static str, u64), &'static [u8]>,
{
    match table.get((entity, key.0)).map_err(storage_error)? {
        Some(bytes) => decode(bytes.value()).map(Some),
        None => Ok(None),
    }
}

/// All rows of one entity type, in key order.
fn scan_rows<T>(table: &T, entity: &str) -> Result<Vec<(Key, Row)>>
where
    T: ReadableTable<(&'static str, u64), &'static [u8]>,
{
    let mut rows = Vec::new();
    for entry in table
        .range((entity, 0u64)..=(entity, u64::MAX))
        .map_err(storage_error)?
    {
        let (key, value) = entry.map_err(storage_error)?;
        let (_, id) = key.value();
        rows.push((Key(id), decode(value.value())?));
    }
    Ok(rows)
}

fn row_matches(entity: &EntityType, key: Key, row: &Row, filter: &Filter) -> Result<bool> {
    filter_matches(
        filter,
        entity,
        Some(key),
        |name| row.fields.get(name),
        |name| row.links.get(name).copied(),
    )
}

fn page<T>(items: Vec<T>, offset: Option<usize>, limit: Option<usize>) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.unwrap_or(0))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

// =============================================================================
// STORE
// =============================================================================

/// A redb database plus the mapping registry it stores.
///
/// Cloning is cheap; clones share the database handle.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    schema: Arc<Schema>,
    /// Last assigned key per entity, shared by every manager of this store.
    sequences: Arc<Mutex<BTreeMap<String, u64>>>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("entities", &self.schema.entities().count())
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        let db = Database::create(path.as_ref()).map_err(storage_error)?;
        Self::with_database(db, schema)
    }

    /// Create a volatile store. Used by tests and benchmarks.
    pub fn in_memory(schema: Schema) -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(storage_error)?;
        Self::with_database(db, schema)
    }

    fn with_database(db: Database, schema: Schema) -> Result<Self> {
        schema.validate()?;

        // Initialize tables if they don't exist
        let write_txn = db.begin_write().map_err(storage_error)?;
        {
            let _ = write_txn.open_table(ROWS).map_err(storage_error)?;
            let _ = write_txn.open_table(SEQUENCES).map_err(storage_error)?;
        }
        write_txn.commit().map_err(storage_error)?;

        Ok(Self {
            db: Arc::new(db),
            schema: Arc::new(schema),
            sequences: Arc::new(Mutex::new(BTreeMap::new())),
        })
    }

    /// Number of stored rows of `entity`.
    pub fn count(&self, entity: &str) -> Result<usize> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(ROWS).map_err(storage_error)?;
        Ok(scan_rows(&table, entity)?.len())
    }
}

impl Datastore for RedbStore {
    type Manager = RedbManager;

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn manager(&self) -> RedbManager {
        RedbManager {
            db: Arc::clone(&self.db),
            schema: Arc::clone(&self.schema),
            sequences: Arc::clone(&self.sequences),
            staged: Vec::new(),
            allocated: BTreeMap::new(),
        }
    }
}

// =============================================================================
// MANAGER
// =============================================================================

/// A change waiting for the next flush.
#[derive(Debug)]
enum Staged {
    /// Merge fields and `toOne` links into the row, creating it if needed.
    /// A `None` link clears the foreign key.
    Upsert {
        entity: String,
        key: Key,
        fields: BTreeMap<String, Value>,
        links: BTreeMap<String, Option<Key>>,
    },
    /// Point the `attribute` foreign key of an existing row at `owner`.
    Link {
        entity: String,
        key: Key,
        attribute: String,
        owner: Key,
    },
    Remove {
        entity: String,
        key: Key,
    },
    /// The row must exist once every other change is applied.
    Require {
        entity: String,
        key: Key,
    },
}

/// Unit of work over a `RedbStore`.
pub struct RedbManager {
    db: Arc<Database>,
    schema: Arc<Schema>,
    sequences: Arc<Mutex<BTreeMap<String, u64>>>,
    staged: Vec<Staged>,
    /// Highest key handed out per entity by this manager.
    allocated: BTreeMap<String, u64>,
}

impl std::fmt::Debug for RedbManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbManager")
            .field("staged", &self.staged.len())
            .finish_non_exhaustive()
    }
}

impl RedbManager {
    fn entity(&self, name: &str) -> Result<&EntityType> {
        self.schema
            .entity(name)
            .ok_or_else(|| NotFound::Entity(name.to_string()).into())
    }

    fn next_key(&mut self, entity: &str) -> Result<Key> {
        let mut sequences = self
            .sequences
            .lock()
            .map_err(|_| FootprintError::Persistence("Key sequence lock poisoned".to_string()))?;

        let current = match sequences.get(entity) {
            Some(&last) => last,
            None => {
                let read_txn = self.db.begin_read().map_err(storage_error)?;
                let table = read_txn.open_table(SEQUENCES).map_err(storage_error)?;
                table
                    .get(entity)
                    .map_err(storage_error)?
                    .map(|v| v.value())
                    .unwrap_or(0)
            }
        };

        let next = current.saturating_add(1);
        sequences.insert(entity.to_string(), next);
        self.allocated.insert(entity.to_string(), next);
        Ok(Key(next))
    }

    /// Load one relation of the row `owner_key`, keeping only records that
    /// match `filter`. Loaded records carry leaf fields only.
    fn load_related<T>(
        &self,
        table: &T,
        relation: &Relation,
        owner_key: Key,
        links: &BTreeMap<String, Key>,
        filter: &Filter,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Related>
    where
        T: ReadableTable<(&'static str, u64), &'static [u8]>,
    {
        let target = self.entity(&relation.target)?;

        match relation.cardinality {
            Cardinality::ToOne => {
                let Some(&key) = links.get(&relation.name) else {
                    return Ok(Related::One(None));
                };
                // A link to a removed row loads as empty.
                let child = match read_row(table, target.name(), key)? {
                    Some(row) if row_matches(target, key, &row, filter)? => Some(Box::new(
                        Record::managed(target.name(), key, row.fields),
                    )),
                    _ => None,
                };
                Ok(Related::One(child))
            }
            Cardinality::ToMany => {
                let mapped_by = relation.mapped_by.as_deref().ok_or_else(|| {
                    FootprintError::Persistence(format!(
                        "Relation '{}' has no mapped_by",
                        relation.name
                    ))
                })?;

                let mut children = Vec::new();
                for (key, row) in scan_rows(table, target.name())? {
                    if row.links.get(mapped_by) == Some(&owner_key)
                        && row_matches(target, key, &row, filter)?
                    {
                        children.push(Record::managed(target.name(), key, row.fields));
                    }
                }
                Ok(Related::Many(page(children, offset, limit)))
            }
        }
    }

    fn hydrate<T>(
        &self,
        table: &T,
        entity: &EntityType,
        key: Key,
        row: Row,
        populate: &Populate,
    ) -> Result<Record>
    where
        T: ReadableTable<(&'static str, u64), &'static [u8]>,
    {
        let Row { fields, links } = row;
        let mut record = Record::managed(entity.name(), key, fields);

        for relation in entity.relations() {
            if populate.includes(&relation.name) {
                let related =
                    self.load_related(table, relation, key, &links, &Filter::new(), None, None)?;
                record.set_related(&relation.name, related);
            }
        }
        Ok(record)
    }

    /// Stage `record` and its loaded relations. Returns the record's key.
    fn stage(&mut self, record: &mut Record) -> Result<Key> {
        if record.is_reference() {
            let key = record.key().ok_or_else(|| {
                FootprintError::Persistence(format!(
                    "Reference to '{}' has no key",
                    record.entity()
                ))
            })?;
            self.staged.push(Staged::Require {
                entity: record.entity().to_string(),
                key,
            });
            return Ok(key);
        }

        let schema = Arc::clone(&self.schema);
        let entity = schema
            .entity(record.entity())
            .ok_or_else(|| NotFound::Entity(record.entity().to_string()))?;
        let key = match record.key() {
            Some(key) => key,
            None => self.next_key(entity.name())?,
        };
        record.mark_managed(key);

        let mut links = BTreeMap::new();
        let mut members = Vec::new();
        for (attribute, related) in record.relations_mut() {
            let relation = entity
                .relation(attribute)
                .ok_or_else(|| NotFound::Association {
                    entity: entity.name().to_string(),
                    attribute: attribute.clone(),
                })?;

            match (relation.cardinality, related) {
                (Cardinality::ToOne, Related::One(child)) => {
                    let linked = match child {
                        Some(child) => Some(self.stage(child)?),
                        None => None,
                    };
                    links.insert(attribute.clone(), linked);
                }
                (Cardinality::ToMany, Related::Many(children)) => {
                    let mapped_by = relation.mapped_by.clone().ok_or_else(|| {
                        FootprintError::Persistence(format!(
                            "Relation '{}.{}' has no mapped_by",
                            entity.name(),
                            attribute
                        ))
                    })?;
                    for child in children.iter_mut() {
                        let child_key = self.stage(child)?;
                        members.push(Staged::Link {
                            entity: relation.target.clone(),
                            key: child_key,
                            attribute: mapped_by.clone(),
                            owner: key,
                        });
                    }
                }
                _ => {
                    return Err(FootprintError::Validation(format!(
                        "Relation '{}.{}' holds the wrong cardinality",
                        entity.name(),
                        attribute
                    )));
                }
            }
        }

        self.staged.push(Staged::Upsert {
            entity: entity.name().to_string(),
            key,
            fields: record.fields().clone(),
            links,
        });
        self.staged.extend(members);
        Ok(key)
    }
}

impl Manager for RedbManager {
    async fn find_one(
        &self,
        entity: &EntityType,
        key: Key,
        options: &Options,
    ) -> Result<Option<Record>> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(ROWS).map_err(storage_error)?;

        match read_row(&table, entity.name(), key)? {
            Some(row) => self
                .hydrate(&table, entity, key, row, &options.populate)
                .map(Some),
            None => Ok(None),
        }
    }

    async fn find_many(
        &self,
        entity: &EntityType,
        filter: &Filter,
        options: &Options,
    ) -> Result<Vec<Record>> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(ROWS).map_err(storage_error)?;

        let mut matched = Vec::new();
        for (key, row) in scan_rows(&table, entity.name())? {
            if row_matches(entity, key, &row, filter)? {
                matched.push((key, row));
            }
        }

        page(matched, options.offset, options.limit)
            .into_iter()
            .map(|(key, row)| self.hydrate(&table, entity, key, row, &options.populate))
            .collect()
    }

    async fn get_result(&self, query: &Query) -> Result<Vec<Record>> {
        let entity = self.entity(&query.entity)?;
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(ROWS).map_err(storage_error)?;

        let mut roots = Vec::new();
        for (key, mut row) in scan_rows(&table, entity.name())? {
            if row_matches(entity, key, &row, &query.filter)? {
                if let Some(select) = &query.select {
                    row.fields.retain(|name, _| select.contains(name));
                }
                roots.push((key, row));
            }
        }

        let Some(join) = &query.join else {
            return page(roots, query.offset, query.limit)
                .into_iter()
                .map(|(key, row)| self.hydrate(&table, entity, key, row, &Populate::None))
                .collect();
        };

        let relation = entity
            .relation(&join.attribute)
            .ok_or_else(|| NotFound::Association {
                entity: entity.name().to_string(),
                attribute: join.attribute.clone(),
            })?;

        roots
            .into_iter()
            .map(|(key, row)| {
                let related = self.load_related(
                    &table,
                    relation,
                    key,
                    &row.links,
                    &join.filter,
                    query.offset,
                    query.limit,
                )?;
                let mut record = Record::managed(entity.name(), key, row.fields);
                record.set_related(&relation.name, related);
                Ok(record)
            })
            .collect()
    }

    fn persist(&mut self, record: &mut Record) -> Result<()> {
        self.stage(record).map(|_| ())
    }

    fn remove(&mut self, record: &Record) -> Result<()> {
        let key = record.key().ok_or_else(|| {
            FootprintError::Persistence(format!(
                "Cannot remove an unsaved '{}'",
                record.entity()
            ))
        })?;
        self.staged.push(Staged::Remove {
            entity: record.entity().to_string(),
            key,
        });
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        let allocated = std::mem::take(&mut self.allocated);
        if staged.is_empty() && allocated.is_empty() {
            return Ok(());
        }
        let change_count = staged.len();

        // Dropping the transaction on any error below aborts every change.
        let write_txn = self.db.begin_write().map_err(storage_error)?;
        {
            let mut rows = write_txn.open_table(ROWS).map_err(storage_error)?;
            let mut required = Vec::new();

            for change in staged {
                match change {
                    Staged::Upsert {
                        entity,
                        key,
                        fields,
                        links,
                    } => {
                        let mut row = read_row(&rows, &entity, key)?.unwrap_or_default();
                        row.fields.extend(fields);
                        for (attribute, linked) in links {
                            match linked {
                                Some(target) => {
                                    row.links.insert(attribute, target);
                                }
                                None => {
                                    row.links.remove(&attribute);
                                }
                            }
                        }
                        rows.insert((entity.as_str(), key.0), encode(&row)?.as_slice())
                            .map_err(storage_error)?;
                    }
                    Staged::Link {
                        entity,
                        key,
                        attribute,
                        owner,
                    } => {
                        let Some(mut row) = read_row(&rows, &entity, key)? else {
                            return Err(FootprintError::Persistence(format!(
                                "Cannot link missing '{entity}' #{key}"
                            )));
                        };
                        row.links.insert(attribute, owner);
                        rows.insert((entity.as_str(), key.0), encode(&row)?.as_slice())
                            .map_err(storage_error)?;
                    }
                    Staged::Remove { entity, key } => {
                        rows.remove((entity.as_str(), key.0))
                            .map_err(storage_error)?;
                    }
                    Staged::Require { entity, key } => required.push((entity, key)),
                }
            }

            for (entity, key) in required {
                if read_row(&rows, &entity, key)?.is_none() {
                    return Err(FootprintError::Persistence(format!(
                        "Referenced '{entity}' #{key} does not exist"
                    )));
                }
            }

            let mut sequences = write_txn.open_table(SEQUENCES).map_err(storage_error)?;
            for (entity, next) in allocated {
                let stored = sequences
                    .get(entity.as_str())
                    .map_err(storage_error)?
                    .map(|v| v.value())
                    .unwrap_or(0);
                if next > stored {
                    sequences
                        .insert(entity.as_str(), next)
                        .map_err(storage_error)?;
                }
            }
        }
        write_txn.commit().map_err(storage_error)?;

        tracing::debug!(changes = change_count, "flushed staged changes");
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::QueryBuilder;
    use crate::schema::FieldDef;
    use tempfile::tempdir;

    fn schema() -> Schema {
        Schema::from_entities([
            EntityType::new("User").with_field(FieldDef::text("name")),
            EntityType::new("List")
                .with_field(FieldDef::text("name"))
                .with_relation(Relation::to_many("todos", "Todo", "list")),
            EntityType::new("Todo")
                .with_field(FieldDef::text("task"))
                .with_field(FieldDef::boolean("done").optional())
                .with_relation(Relation::to_one("list", "List"))
                .with_relation(Relation::to_one("creator", "User")),
        ])
        .expect("schema")
    }

    fn user(name: &str) -> Record {
        let mut record = Record::new("User");
        record.set("name", Value::text(name));
        record
    }

    fn todo(task: &str, done: bool) -> Record {
        let mut record = Record::new("Todo");
        record.set("task", Value::text(task));
        record.set("done", Value::Bool(done));
        record
    }

    #[tokio::test]
    async fn persist_assigns_sequential_keys() {
        let store = RedbStore::in_memory(schema()).expect("store");
        let mut manager = store.manager();

        let mut first = user("Raphaela");
        let mut second = user("Isaac");
        manager.persist(&mut first).expect("persist");
        manager.persist(&mut second).expect("persist");
        manager.flush().await.expect("flush");

        assert_eq!(first.key(), Some(Key(1)));
        assert_eq!(second.key(), Some(Key(2)));
        assert_eq!(store.count("User").expect("count"), 2);
    }

    #[tokio::test]
    async fn nothing_lands_before_flush() {
        let store = RedbStore::in_memory(schema()).expect("store");
        let mut manager = store.manager();

        manager.persist(&mut user("Frank")).expect("persist");
        assert_eq!(store.count("User").expect("count"), 0);

        manager.flush().await.expect("flush");
        assert_eq!(store.count("User").expect("count"), 1);
    }

    #[tokio::test]
    async fn collection_members_link_back_to_owner() {
        let store = RedbStore::in_memory(schema()).expect("store");
        let mut manager = store.manager();

        let mut list = Record::new("List");
        list.set("name", Value::text("Chores"));
        list.push_many("todos", todo("Write tests", false));
        list.push_many("todos", todo("Buy cheese", true));
        manager.persist(&mut list).expect("persist");
        manager.flush().await.expect("flush");

        let list_type = store.schema().entity("List").expect("list");
        let options = Options::new().with_populate(Populate::Attribute("todos".into()));
        let loaded = store
            .manager()
            .find_one(list_type, Key(1), &options)
            .await
            .expect("find")
            .expect("list");

        let tasks: Vec<_> = loaded
            .many("todos")
            .iter()
            .filter_map(|t| t.get("task").cloned())
            .collect();
        assert_eq!(
            tasks,
            vec![Value::text("Write tests"), Value::text("Buy cheese")]
        );
    }

    #[tokio::test]
    async fn dangling_reference_aborts_whole_flush() {
        let store = RedbStore::in_memory(schema()).expect("store");
        let mut manager = store.manager();

        let mut orphan = todo("Fight robot", false);
        orphan.set_related(
            "creator",
            Related::One(Some(Box::new(Record::reference("User", Key(42))))),
        );
        manager.persist(&mut user("Ignored")).expect("persist");
        manager.persist(&mut orphan).expect("persist");

        let result = manager.flush().await;
        assert!(matches!(result, Err(FootprintError::Persistence(_))));
        assert_eq!(store.count("User").expect("count"), 0);
        assert_eq!(store.count("Todo").expect("count"), 0);
    }

    #[tokio::test]
    async fn find_many_filters_and_pages_in_key_order() {
        let store = RedbStore::in_memory(schema()).expect("store");
        let mut manager = store.manager();
        for (task, done) in [("a", false), ("b", true), ("c", false), ("d", false)] {
            manager.persist(&mut todo(task, done)).expect("persist");
        }
        manager.flush().await.expect("flush");

        let todo_type = store.schema().entity("Todo").expect("todo");
        let mut filter = Filter::new();
        filter.insert("done".into(), Value::Bool(false));

        let page = store
            .manager()
            .find_many(
                todo_type,
                &filter,
                &Options::new().with_offset(1).with_limit(1),
            )
            .await
            .expect("find");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].get("task"), Some(&Value::text("c")));
    }

    #[tokio::test]
    async fn select_projects_root_fields() {
        let store = RedbStore::in_memory(schema()).expect("store");
        let mut manager = store.manager();
        manager.persist(&mut todo("Write tests", true)).expect("persist");
        manager.flush().await.expect("flush");

        let query = QueryBuilder::new("Todo", "t").select(["task"]).build();
        let rows = store.manager().get_result(&query).await.expect("query");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key(), Some(Key(1)));
        assert_eq!(rows[0].get("task"), Some(&Value::text("Write tests")));
        assert_eq!(rows[0].get("done"), None);
    }

    #[tokio::test]
    async fn removed_link_target_loads_as_empty() {
        let store = RedbStore::in_memory(schema()).expect("store");
        let mut manager = store.manager();

        let mut item = todo("Save the galaxy", false);
        item.set_related("creator", Related::One(Some(Box::new(user("Isaac")))));
        manager.persist(&mut item).expect("persist");
        manager.flush().await.expect("flush");

        let creator = item.one("creator").expect("creator").clone();
        let mut manager = store.manager();
        manager.remove(&creator).expect("remove");
        manager.flush().await.expect("flush");

        let todo_type = store.schema().entity("Todo").expect("todo");
        let loaded = store
            .manager()
            .find_one(todo_type, Key(1), &Options::new().with_populate(Populate::All))
            .await
            .expect("find")
            .expect("todo");
        assert_eq!(loaded.related("creator"), Some(&Related::One(None)));
    }

    #[tokio::test]
    async fn sequences_survive_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("footprint.redb");

        {
            let store = RedbStore::open(&path, schema()).expect("open");
            let mut manager = store.manager();
            manager.persist(&mut user("Raphaela")).expect("persist");
            manager.flush().await.expect("flush");
        }

        let store = RedbStore::open(&path, schema()).expect("reopen");
        let mut manager = store.manager();
        let mut next = user("Frank");
        manager.persist(&mut next).expect("persist");
        manager.flush().await.expect("flush");

        assert_eq!(next.key(), Some(Key(2)));
        assert_eq!(store.count("User").expect("count"), 2);
    }
}
