//! # CLI Command Implementations
//!
//! Each command maps onto one footprint operation and returns its result
//! as JSON. Printing is left to the caller.

use super::Commands;
use crate::CliError;
use crate::config::{Action, Actions, AppConfig};
use crate::render::{
    affected_to_json, found_to_json, parse_criteria, parse_id, parse_payload, record_to_json,
};
use footprint_core::{Footprint, RedbStore};
use serde_json::json;
use std::path::Path;

/// An opened store plus the switches that gate it.
#[derive(Debug)]
pub struct Context {
    pub footprint: Footprint<RedbStore>,
    pub actions: Actions,
}

impl Context {
    /// Load the configuration and open its store.
    pub fn open(config_path: &Path, database: Option<&Path>) -> Result<Self, CliError> {
        let config = AppConfig::load(config_path)?;
        Self::from_config(&config, database)
    }

    pub fn from_config(config: &AppConfig, database: Option<&Path>) -> Result<Self, CliError> {
        let path = config.database_path(database)?;
        let schema = config.schema()?;
        let store = RedbStore::open(&path, schema)?;

        tracing::info!(
            database = %path.display(),
            entities = config.entities.len(),
            "opened store"
        );

        Ok(Self {
            footprint: Footprint::new(store).with_config(config.footprint.clone()),
            actions: config.actions,
        })
    }
}

/// Run one command against an opened context.
pub async fn run(context: &Context, command: &Commands) -> Result<serde_json::Value, CliError> {
    let footprint = &context.footprint;
    let actions = &context.actions;
    let schema = footprint.schema();

    match command {
        Commands::Create {
            entity,
            payload,
            options,
        } => {
            actions.ensure(Action::Create)?;
            let record = footprint
                .create(entity, &parse_payload(payload)?, &options.to_options())
                .await?;
            Ok(record_to_json(schema, &record))
        }
        Commands::Find {
            entity,
            criteria,
            options,
        } => {
            actions.ensure(Action::Find)?;
            let found = footprint
                .find(entity, &parse_criteria(criteria)?, &options.to_options())
                .await?;
            Ok(found_to_json(schema, &found))
        }
        Commands::Update {
            entity,
            criteria,
            payload,
            options,
        } => {
            actions.ensure(Action::Update)?;
            let affected = footprint
                .update(
                    entity,
                    &parse_criteria(criteria)?,
                    &parse_payload(payload)?,
                    &options.to_options(),
                )
                .await?;
            Ok(affected_to_json(schema, &affected))
        }
        Commands::Destroy {
            entity,
            criteria,
            options,
        } => {
            actions.ensure(Action::Destroy)?;
            let affected = footprint
                .destroy(entity, &parse_criteria(criteria)?, &options.to_options())
                .await?;
            Ok(affected_to_json(schema, &affected))
        }
        Commands::CreateAssociation {
            parent,
            parent_id,
            attribute,
            payload,
            options,
        } => {
            actions.ensure(Action::CreateAssociation)?;
            let record = footprint
                .create_association(
                    parent,
                    &parse_id(parent_id)?,
                    attribute,
                    &parse_payload(payload)?,
                    &options.to_options(),
                )
                .await?;
            Ok(record_to_json(schema, &record))
        }
        Commands::FindAssociation {
            parent,
            parent_id,
            attribute,
            criteria,
            options,
        } => {
            actions.ensure(Action::FindAssociation)?;
            let record = footprint
                .find_association(
                    parent,
                    &parse_id(parent_id)?,
                    attribute,
                    &parse_criteria(criteria)?,
                    &options.to_options(),
                )
                .await?;
            Ok(record.map_or(serde_json::Value::Null, |r| record_to_json(schema, &r)))
        }
        Commands::UpdateAssociation {
            parent,
            parent_id,
            attribute,
            criteria,
            values,
            options,
        } => {
            actions.ensure(Action::UpdateAssociation)?;
            let record = footprint
                .update_association(
                    parent,
                    &parse_id(parent_id)?,
                    attribute,
                    &parse_criteria(criteria)?,
                    &parse_payload(values)?,
                    &options.to_options(),
                )
                .await?;
            Ok(record_to_json(schema, &record))
        }
        Commands::DestroyAssociation {
            parent,
            parent_id,
            attribute,
            criteria,
            options,
        } => {
            actions.ensure(Action::DestroyAssociation)?;
            let record = footprint
                .destroy_association(
                    parent,
                    &parse_id(parent_id)?,
                    attribute,
                    &parse_criteria(criteria)?,
                    &options.to_options(),
                )
                .await?;
            Ok(record_to_json(schema, &record))
        }
        Commands::Schema => {
            let entities: Vec<_> = schema.entities().collect();
            Ok(serde_json::to_value(entities)?)
        }
        Commands::Status => {
            let mut counts = serde_json::Map::new();
            for entity in schema.entities() {
                counts.insert(
                    entity.name().to_string(),
                    json!(footprint.store().count(entity.name())?),
                );
            }
            Ok(json!({ "entities": counts }))
        }
    }
}
