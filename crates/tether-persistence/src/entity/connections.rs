//! `SeaORM` Entity for connections table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "connections")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub client_id: String,
    pub org_id: String,
    pub account: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub canonical_facts: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub dispatchers: String,
    #[sea_orm(column_type = "Text")]
    pub tags: String,
    pub latest_message_id: String,
    pub latest_timestamp: DateTimeUtc,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub stale_timestamp: DateTimeUtc,
    pub tenant_lookup_timestamp: Option<DateTimeUtc>,
    pub tenant_lookup_failure_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
