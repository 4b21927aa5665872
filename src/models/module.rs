use super::entity::{AuditFields, Entity, Preload, Related, Relation, RelationKind};
use super::sub_topic::SubTopic;
use super::tag::Tag;
use crate::error::{DataError, Result};
use crate::query_builder::Value;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A course module. Maps to the `modules` table.
///
/// `total_sub_topics` and `total_programming_questions` are derived counts
/// filled in by enrichment; they are never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Module {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: AuditFields,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_sub_topics: Option<i64>,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_programming_questions: Option<i64>,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_topics: Vec<SubTopic>,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

/// New Module for creation (without generated fields)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewModule {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
}

const RELATIONS: &[Relation] = &[
    Relation {
        name: "sub_topics",
        target_table: SubTopic::TABLE,
        kind: RelationKind::HasMany {
            foreign_key: "module_id",
        },
        target_soft_delete: true,
    },
    Relation {
        name: "tags",
        target_table: Tag::TABLE,
        kind: RelationKind::ManyToMany {
            join_table: "module_tags",
            owner_key: "module_id",
            related_key: "tag_id",
        },
        target_soft_delete: true,
    },
];

impl Module {
    pub fn new(tenant_id: Uuid, actor: Uuid, new_module: NewModule) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: new_module.name,
            description: new_module.description,
            audit: AuditFields::created_by(actor),
            total_sub_topics: None,
            total_programming_questions: None,
            sub_topics: Vec::new(),
            tags: Vec::new(),
        }
    }
}

impl Entity for Module {
    const TABLE: &'static str = "modules";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "tenant_id",
        "name",
        "description",
        "created_at",
        "created_by",
        "updated_at",
        "updated_by",
        "deleted_at",
        "deleted_by",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    fn values(&self) -> Vec<Value> {
        let mut values = vec![
            self.id.into(),
            self.tenant_id.into(),
            self.name.as_str().into(),
            self.description.clone().into(),
        ];
        values.extend(self.audit.values());
        values
    }

    fn relations() -> &'static [Relation] {
        RELATIONS
    }

    fn attach(&mut self, relation: &str, related: Related) -> Result<()> {
        match relation {
            "sub_topics" => self.sub_topics = related.decode()?,
            "tags" => self.tags = related.decode()?,
            other => return Err(DataError::unknown_relation(Self::TABLE, other)),
        }
        Ok(())
    }

    fn children_mut(&mut self, relation: &str) -> Vec<&mut dyn Preload> {
        match relation {
            "sub_topics" => self
                .sub_topics
                .iter_mut()
                .map(|s| s as &mut dyn Preload)
                .collect(),
            "tags" => self.tags.iter_mut().map(|t| t as &mut dyn Preload).collect(),
            _ => Vec::new(),
        }
    }
}
