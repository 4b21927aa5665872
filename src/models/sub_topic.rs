use super::entity::{AuditFields, Entity, Preload, Related, Relation, RelationKind};
use super::programming_question::ProgrammingQuestion;
use crate::error::{DataError, Result};
use crate::query_builder::Value;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A topic within a module. Maps to the `sub_topics` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SubTopic {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub module_id: Uuid,
    pub name: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: AuditFields,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub programming_questions: Vec<ProgrammingQuestion>,
}

const RELATIONS: &[Relation] = &[Relation {
    name: "programming_questions",
    target_table: ProgrammingQuestion::TABLE,
    kind: RelationKind::HasMany {
        foreign_key: "sub_topic_id",
    },
    target_soft_delete: true,
}];

impl SubTopic {
    pub fn new(tenant_id: Uuid, actor: Uuid, module_id: Uuid, name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            module_id,
            name: name.to_string(),
            audit: AuditFields::created_by(actor),
            programming_questions: Vec::new(),
        }
    }
}

impl Entity for SubTopic {
    const TABLE: &'static str = "sub_topics";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "tenant_id",
        "module_id",
        "name",
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
            self.module_id.into(),
            self.name.as_str().into(),
        ];
        values.extend(self.audit.values());
        values
    }

    fn relations() -> &'static [Relation] {
        RELATIONS
    }

    fn attach(&mut self, relation: &str, related: Related) -> Result<()> {
        match relation {
            "programming_questions" => {
                self.programming_questions = related.decode()?;
                Ok(())
            }
            other => Err(DataError::unknown_relation(Self::TABLE, other)),
        }
    }

    fn children_mut(&mut self, relation: &str) -> Vec<&mut dyn Preload> {
        if relation == "programming_questions" {
            self.programming_questions
                .iter_mut()
                .map(|q| q as &mut dyn Preload)
                .collect()
        } else {
            Vec::new()
        }
    }
}
