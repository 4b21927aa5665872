use super::entity::{AuditFields, Entity};
use crate::query_builder::Value;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A practice question. Maps to the `programming_questions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProgrammingQuestion {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub module_id: Uuid,
    pub sub_topic_id: Option<Uuid>,
    pub title: String,
    pub difficulty: i64,
    pub score: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: AuditFields,
}

/// New ProgrammingQuestion for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProgrammingQuestion {
    pub module_id: Uuid,
    pub sub_topic_id: Option<Uuid>,
    pub title: String,
    pub difficulty: i64,
    pub score: i64,
}

impl ProgrammingQuestion {
    pub fn new(tenant_id: Uuid, actor: Uuid, new_question: NewProgrammingQuestion) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            module_id: new_question.module_id,
            sub_topic_id: new_question.sub_topic_id,
            title: new_question.title,
            difficulty: new_question.difficulty,
            score: new_question.score,
            audit: AuditFields::created_by(actor),
        }
    }
}

impl Entity for ProgrammingQuestion {
    const TABLE: &'static str = "programming_questions";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "tenant_id",
        "module_id",
        "sub_topic_id",
        "title",
        "difficulty",
        "score",
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
            self.sub_topic_id.into(),
            self.title.as_str().into(),
            self.difficulty.into(),
            self.score.into(),
        ];
        values.extend(self.audit.values());
        values
    }
}
