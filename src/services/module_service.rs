use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{PlacementConfig, QueryConfig};
use crate::database::{AccessMode, DatabaseConnection};
use crate::enrichment::{CountMetric, Enricher};
use crate::error::{DataError, Result};
use crate::models::{
    Module, NewModule, NewProgrammingQuestion, ProgrammingQuestion, SubTopic, Tag,
};
use crate::query_builder::{Column, Join, Page, Predicate, QueryProcessor};
use crate::repository::{FieldMap, Repository};

/// Search bag for [`ModuleService::get_all_modules`], as submitted by a
/// listing form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleQuery {
    /// Substring match on the module name.
    pub search: Option<String>,
    /// Only modules carrying this tag.
    pub tag_id: Option<Uuid>,
    /// `1` fills `total_sub_topics` and `total_programming_questions`.
    pub is_module_count: Option<i32>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ModuleQuery {
    fn wants_counts(&self) -> bool {
        self.is_module_count == Some(1)
    }

    fn processors(&self) -> Vec<QueryProcessor> {
        let mut processors = Vec::new();
        if let Some(search) = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            processors.push(QueryProcessor::filter(Predicate::like(
                "modules.name",
                format!("%{search}%"),
            )));
        }
        if let Some(tag_id) = self.tag_id {
            processors.push(QueryProcessor::join(Join::inner(
                "module_tags",
                Predicate::columns_eq("module_tags.module_id", "modules.id"),
            )));
            processors.push(QueryProcessor::filter(Predicate::eq(
                "module_tags.tag_id",
                tag_id,
            )));
        }
        processors
    }
}

/// Catalog operations for modules and their sub-topics, questions and tags.
///
/// Each public method owns one transaction scope for its whole duration and
/// commits only when every step succeeded.
#[derive(Debug)]
pub struct ModuleService {
    db: DatabaseConnection,
    modules: Repository<Module>,
    sub_topics: Repository<SubTopic>,
    questions: Repository<ProgrammingQuestion>,
    tags: Repository<Tag>,
    enricher: Enricher<Module>,
    query: QueryConfig,
}

impl ModuleService {
    pub fn new(db: DatabaseConnection, config: &PlacementConfig) -> Self {
        let enricher = Enricher::new(db.clone(), config.enrichment.clone())
            .with_metric(CountMetric::of::<SubTopic>(
                "total_sub_topics",
                "module_id",
                |module: &mut Module, total| module.total_sub_topics = Some(total),
            ))
            .with_metric(CountMetric::of::<ProgrammingQuestion>(
                "total_programming_questions",
                "module_id",
                |module: &mut Module, total| module.total_programming_questions = Some(total),
            ));

        Self {
            db,
            modules: Repository::new(),
            sub_topics: Repository::new(),
            questions: Repository::new(),
            tags: Repository::new(),
            enricher,
            query: config.query.clone(),
        }
    }

    pub fn enricher(&self) -> &Enricher<Module> {
        &self.enricher
    }

    /// Create a module and link its tags in one transaction.
    pub async fn create_module(
        &self,
        tenant_id: Uuid,
        actor: Uuid,
        new_module: NewModule,
    ) -> Result<Module> {
        let name = new_module.name.trim().to_string();
        if name.is_empty() {
            return Err(DataError::Validation("module name is required".to_string()));
        }
        let tag_ids = new_module.tag_ids.clone();
        let module = Module::new(
            tenant_id,
            actor,
            NewModule {
                name: name.clone(),
                ..new_module
            },
        );

        let mut scope = self.db.begin(AccessMode::ReadWrite).await?;
        let taken = self
            .modules
            .does_record_exist_for_tenant(
                &mut scope,
                tenant_id,
                &[QueryProcessor::filter(Predicate::eq("modules.name", name.as_str()))],
            )
            .await?;
        if taken {
            scope.rollback().await?;
            return Err(DataError::Conflict(format!("module '{name}' already exists")));
        }

        self.modules.add(&mut scope, &module).await?;
        if !tag_ids.is_empty() {
            self.modules
                .replace_associations(&mut scope.borrow_scope(), &module, "tags", &tag_ids)
                .await?;
        }
        let created = self
            .modules
            .get_for_tenant(
                &mut scope,
                tenant_id,
                module.id,
                &[QueryProcessor::preload_associations(&["tags"])],
            )
            .await?;
        scope.commit().await?;

        info!(tenant_id = %tenant_id, module_id = %created.id, "module created");
        Ok(created)
    }

    /// A module with its tags and its sub-topics' questions.
    pub async fn get_module(&self, tenant_id: Uuid, id: Uuid) -> Result<Module> {
        let mut scope = self.db.begin(AccessMode::ReadOnly).await?;
        let module = self
            .modules
            .get_for_tenant(
                &mut scope,
                tenant_id,
                id,
                &[QueryProcessor::preload_associations(&[
                    "tags",
                    "sub_topics.programming_questions",
                ])],
            )
            .await?;
        scope.commit().await?;
        Ok(module)
    }

    /// Rename a module or change its description.
    pub async fn update_module(
        &self,
        tenant_id: Uuid,
        actor: Uuid,
        id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<Module> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DataError::Validation("module name is required".to_string()));
        }

        let mut scope = self.db.begin(AccessMode::ReadWrite).await?;
        let mut module = self
            .modules
            .get_for_tenant(&mut scope, tenant_id, id, &[])
            .await?;
        module.name = name.to_string();
        module.description = description.map(str::to_string);
        module.audit.touch(actor);
        self.modules.update(&mut scope, &module).await?;
        scope.commit().await?;

        debug!(tenant_id = %tenant_id, module_id = %id, "module updated");
        Ok(module)
    }

    /// Change only the description, leaving every other column untouched.
    pub async fn set_module_description(
        &self,
        tenant_id: Uuid,
        actor: Uuid,
        id: Uuid,
        description: Option<&str>,
    ) -> Result<()> {
        let fields = FieldMap::new()
            .set("description", description.map(str::to_string))
            .set("updated_at", chrono::Utc::now())
            .set("updated_by", actor);
        let filter = QueryProcessor::filter(Predicate::eq(
            Column::qualified("modules", "id"),
            id,
        ));

        let mut scope = self.db.begin(AccessMode::ReadWrite).await?;
        let changed = self
            .modules
            .update_with_map_for_tenant(&mut scope, tenant_id, &fields, &[filter])
            .await?;
        if changed == 0 {
            return Err(DataError::not_found("modules", format!("id {id}")));
        }
        scope.commit().await
    }

    pub async fn delete_module(&self, tenant_id: Uuid, actor: Uuid, id: Uuid) -> Result<()> {
        let mut scope = self.db.begin(AccessMode::ReadWrite).await?;
        self.modules
            .soft_delete(&mut scope, tenant_id, id, actor)
            .await?;
        scope.commit().await?;
        info!(tenant_id = %tenant_id, module_id = %id, "module deleted");
        Ok(())
    }

    /// Make `tag_ids` the module's exact tag set.
    pub async fn set_module_tags(&self, tenant_id: Uuid, id: Uuid, tag_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let mut scope = self.db.begin(AccessMode::ReadWrite).await?;
        let module = self
            .modules
            .get_for_tenant(&mut scope, tenant_id, id, &[])
            .await?;
        self.modules
            .replace_associations(&mut scope, &module, "tags", tag_ids)
            .await?;
        let linked = self
            .modules
            .association_ids(&mut scope, &module, "tags")
            .await?;
        scope.commit().await?;
        Ok(linked)
    }

    pub async fn create_tag(&self, tenant_id: Uuid, actor: Uuid, name: &str) -> Result<Tag> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DataError::Validation("tag name is required".to_string()));
        }
        let tag = Tag::new(tenant_id, actor, name);
        let mut scope = self.db.begin(AccessMode::ReadWrite).await?;
        self.tags.add(&mut scope, &tag).await?;
        scope.commit().await?;
        Ok(tag)
    }

    pub async fn add_sub_topic(
        &self,
        tenant_id: Uuid,
        actor: Uuid,
        module_id: Uuid,
        name: &str,
    ) -> Result<SubTopic> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DataError::Validation("sub-topic name is required".to_string()));
        }
        let sub_topic = SubTopic::new(tenant_id, actor, module_id, name);

        let mut scope = self.db.begin(AccessMode::ReadWrite).await?;
        self.ensure_module(&mut scope, tenant_id, module_id).await?;
        self.sub_topics.add(&mut scope, &sub_topic).await?;
        scope.commit().await?;
        Ok(sub_topic)
    }

    pub async fn add_programming_question(
        &self,
        tenant_id: Uuid,
        actor: Uuid,
        new_question: NewProgrammingQuestion,
    ) -> Result<ProgrammingQuestion> {
        if new_question.title.trim().is_empty() {
            return Err(DataError::Validation("question title is required".to_string()));
        }
        let question = ProgrammingQuestion::new(tenant_id, actor, new_question);

        let mut scope = self.db.begin(AccessMode::ReadWrite).await?;
        self.ensure_module(&mut scope, tenant_id, question.module_id)
            .await?;
        if let Some(sub_topic_id) = question.sub_topic_id {
            let filter = QueryProcessor::filter(Predicate::and(vec![
                Predicate::eq("sub_topics.id", sub_topic_id),
                Predicate::eq("sub_topics.module_id", question.module_id),
            ]));
            if !self
                .sub_topics
                .does_record_exist_for_tenant(&mut scope, tenant_id, &[filter])
                .await?
            {
                return Err(DataError::not_found("sub_topics", format!("id {sub_topic_id}")));
            }
        }
        self.questions.add(&mut scope, &question).await?;
        scope.commit().await?;
        Ok(question)
    }

    async fn ensure_module(
        &self,
        scope: &mut crate::database::TransactionScope,
        tenant_id: Uuid,
        module_id: Uuid,
    ) -> Result<()> {
        let filter = QueryProcessor::filter(Predicate::eq("modules.id", module_id));
        if self
            .modules
            .does_record_exist_for_tenant(scope, tenant_id, &[filter])
            .await?
        {
            Ok(())
        } else {
            Err(DataError::not_found("modules", format!("id {module_id}")))
        }
    }

    /// One page of a tenant's modules, newest first, optionally with counts.
    pub async fn get_all_modules(&self, tenant_id: Uuid, query: &ModuleQuery) -> Result<Page<Module>> {
        let limit = self.query.page_size(query.limit);
        let offset = query.offset.unwrap_or(0);
        let processors = query.processors();

        let mut scope = self.db.begin(AccessMode::ReadOnly).await?;
        let mut page = self
            .modules
            .get_page_for_tenant(&mut scope, tenant_id, limit, offset, &processors)
            .await?;
        if query.wants_counts() {
            let rows = std::mem::take(&mut page.items);
            page.items = self.enricher.enrich(&mut scope, rows).await?;
        }
        scope.commit().await?;

        debug!(
            tenant_id = %tenant_id,
            rows = page.items.len(),
            total = page.total_count,
            "modules listed"
        );
        Ok(page)
    }

    /// Sub-topic count of one module, straight from the repository.
    pub async fn count_sub_topics(&self, tenant_id: Uuid, module_id: Uuid) -> Result<i64> {
        let mut scope = self.db.begin(AccessMode::ReadOnly).await?;
        let count = self
            .sub_topics
            .get_count_for_tenant(
                &mut scope,
                tenant_id,
                &[QueryProcessor::filter(Predicate::eq("sub_topics.module_id", module_id))],
            )
            .await?;
        scope.commit().await?;
        Ok(count)
    }

    pub async fn count_programming_questions(&self, tenant_id: Uuid, module_id: Uuid) -> Result<i64> {
        let mut scope = self.db.begin(AccessMode::ReadOnly).await?;
        let count = self
            .questions
            .get_count_for_tenant(
                &mut scope,
                tenant_id,
                &[QueryProcessor::filter(Predicate::eq(
                    "programming_questions.module_id",
                    module_id,
                ))],
            )
            .await?;
        scope.commit().await?;
        Ok(count)
    }
}
