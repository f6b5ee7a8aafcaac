use patisserie::{
    application::{
        error::AppError,
        form::{CategoryFormController, SubmitOutcome},
        queries::NamedQuery,
    },
    config::{CategoryCommand, CategorySaveArgs, IdArg},
    domain::entities::EntityKind,
};
use patisserie_records::{CategoryRecord, RecordId};
use serde_json::json;

use super::{Console, print_json};

pub async fn handle(console: &Console, cmd: CategoryCommand) -> Result<(), AppError> {
    let context = console.context();
    match cmd {
        CategoryCommand::List => {
            let categories: Vec<CategoryRecord> = context.load(NamedQuery::CategoriesList).await?;
            print_json(&categories)
        }
        CategoryCommand::Show(IdArg { id }) => {
            let category: CategoryRecord = context
                .load(NamedQuery::CategoryDetail(RecordId::new(id)))
                .await?;
            print_json(&category)
        }
        CategoryCommand::Delete(IdArg { id }) => {
            context.require_admin()?;
            let record = context
                .use_mutation(EntityKind::Category)
                .delete(RecordId::new(id))
                .await?;
            print_json(&record)
        }
        CategoryCommand::Save(args) => save(console, args).await,
    }
}

async fn save(console: &Console, args: CategorySaveArgs) -> Result<(), AppError> {
    let context = console.context();
    context.require_admin()?;

    let target = args.id.map(RecordId::new);
    let initial = match &target {
        Some(id) => Some(
            context
                .load::<CategoryRecord>(NamedQuery::CategoryDetail(id.clone()))
                .await?,
        ),
        None => None,
    };
    let mut form = CategoryFormController::new(initial);

    if let Some(name) = args.name {
        let draft = form.draft_mut();
        draft.name = name;
        if args.slug.is_none() {
            draft.slug.clear();
        }
    }
    match args.slug {
        Some(slug) => form.draft_mut().slug = slug,
        None if form.draft().slug.trim().is_empty() && !form.draft().name.trim().is_empty() => {
            let slug = context
                .suggest_category_slug(&form.draft().name, target.as_ref())
                .await?;
            form.draft_mut().slug = slug;
        }
        None => {}
    }

    match form.submit(context.coordinator()).await? {
        SubmitOutcome::Saved(record) => print_json(&record),
        SubmitOutcome::Invalid(errors) => {
            print_json(&json!({ "field_errors": errors }))?;
            Err(AppError::invalid_input(format!(
                "{} field(s) failed validation",
                errors.len()
            )))
        }
    }
}
