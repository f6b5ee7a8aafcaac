use std::path::Path;

use bytes::Bytes;
use patisserie::{
    application::{
        error::AppError,
        form::{ProductFormController, SubmitOutcome},
        queries::NamedQuery,
    },
    config::{IdArg, ProductCommand, ProductSaveArgs},
    domain::{
        entities::{Attachment, EntityKind, PendingBlob},
        forms::{ProductDraft, ServingDraft},
    },
    infra::error::InfraError,
};
use patisserie_records::{ProductRecord, RecordId};
use serde_json::json;
use tracing::debug;

use super::{Console, print_json};

pub async fn handle(console: &Console, cmd: ProductCommand) -> Result<(), AppError> {
    match cmd {
        ProductCommand::List => list(console).await,
        ProductCommand::Show(IdArg { id }) => show(console, id).await,
        ProductCommand::Delete(IdArg { id }) => delete(console, id).await,
        ProductCommand::Save(args) => save(console, *args).await,
    }
}

async fn list(console: &Console) -> Result<(), AppError> {
    let products: Vec<ProductRecord> = console
        .context()
        .load(NamedQuery::ProductsList)
        .await?;
    print_json(&products)
}

async fn show(console: &Console, id: String) -> Result<(), AppError> {
    let product: ProductRecord = console
        .context()
        .load(NamedQuery::ProductDetail(RecordId::new(id)))
        .await?;
    print_json(&product)
}

async fn delete(console: &Console, id: String) -> Result<(), AppError> {
    let context = console.context();
    context.require_admin()?;
    let record = context
        .use_mutation(EntityKind::Product)
        .delete(RecordId::new(id))
        .await?;
    print_json(&record)
}

async fn save(console: &Console, args: ProductSaveArgs) -> Result<(), AppError> {
    let context = console.context();
    context.require_admin()?;

    let initial = match args.id.as_deref() {
        Some(id) => Some(
            context
                .load::<ProductRecord>(NamedQuery::ProductDetail(RecordId::new(id)))
                .await?,
        ),
        None => None,
    };
    let mut form = ProductFormController::new(initial);
    apply_arguments(form.draft_mut(), &args).await?;

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

async fn apply_arguments(draft: &mut ProductDraft, args: &ProductSaveArgs) -> Result<(), AppError> {
    if let Some(name) = &args.name {
        draft.name.clone_from(name);
    }
    if let Some(text) = &args.short_description {
        draft.short_description.clone_from(text);
    }
    if let Some(text) = &args.long_description {
        draft.long_description.clone_from(text);
    }
    if let Some(price) = args.price {
        draft.price = price;
    }
    if let Some(category_id) = &args.category_id {
        draft.category_id.clone_from(category_id);
    }
    if let Some(featured) = args.featured {
        draft.featured = featured;
    }
    if !args.ingredients.is_empty() {
        draft.ingredients.clone_from(&args.ingredients);
    }
    if !args.servings.is_empty() {
        draft.servings = args
            .servings
            .iter()
            .map(|raw| parse_serving(raw))
            .collect::<Result<_, _>>()?;
    }

    if args.replace_images {
        draft.images.retain(Attachment::is_pending);
    }
    for path in &args.images {
        draft.images.push(Attachment::Pending(read_image(path).await?));
    }
    Ok(())
}

/// Parse `SIZE=COUNT`. The size may itself contain `=`; the count is after the last one.
fn parse_serving(raw: &str) -> Result<ServingDraft, AppError> {
    let (size, count) = raw
        .rsplit_once('=')
        .ok_or_else(|| AppError::invalid_input(format!("serving `{raw}` must be SIZE=COUNT")))?;
    let servings = count.trim().parse::<u32>().map_err(|_| {
        AppError::invalid_input(format!("serving count `{}` is not a whole number", count.trim()))
    })?;
    Ok(ServingDraft {
        size: size.trim().to_string(),
        servings,
    })
}

async fn read_image(path: &Path) -> Result<PendingBlob, AppError> {
    let bytes = tokio::fs::read(path).await.map_err(InfraError::from)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::invalid_input(format!("{} is not a file", path.display())))?;
    let blob = PendingBlob::from_file_name(file_name, Bytes::from(bytes));
    debug!(
        file_name = %blob.file_name,
        content_type = %blob.content_type,
        size_bytes = blob.size_bytes(),
        "Image queued for upload"
    );
    Ok(blob)
}
