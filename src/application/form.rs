//! Draft state behind the product and category editors.

use std::fmt;

use patisserie_records::{CategoryRecord, ProductRecord, RecordId};
use tracing::debug;

use crate::application::error::MutationError;
use crate::application::mutation::{MutationCoordinator, MutationRecord};
use crate::domain::entities::{EntityKind, EntityPayload};
use crate::domain::forms::{CategoryDraft, FieldErrors, ProductDraft};

/// Binds a record type to its draft, validation rules and payload shape.
pub trait FormSchema {
    type Record: Clone + PartialEq + fmt::Debug;
    type Draft: Clone + PartialEq + fmt::Debug;

    const ENTITY: EntityKind;

    fn draft_from(record: Option<&Self::Record>) -> Self::Draft;

    /// Fill derived fields before validation.
    fn normalize(_draft: &mut Self::Draft) {}

    fn validate(draft: &Self::Draft) -> FieldErrors;

    fn target_of(record: &Self::Record) -> RecordId;

    fn into_payload(draft: Self::Draft) -> EntityPayload;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductForm;

impl FormSchema for ProductForm {
    type Record = ProductRecord;
    type Draft = ProductDraft;

    const ENTITY: EntityKind = EntityKind::Product;

    fn draft_from(record: Option<&ProductRecord>) -> ProductDraft {
        ProductDraft::from_record(record)
    }

    fn validate(draft: &ProductDraft) -> FieldErrors {
        draft.validate()
    }

    fn target_of(record: &ProductRecord) -> RecordId {
        record.id.clone()
    }

    fn into_payload(draft: ProductDraft) -> EntityPayload {
        draft.into_payload()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryForm;

impl FormSchema for CategoryForm {
    type Record = CategoryRecord;
    type Draft = CategoryDraft;

    const ENTITY: EntityKind = EntityKind::Category;

    fn draft_from(record: Option<&CategoryRecord>) -> CategoryDraft {
        CategoryDraft::from_record(record)
    }

    fn normalize(draft: &mut CategoryDraft) {
        draft.normalize();
    }

    fn validate(draft: &CategoryDraft) -> FieldErrors {
        draft.validate()
    }

    fn target_of(record: &CategoryRecord) -> RecordId {
        record.id.clone()
    }

    fn into_payload(draft: CategoryDraft) -> EntityPayload {
        draft.into_payload()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Validation failed; nothing was sent.
    Invalid(FieldErrors),
    Saved(MutationRecord),
}

/// Editor state for one entity: create mode without an initial record, edit mode with one.
#[derive(Debug, Clone)]
pub struct EntityFormController<S: FormSchema> {
    initial: Option<S::Record>,
    draft: S::Draft,
    errors: FieldErrors,
}

impl<S: FormSchema> EntityFormController<S> {
    pub fn new(initial: Option<S::Record>) -> Self {
        let draft = S::draft_from(initial.as_ref());
        Self {
            initial,
            draft,
            errors: FieldErrors::new(),
        }
    }

    pub fn draft(&self) -> &S::Draft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut S::Draft {
        &mut self.draft
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn initial(&self) -> Option<&S::Record> {
        self.initial.as_ref()
    }

    pub fn target(&self) -> Option<RecordId> {
        self.initial.as_ref().map(S::target_of)
    }

    /// Switch to another initial record. In-progress edits are discarded, not merged.
    pub fn set_initial(&mut self, initial: Option<S::Record>) {
        if self.initial == initial {
            return;
        }
        debug!(entity = %S::ENTITY, "Form target changed; resetting draft");
        self.initial = initial;
        self.reset();
    }

    /// Drop edits and errors, restoring the draft from the initial record.
    pub fn reset(&mut self) {
        self.draft = S::draft_from(self.initial.as_ref());
        self.errors.clear();
    }

    /// Validate the draft and, when it is clean, hand it to the coordinator.
    pub async fn submit(
        &mut self,
        coordinator: &MutationCoordinator,
    ) -> Result<SubmitOutcome, MutationError> {
        S::normalize(&mut self.draft);
        self.errors = S::validate(&self.draft);
        if !self.errors.is_empty() {
            debug!(
                entity = %S::ENTITY,
                invalid_fields = self.errors.len(),
                "Form submission blocked by validation"
            );
            return Ok(SubmitOutcome::Invalid(self.errors.clone()));
        }

        let payload = S::into_payload(self.draft.clone());
        let record = coordinator
            .execute(S::ENTITY, self.target(), payload)
            .await?;
        Ok(SubmitOutcome::Saved(record))
    }
}

pub type ProductFormController = EntityFormController<ProductForm>;
pub type CategoryFormController = EntityFormController<CategoryForm>;
