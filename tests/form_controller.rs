mod support;

use patisserie::application::form::{
    CategoryFormController, ProductFormController, SubmitOutcome,
};
use patisserie::application::queries::NamedQuery;
use patisserie::domain::entities::Attachment;
use patisserie_records::{CategoryRecord, ProductRecord, RecordId};

use support::{FakeGateway, category_row, context, png, product_row};

#[tokio::test]
async fn invalid_product_submit_sends_nothing() {
    let gateway = FakeGateway::new();
    let context = context(gateway.clone());

    let mut form = ProductFormController::new(None);
    form.draft_mut().name = "Torta tres leches".into();
    form.draft_mut()
        .images
        .push(Attachment::Pending(png("torta.png", 800, 800)));

    let outcome = form
        .submit(context.coordinator())
        .await
        .expect("validation is not an error");

    let SubmitOutcome::Invalid(errors) = outcome else {
        panic!("expected validation failure");
    };
    assert!(errors.contains_key("short_description"));
    assert!(errors.contains_key("price"));
    assert!(errors.contains_key("category_id"));
    assert!(errors.contains_key("ingredients[0]"));
    assert!(errors.contains_key("servings[0].size"));
    assert!(!errors.contains_key("images"));
    assert_eq!(form.errors(), &errors);

    assert_eq!(FakeGateway::count(&gateway.uploads), 0);
    assert_eq!(FakeGateway::count(&gateway.upserts), 0);
}

#[tokio::test]
async fn edit_form_resets_when_target_changes() {
    let gateway = FakeGateway::new();
    gateway.seed(
        "productos",
        vec![
            product_row(7, "Kuchen de nuez", 2),
            product_row(8, "Pie de limón", 2),
        ],
    );
    let context = context(gateway.clone());

    let seven: ProductRecord = context
        .load(NamedQuery::ProductDetail(RecordId::new("7")))
        .await
        .expect("detail 7");
    let eight: ProductRecord = context
        .load(NamedQuery::ProductDetail(RecordId::new("8")))
        .await
        .expect("detail 8");

    let mut form = ProductFormController::new(Some(seven.clone()));
    form.draft_mut().price = 1.0;

    // Same record again keeps the edit.
    form.set_initial(Some(seven));
    assert_eq!(form.draft().price, 1.0);

    form.set_initial(Some(eight));
    assert_eq!(form.target(), Some(RecordId::new("8")));
    assert_eq!(form.draft().name, "Pie de limón");
    assert_eq!(form.draft().price, 12990.0);
    assert_eq!(form.draft().images.len(), 1);
}

#[tokio::test]
async fn category_submit_derives_slug_and_updates_row() {
    let gateway = FakeGateway::new();
    gateway.seed("categorias", vec![category_row(4, "Kuchen", "kuchen")]);
    let context = context(gateway.clone());

    let record: CategoryRecord = context
        .load(NamedQuery::CategoryDetail(RecordId::new("4")))
        .await
        .expect("category");
    let mut form = CategoryFormController::new(Some(record));
    form.draft_mut().name = "Kuchen de Temporada".into();
    form.draft_mut().slug.clear();

    let outcome = form
        .submit(context.coordinator())
        .await
        .expect("submit");
    let SubmitOutcome::Saved(mutation) = outcome else {
        panic!("expected save");
    };
    assert_eq!(mutation.target, Some(RecordId::new("4")));
    assert_eq!(form.draft().slug, "kuchen-de-temporada");
    assert_eq!(
        gateway.rows("categorias"),
        vec![category_row(4, "Kuchen de Temporada", "kuchen-de-temporada")]
    );
}

#[tokio::test]
async fn suggested_slug_skips_taken_ones() {
    let gateway = FakeGateway::new();
    gateway.seed(
        "categorias",
        vec![
            category_row(1, "Tortas", "tortas"),
            category_row(2, "Tortas", "tortas-2"),
        ],
    );
    let context = context(gateway.clone());

    let slug = context
        .suggest_category_slug("Tortas", None)
        .await
        .expect("slug");
    assert_eq!(slug, "tortas-3");

    let editing = context
        .suggest_category_slug("Tortas", Some(&RecordId::new("1")))
        .await
        .expect("slug while editing");
    assert_eq!(editing, "tortas");
}
