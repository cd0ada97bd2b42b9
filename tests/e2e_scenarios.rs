// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end seed scenarios: the full saga on the in-process engine with
//! a mocked accounting system.

use odx_books::{
    CatalogCache, DraftWriter, HttpBooksApi, MemoryFingerprintStore, OAuthConfig, QueueSettings,
    StaticCredentials, TokenCache,
};
use odx_core::{
    CaseStatus, ChatRef, IssueCode, LanguageHint, SIGNAL_APPROVAL_RECEIVED,
    SIGNAL_FILE_REUPLOADED, SIGNAL_SELECTIONS_SUBMITTED,
};
use odx_engine::{EngineClient, LocalEngine, RuntimeStatus};
use odx_match::ItemMatchOptions;
use odx_parser::ParseOptions;
use odx_parser::workbook::{Cell, Sheet, Workbook};
use odx_relay::{MemoryOutbox, MemoryRetryQueue, OutboxEventType, RetryQueue, SweptExecutor};
use odx_retry::RetryPolicy;
use odx_store::{CaseService, MemoryAuditSink, MemoryCaseStore};
use odx_workflow::{
    Activities, EchoCommittee, LogNotifier, MemoryBlobStore, ModelParserGateway, OrderWorkflow,
    TimerConfig, WorkflowInput,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    engine: Arc<LocalEngine>,
    cases: CaseService,
    blobs: Arc<MemoryBlobStore>,
    outbox: Arc<MemoryOutbox>,
    queue: Arc<MemoryRetryQueue>,
    drafts: Arc<DraftWriter>,
    _accounting: MockServer,
}

async fn mock_catalogs(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1", "expires_in": 3600
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/customers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "c-acme", "name": "Acme Co."},
            {"id": "c-acme-llc", "name": "Acme LLC"},
            {"id": "c-globex", "name": "Globex Corporation"},
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "it-1", "name": "Widget", "sku": "WID-01", "gtin": "4006381333931", "rate": 5.0},
            {"id": "it-2", "name": "Gadget", "sku": "GAD-02", "rate": 7.5},
        ])))
        .mount(server)
        .await;
}

async fn mock_draft_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/drafts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "so-1", "number": "SO-0001"
        })))
        .mount(server)
        .await;
}

async fn harness(accounting: MockServer) -> Harness {
    let tokens = Arc::new(TokenCache::new(
        OAuthConfig {
            token_url: format!("{}/oauth/token", accounting.uri()),
            client_id: "client".into(),
            client_secret: "secret".into(),
        },
        Box::new(StaticCredentials::new("rt-1")),
    ));
    let books_api = Arc::new(HttpBooksApi::new(accounting.uri(), tokens));
    let catalogs = Arc::new(
        CatalogCache::load(books_api.clone(), Duration::from_secs(300))
            .await
            .expect("catalogs load"),
    );

    let queue = Arc::new(MemoryRetryQueue::new());
    let outbox = Arc::new(MemoryOutbox::new());
    let drafts = Arc::new(DraftWriter::new(
        books_api,
        Arc::new(MemoryFingerprintStore::new()),
        queue.clone(),
        outbox.clone(),
        RetryPolicy::builder()
            .max_attempts(3)
            .initial_delay(Duration::from_millis(5))
            .build(),
        QueueSettings::default(),
    ));

    let cases = CaseService::new(
        Arc::new(MemoryCaseStore::new()),
        Arc::new(MemoryAuditSink::new()),
    );
    let blobs = Arc::new(MemoryBlobStore::new());

    let activities = Arc::new(Activities {
        cases: cases.clone(),
        blobs: blobs.clone(),
        parser: Arc::new(ModelParserGateway {
            options: ParseOptions::default(),
        }),
        committee: Arc::new(EchoCommittee),
        catalogs,
        drafts: drafts.clone(),
        notifier: Arc::new(LogNotifier),
        item_match: ItemMatchOptions::default(),
    });
    let workflow = Arc::new(OrderWorkflow::new(activities, TimerConfig::default()));

    Harness {
        engine: Arc::new(LocalEngine::new(workflow)),
        cases,
        blobs,
        outbox,
        queue,
        drafts,
        _accounting: accounting,
    }
}

fn input(case_id: Uuid, blob_url: &str) -> WorkflowInput {
    WorkflowInput {
        case_id,
        tenant_id: "tenant-1".into(),
        user_id: "user@example.com".into(),
        blob_url: blob_url.into(),
        filename: "order.xlsx".into(),
        correlation_id: case_id.to_string(),
        chat: ChatRef::default(),
        locale: None,
    }
}

/// A clean English order sheet with the given customer and line count.
fn order_sheet(customer: &str, lines: usize) -> Workbook {
    let mut rows = vec![
        vec![Cell::text("Customer:"), Cell::text(customer)],
        vec![
            Cell::text("SKU"),
            Cell::text("Product"),
            Cell::text("Qty"),
            Cell::text("Unit Price"),
            Cell::text("Total"),
        ],
    ];
    for i in 0..lines {
        let (sku, name, price) = if i % 2 == 0 {
            ("WID-01", "Widget", 5.0)
        } else {
            ("GAD-02", "Gadget", 7.5)
        };
        let qty = (i + 1) as f64;
        rows.push(vec![
            Cell::text(sku),
            Cell::text(name),
            Cell::number(qty),
            Cell::number(price),
            Cell::number(qty * price),
        ]);
    }
    Workbook::single(Sheet::from_rows("Orders", rows))
}

fn blob_bytes(workbook: &Workbook) -> Vec<u8> {
    serde_json::to_vec(workbook).expect("workbook encodes")
}

async fn wait_for_step(engine: &LocalEngine, workflow_id: &str, step: &str) {
    for _ in 0..500 {
        if let Ok(status) = engine.status(workflow_id).await {
            if status.current_step.as_deref() == Some(step) {
                return;
            }
            if status.status.is_closed() {
                panic!(
                    "workflow closed as {:?} while waiting for step '{step}'",
                    status.status
                );
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("workflow never reached step '{step}'");
}

async fn approve(engine: &LocalEngine, workflow_id: &str) {
    engine
        .signal(
            workflow_id,
            SIGNAL_APPROVAL_RECEIVED,
            json!({"approved": true, "approver": "lead@example.com"}),
        )
        .await
        .expect("approval signal");
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// Happy path, English: ten lines for an existing customer, approval,
/// one draft, one `created` event.
#[tokio::test]
async fn happy_path_english() {
    let accounting = MockServer::start().await;
    mock_catalogs(&accounting).await;
    mock_draft_success(&accounting).await;
    let h = harness(accounting).await;

    let case_id = Uuid::new_v4();
    h.blobs
        .put("blob://order", blob_bytes(&order_sheet("Acme Co.", 10)))
        .await;
    let wf = case_id.to_string();
    h.engine
        .start(&wf, serde_json::to_value(input(case_id, "blob://order")).unwrap())
        .await
        .unwrap();

    wait_for_step(&h.engine, &wf, "awaiting-approval").await;
    let case = h.cases.read("tenant-1", case_id).await.unwrap();
    assert!(
        !case.issues.iter().any(|i| i.is_blocker()),
        "unexpected blockers: {:?}",
        case.issues
    );
    assert_eq!(case.status, CaseStatus::AwaitingInput);
    let order = case.order.as_ref().unwrap();
    assert_eq!(order.line_items.len(), 10);

    approve(&h.engine, &wf).await;
    let status = h.engine.join(&wf).await.unwrap();
    assert_eq!(status, RuntimeStatus::Completed);

    let case = h.cases.read("tenant-1", case_id).await.unwrap();
    assert_eq!(case.status, CaseStatus::DraftCreated);
    assert_eq!(case.draft_id.as_deref(), Some("so-1"));
    assert_eq!(h.outbox.events_of(OutboxEventType::Created).await.len(), 1);
}

/// Farsi headers and Persian digits parse with high-confidence mappings.
#[tokio::test]
async fn farsi_headers_and_digits() {
    let accounting = MockServer::start().await;
    mock_catalogs(&accounting).await;
    let h = harness(accounting).await;

    let workbook = Workbook::single(Sheet::from_rows(
        "سفارش",
        vec![
            vec![Cell::text("مشتری"), Cell::text("Acme Co.")],
            vec![
                Cell::text("کد کالا"),
                Cell::text("تعداد"),
                Cell::text("قیمت واحد"),
            ],
            vec![Cell::text("A-1"), Cell::text("۱۲۰"), Cell::text("۲۵۰۰")],
            vec![Cell::text("B-2"), Cell::text("۵۰"), Cell::text("۳۰۰۰")],
        ],
    ));
    let case_id = Uuid::new_v4();
    h.blobs.put("blob://fa", blob_bytes(&workbook)).await;
    let wf = case_id.to_string();
    h.engine
        .start(&wf, serde_json::to_value(input(case_id, "blob://fa")).unwrap())
        .await
        .unwrap();

    // Unknown SKUs park the case on item selections; the parse result is
    // already on the case by then.
    wait_for_step(&h.engine, &wf, "awaiting-selections").await;
    let case = h.cases.read("tenant-1", case_id).await.unwrap();
    let order = case.order.as_ref().unwrap();

    assert_eq!(order.meta.language_hint, Some(LanguageHint::Fa));
    assert_eq!(*order.line_items[0].quantity.as_ref().unwrap().value(), 120.0);
    for field in [
        odx_core::CanonicalField::Sku,
        odx_core::CanonicalField::Quantity,
        odx_core::CanonicalField::UnitPrice,
    ] {
        let mapping = order.schema_inference.mapping_for(field).unwrap();
        assert!(
            mapping.confidence >= 0.8,
            "{field}: {}",
            mapping.confidence
        );
    }
}

/// A formula-laden file blocks, and a clean re-upload completes the saga.
#[tokio::test]
async fn formula_block_then_reupload() {
    let accounting = MockServer::start().await;
    mock_catalogs(&accounting).await;
    mock_draft_success(&accounting).await;
    let h = harness(accounting).await;

    let mut dirty = order_sheet("Acme Co.", 2);
    dirty.sheets[0].replace_row(
        2,
        vec![
            Cell::text("WID-01"),
            Cell::text("Widget"),
            Cell::number(1.0),
            Cell::number(5.0),
            Cell::number(5.0).with_formula("=C3*D3"),
        ],
    );
    let case_id = Uuid::new_v4();
    h.blobs.put("blob://dirty", blob_bytes(&dirty)).await;
    h.blobs
        .put("blob://clean", blob_bytes(&order_sheet("Acme Co.", 2)))
        .await;

    let wf = case_id.to_string();
    h.engine
        .start(&wf, serde_json::to_value(input(case_id, "blob://dirty")).unwrap())
        .await
        .unwrap();

    wait_for_step(&h.engine, &wf, "awaiting-reupload").await;
    let case = h.cases.read("tenant-1", case_id).await.unwrap();
    assert_eq!(case.issues.len(), 1);
    assert_eq!(case.issues[0].code, IssueCode::FormulasBlocked);

    h.engine
        .signal(&wf, SIGNAL_FILE_REUPLOADED, json!({"blob_url": "blob://clean"}))
        .await
        .unwrap();

    wait_for_step(&h.engine, &wf, "awaiting-approval").await;
    approve(&h.engine, &wf).await;
    assert_eq!(h.engine.join(&wf).await.unwrap(), RuntimeStatus::Completed);
    let case = h.cases.read("tenant-1", case_id).await.unwrap();
    assert_eq!(case.status, CaseStatus::DraftCreated);
}

/// An ambiguous customer needs a selection before the saga proceeds.
#[tokio::test]
async fn ambiguous_customer_selection() {
    let accounting = MockServer::start().await;
    mock_catalogs(&accounting).await;
    mock_draft_success(&accounting).await;
    let h = harness(accounting).await;

    let case_id = Uuid::new_v4();
    h.blobs
        .put("blob://ambig", blob_bytes(&order_sheet("Acme", 3)))
        .await;
    let wf = case_id.to_string();
    h.engine
        .start(&wf, serde_json::to_value(input(case_id, "blob://ambig")).unwrap())
        .await
        .unwrap();

    wait_for_step(&h.engine, &wf, "awaiting-selections").await;
    let case = h.cases.read("tenant-1", case_id).await.unwrap();
    assert!(
        case.issues
            .iter()
            .any(|i| i.code == IssueCode::AmbiguousCustomer),
        "{:?}",
        case.issues
    );

    h.engine
        .signal(
            &wf,
            SIGNAL_SELECTIONS_SUBMITTED,
            json!({"customer": {"id": "c-acme"}}),
        )
        .await
        .unwrap();

    wait_for_step(&h.engine, &wf, "awaiting-approval").await;
    let case = h.cases.read("tenant-1", case_id).await.unwrap();
    assert_eq!(
        case.order.as_ref().unwrap().customer.resolved_id.as_deref(),
        Some("c-acme")
    );

    approve(&h.engine, &wf).await;
    assert_eq!(h.engine.join(&wf).await.unwrap(), RuntimeStatus::Completed);
}

/// Two identical selection signals in a row have the same effect as one.
#[tokio::test]
async fn duplicate_selection_signal_is_at_most_once() {
    let accounting = MockServer::start().await;
    mock_catalogs(&accounting).await;
    mock_draft_success(&accounting).await;
    let h = harness(accounting).await;

    let case_id = Uuid::new_v4();
    h.blobs
        .put("blob://ambig2", blob_bytes(&order_sheet("Acme", 2)))
        .await;
    let wf = case_id.to_string();
    h.engine
        .start(&wf, serde_json::to_value(input(case_id, "blob://ambig2")).unwrap())
        .await
        .unwrap();

    wait_for_step(&h.engine, &wf, "awaiting-selections").await;
    for _ in 0..2 {
        h.engine
            .signal(
                &wf,
                SIGNAL_SELECTIONS_SUBMITTED,
                json!({"customer": {"id": "c-acme"}}),
            )
            .await
            .unwrap();
    }

    wait_for_step(&h.engine, &wf, "awaiting-approval").await;
    let case = h.cases.read("tenant-1", case_id).await.unwrap();
    assert_eq!(
        case.order.as_ref().unwrap().customer.resolved_id.as_deref(),
        Some("c-acme")
    );

    approve(&h.engine, &wf).await;
    assert_eq!(h.engine.join(&wf).await.unwrap(), RuntimeStatus::Completed);
    let case = h.cases.read("tenant-1", case_id).await.unwrap();
    assert_eq!(case.status, CaseStatus::DraftCreated);
    assert_eq!(h.outbox.events_of(OutboxEventType::Created).await.len(), 1);
}

/// Two starts with the same content: the second draft attempt returns the
/// first draft, and the outbox holds exactly one `created` event.
#[tokio::test]
async fn duplicate_draft_is_idempotent() {
    let accounting = MockServer::start().await;
    mock_catalogs(&accounting).await;
    mock_draft_success(&accounting).await;
    let h = harness(accounting).await;

    let bytes = blob_bytes(&order_sheet("Acme Co.", 4));
    h.blobs.put("blob://dup", bytes).await;

    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    for case_id in [first, second] {
        let wf = case_id.to_string();
        h.engine
            .start(&wf, serde_json::to_value(input(case_id, "blob://dup")).unwrap())
            .await
            .unwrap();
        wait_for_step(&h.engine, &wf, "awaiting-approval").await;
        approve(&h.engine, &wf).await;
        assert_eq!(h.engine.join(&wf).await.unwrap(), RuntimeStatus::Completed);
    }

    let first_case = h.cases.read("tenant-1", first).await.unwrap();
    let second_case = h.cases.read("tenant-1", second).await.unwrap();
    assert_eq!(first_case.status, CaseStatus::DraftCreated);
    assert_eq!(second_case.status, CaseStatus::DraftCreated);
    assert_eq!(first_case.draft_id, second_case.draft_id);
    assert_eq!(h.outbox.events_of(OutboxEventType::Created).await.len(), 1);
}

/// Accounting outage: the draft parks in the retry queue due about a
/// minute out, the workflow completes with the case `ready`, and the
/// eventual success emits a single `created` event.
#[tokio::test]
async fn accounting_outage_parks_then_succeeds() {
    let accounting = MockServer::start().await;
    mock_catalogs(&accounting).await;
    // Every in-activity attempt fails; the retry item's later attempt
    // succeeds.
    Mock::given(method("POST"))
        .and(path("/drafts"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .mount(&accounting)
        .await;
    Mock::given(method("POST"))
        .and(path("/drafts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "so-9", "number": "SO-0009"
        })))
        .mount(&accounting)
        .await;
    let h = harness(accounting).await;

    let case_id = Uuid::new_v4();
    h.blobs
        .put("blob://outage", blob_bytes(&order_sheet("Acme Co.", 2)))
        .await;
    let wf = case_id.to_string();
    h.engine
        .start(&wf, serde_json::to_value(input(case_id, "blob://outage")).unwrap())
        .await
        .unwrap();

    wait_for_step(&h.engine, &wf, "awaiting-approval").await;
    approve(&h.engine, &wf).await;
    assert_eq!(h.engine.join(&wf).await.unwrap(), RuntimeStatus::Completed);

    let case = h.cases.read("tenant-1", case_id).await.unwrap();
    assert_eq!(case.status, CaseStatus::Ready);
    assert!(case.draft_id.is_none());
    assert_eq!(h.outbox.events_of(OutboxEventType::Failed).await.len(), 1);
    assert_eq!(h.outbox.events_of(OutboxEventType::Created).await.len(), 0);

    // The parked item is due roughly a minute out.
    let items = h.queue.items().await;
    assert_eq!(items.len(), 1);
    let due_in = items[0].next_retry_at - chrono::Utc::now();
    assert!(
        (50..=70).contains(&due_in.num_seconds()),
        "due in {due_in}"
    );

    // At due time the sweeper claims the item and runs the same executor;
    // do exactly that without waiting the minute out.
    let claimed = h.queue.mark_in_progress(items[0].id).await.unwrap();
    h.drafts.execute(&claimed).await.unwrap();
    h.queue.mark_succeeded(claimed.id).await.unwrap();

    assert_eq!(h.outbox.events_of(OutboxEventType::Created).await.len(), 1);
}
