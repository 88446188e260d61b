//! Service-level tests against a real on-disk database
//!
//! Each test gets its own temporary installation with seeded reference
//! data and an `admin` administrator.

use std::collections::BTreeSet;

use storyline::core::config::Config;
use storyline::core::context::RequestContext;
use storyline::core::error::{Error, ErrorCode};
use storyline::core::identity::{EntityKind, RecordKind};
use storyline::core::principal::Role;
use storyline::core::query::{ListQuery, Page};
use storyline::entities::acceptance_criteria::NewAcceptanceCriteria;
use storyline::entities::epic::{EpicUpdate, NewEpic};
use storyline::entities::reference::{NewStatus, StatusUpdate, TypeTable};
use storyline::entities::requirement::NewRequirement;
use storyline::entities::user::NewUser;
use storyline::entities::user_story::NewUserStory;
use storyline::entities::{Epic, Requirement, UserStory};
use storyline::service::{
    DeleteOptions, NewComment, NewInlineComment, NewNamedType, NewStatusModel, NewTransition,
    SearchQuery, SearchSort, Service,
};
use tempfile::TempDir;

fn setup() -> (TempDir, Service, RequestContext) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.database.path = tmp.path().join("storyline.db");
    let service = Service::open(config, None).unwrap();
    service.initialize("admin").unwrap();
    let ctx = service.context_for("admin").unwrap();
    (tmp, service, ctx)
}

fn epic(service: &Service, ctx: &RequestContext, title: &str, description: Option<&str>) -> Epic {
    service
        .create_epic(
            ctx,
            NewEpic {
                title: title.to_string(),
                description: description.map(str::to_string),
                priority: None,
                status: None,
                assignee_id: None,
            },
        )
        .unwrap()
}

fn story(service: &Service, ctx: &RequestContext, epic: &Epic, title: &str) -> UserStory {
    service
        .create_user_story(
            ctx,
            &epic.reference_id.to_string(),
            NewUserStory {
                title: title.to_string(),
                description: None,
                priority: None,
                status: None,
                assignee_id: None,
            },
        )
        .unwrap()
}

fn requirement(
    service: &Service,
    ctx: &RequestContext,
    story: &UserStory,
    title: &str,
) -> Requirement {
    service
        .create_requirement(
            ctx,
            &story.reference_id.to_string(),
            NewRequirement {
                title: title.to_string(),
                description: None,
                priority: None,
                status: None,
                requirement_type: "functional".to_string(),
                assignee_id: None,
                acceptance_criteria: None,
            },
        )
        .unwrap()
}

// ============================================================================
// Reference IDs
// ============================================================================

#[test]
fn test_parallel_epic_creation_allocates_distinct_reference_ids() {
    let (_tmp, service, ctx) = setup();

    let refs: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let service = &service;
                let ctx = &ctx;
                scope.spawn(move || {
                    epic(service, ctx, &format!("Parallel {}", i), None)
                        .reference_id
                        .to_string()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let unique: BTreeSet<String> = refs.iter().cloned().collect();
    let expected: BTreeSet<String> = (1..=10).map(|n| format!("EP-{:03}", n)).collect();
    assert_eq!(unique.len(), 10, "duplicate reference IDs: {:?}", refs);
    assert_eq!(unique, expected);
}

#[test]
fn test_reference_ids_are_per_kind() {
    let (_tmp, service, ctx) = setup();
    let e = epic(&service, &ctx, "Checkout", None);
    let s1 = story(&service, &ctx, &e, "Pay by card");
    let s2 = story(&service, &ctx, &e, "Pay by invoice");
    assert_eq!(e.reference_id.to_string(), "EP-001");
    assert_eq!(s1.reference_id.to_string(), "US-001");
    assert_eq!(s2.reference_id.to_string(), "US-002");
    assert_eq!(s1.epic_id, e.id);
}

// ============================================================================
// Relationships
// ============================================================================

#[test]
fn test_cycle_prevention_is_per_relationship_type() {
    let (_tmp, service, ctx) = setup();
    let e = epic(&service, &ctx, "Platform", None);
    let s = story(&service, &ctx, &e, "Login");
    let a = requirement(&service, &ctx, &s, "A");
    let b = requirement(&service, &ctx, &s, "B");
    let c = requirement(&service, &ctx, &s, "C");
    let (a, b, c) = (
        a.reference_id.to_string(),
        b.reference_id.to_string(),
        c.reference_id.to_string(),
    );

    service.create_relationship(&ctx, &a, &b, "depends_on").unwrap();
    service.create_relationship(&ctx, &b, &c, "depends_on").unwrap();

    let err = service
        .create_relationship(&ctx, &c, &a, "depends_on")
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Cycle);

    let edge = service.create_relationship(&ctx, &c, &a, "relates_to").unwrap();
    assert_eq!(edge.relationship_type, "relates_to");
    assert_eq!(edge.source_reference_id.to_string(), c);

    assert!(service.detect_cycles(&ctx, Some("depends_on")).unwrap().is_empty());
}

#[test]
fn test_self_and_duplicate_relationships_rejected() {
    let (_tmp, service, ctx) = setup();
    let e = epic(&service, &ctx, "Platform", None);
    let s = story(&service, &ctx, &e, "Login");
    let a = requirement(&service, &ctx, &s, "A").reference_id.to_string();
    let b = requirement(&service, &ctx, &s, "B").reference_id.to_string();

    let err = service.create_relationship(&ctx, &a, &a, "depends_on").unwrap_err();
    assert_eq!(err.code(), ErrorCode::CircularRelationship);

    service.create_relationship(&ctx, &a, &b, "blocks").unwrap();
    let err = service.create_relationship(&ctx, &a, &b, "BLOCKS").unwrap_err();
    assert_eq!(err.code(), ErrorCode::DuplicateRelationship);

    let err = service.create_relationship(&ctx, &a, &b, "mentions").unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    let edges = service.list_relationships(&ctx, &b).unwrap();
    assert!(edges.source_edges.is_empty());
    assert_eq!(edges.target_edges.len(), 1);
}

// ============================================================================
// Comments
// ============================================================================

#[test]
fn test_inline_comment_goes_stale_when_anchor_text_disappears() {
    let (_tmp, service, ctx) = setup();
    let original = "The system implements OAuth 2.0 authentication flow for login.";
    let e = epic(&service, &ctx, "Auth", Some(original));
    let key = e.reference_id.to_string();

    let comment = service
        .create_inline_comment(
            &ctx,
            NewInlineComment {
                entity_type: EntityKind::Epic,
                entity: key.clone(),
                content: "Which grant types?".to_string(),
                linked_text: "OAuth 2.0 authentication flow".to_string(),
                text_position_start: 22,
                text_position_end: 51,
            },
        )
        .unwrap();
    assert!(!comment.is_stale);

    let updated = "The system implements SAML authentication flow for login.";
    let would_strand = service
        .validate_inline_anchors(&ctx, EntityKind::Epic, &key, updated)
        .unwrap();
    assert_eq!(would_strand.len(), 1);

    service
        .update_epic(
            &ctx,
            &key,
            EpicUpdate {
                description: Some(updated.to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    let stored = service.get_comment(&ctx, &comment.id.to_string()).unwrap();
    assert!(stored.is_stale);
    let visible = service
        .get_visible_inline_comments(&ctx, EntityKind::Epic, &key)
        .unwrap();
    assert!(visible.is_empty());
}

#[test]
fn test_inline_comment_rejects_empty_or_mismatched_span() {
    let (_tmp, service, ctx) = setup();
    let e = epic(&service, &ctx, "Auth", Some("Users log in with a password."));
    let inline = |start, end, text: &str| NewInlineComment {
        entity_type: EntityKind::Epic,
        entity: e.reference_id.to_string(),
        content: "?".to_string(),
        linked_text: text.to_string(),
        text_position_start: start,
        text_position_end: end,
    };

    let err = service.create_inline_comment(&ctx, inline(6, 6, "")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let err = service
        .create_inline_comment(&ctx, inline(0, 5, "Admins"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    assert!(service.create_inline_comment(&ctx, inline(0, 5, "Users")).is_ok());
}

#[test]
fn test_reply_depth_is_capped() {
    let (_tmp, service, ctx) = setup();
    let e = epic(&service, &ctx, "Threads", None);
    let root = service
        .create_comment(
            &ctx,
            NewComment {
                entity_type: EntityKind::Epic,
                entity: e.reference_id.to_string(),
                content: "root".to_string(),
                parent_comment_id: None,
            },
        )
        .unwrap();
    let first = service.reply_to_comment(&ctx, &root.id.to_string(), "one").unwrap();
    let second = service.reply_to_comment(&ctx, &first.id.to_string(), "two").unwrap();
    assert_eq!(second.depth, 2);

    let err = service
        .reply_to_comment(&ctx, &second.id.to_string(), "three")
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let thread = service.get_thread(&ctx, &root.id.to_string()).unwrap();
    assert_eq!(thread.count(), 3);

    assert_eq!(service.delete_comment(&ctx, &root.id.to_string()).unwrap(), 3);
}

#[test]
fn test_resolve_is_idempotent_and_reversible() {
    let (_tmp, service, ctx) = setup();
    let e = epic(&service, &ctx, "Threads", None);
    let comment = service
        .create_comment(
            &ctx,
            NewComment {
                entity_type: EntityKind::Epic,
                entity: e.reference_id.to_string(),
                content: "Open question".to_string(),
                parent_comment_id: None,
            },
        )
        .unwrap();
    let id = comment.id.to_string();

    let first = service.resolve_comment(&ctx, &id).unwrap();
    assert!(first.is_resolved);
    assert_eq!(first.resolved_by, Some(ctx.principal().unwrap().user_id));
    let second = service.resolve_comment(&ctx, &id).unwrap();
    assert_eq!(second.resolved_at, first.resolved_at);

    let reopened = service.unresolve_comment(&ctx, &id).unwrap();
    assert!(!reopened.is_resolved);
    assert!(reopened.resolved_by.is_none());
    assert!(reopened.resolved_at.is_none());
}

#[test]
fn test_repeated_update_is_idempotent() {
    let (_tmp, service, ctx) = setup();
    let e = epic(&service, &ctx, "Billing", None);
    let key = e.reference_id.to_string();
    let update = || EpicUpdate {
        title: Some("Billing v2".to_string()),
        ..Default::default()
    };
    let once = service.update_epic(&ctx, &key, update()).unwrap();
    let twice = service.update_epic(&ctx, &key, update()).unwrap();
    assert_eq!(once.title, "Billing v2");
    assert_eq!(once, twice);
}

// ============================================================================
// Workflow
// ============================================================================

#[test]
fn test_status_transitions_follow_the_workflow() {
    let (_tmp, service, ctx) = setup();
    let e = epic(&service, &ctx, "Release", None);
    let key = e.reference_id.to_string();
    assert_eq!(e.status, "Backlog");

    let err = service.change_epic_status(&ctx, &key, "Done").unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
    assert!(err.to_string().contains("Backlog→Done"), "{}", err);

    let moved = service.change_epic_status(&ctx, &key, "InProgress").unwrap();
    assert_eq!(moved.status, "InProgress");

    let again = service.change_epic_status(&ctx, &key, "InProgress").unwrap();
    assert_eq!(again.status, "InProgress");
    assert_eq!(again.updated_at, moved.updated_at);

    let err = service.change_epic_status(&ctx, &key, "Shipped").unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[test]
fn test_entity_transitions_report_next_steps() {
    let (_tmp, service, ctx) = setup();
    let e = epic(&service, &ctx, "Release", None);
    let (status, allowed) = service
        .entity_transitions(&ctx, EntityKind::Epic, &e.reference_id.to_string())
        .unwrap();
    assert_eq!(status, "Backlog");
    assert!(allowed.contains(&"InProgress".to_string()));
    assert!(!allowed.contains(&"Done".to_string()));
}

fn status(name: &str, is_initial: bool, is_final: bool) -> NewStatus {
    NewStatus {
        name: name.to_string(),
        is_initial,
        is_final,
        ..Default::default()
    }
}

fn default_model_id(service: &Service, ctx: &RequestContext, kind: EntityKind) -> String {
    service
        .list_status_models(ctx, Some(kind))
        .unwrap()
        .into_iter()
        .find(|m| m.is_default)
        .unwrap()
        .id
        .to_string()
}

/// A second epic model: Open (initial) → Closed (final)
fn lean_epic_model(service: &Service, ctx: &RequestContext) -> String {
    let model = service
        .create_status_model(
            ctx,
            NewStatusModel {
                entity_type: EntityKind::Epic,
                name: "Lean".to_string(),
                description: None,
            },
        )
        .unwrap();
    let key = model.id.to_string();
    service.add_status(ctx, &key, status("Open", true, false)).unwrap();
    service.add_status(ctx, &key, status("Closed", false, true)).unwrap();
    service
        .add_transition(
            ctx,
            &key,
            NewTransition {
                from: "Open".to_string(),
                to: "Closed".to_string(),
                name: None,
            },
        )
        .unwrap();
    key
}

#[test]
fn test_default_switch_strands_entities_until_reconciled() {
    let (_tmp, service, ctx) = setup();
    let e = epic(&service, &ctx, "Release", None);
    let key = e.reference_id.to_string();
    service.change_epic_status(&ctx, &key, "InProgress").unwrap();

    let lean = lean_epic_model(&service, &ctx);
    service.set_default_status_model(&ctx, &lean).unwrap();

    let stranded = service.list_unreconciled(&ctx, EntityKind::Epic).unwrap();
    assert_eq!(stranded.len(), 1);
    assert_eq!(stranded[0].id, e.id);
    assert_eq!(stranded[0].status, "InProgress");

    let err = service.change_epic_status(&ctx, &key, "Closed").unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
    // Re-asserting the current status stays a no-op
    let same = service.change_epic_status(&ctx, &key, "InProgress").unwrap();
    assert_eq!(same.status, "InProgress");

    let err = service
        .reconcile_status(&ctx, EntityKind::Epic, &key, "Shipped")
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert_eq!(
        service.reconcile_status(&ctx, EntityKind::Epic, &key, "Open").unwrap(),
        key
    );
    assert!(service.list_unreconciled(&ctx, EntityKind::Epic).unwrap().is_empty());

    let closed = service.change_epic_status(&ctx, &key, "Closed").unwrap();
    assert_eq!(closed.status, "Closed");
}

#[test]
fn test_model_without_initial_status_cannot_become_default() {
    let (_tmp, service, ctx) = setup();
    let model = service
        .create_status_model(
            &ctx,
            NewStatusModel {
                entity_type: EntityKind::Epic,
                name: "Headless".to_string(),
                description: None,
            },
        )
        .unwrap();
    let key = model.id.to_string();

    let err = service.set_default_status_model(&ctx, &key).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    service.add_status(&ctx, &key, status("Open", false, false)).unwrap();
    let validation = service.validate_status_model(&ctx, &key).unwrap();
    assert!(!validation.valid);
    let err = service.set_default_status_model(&ctx, &key).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
    assert_ne!(default_model_id(&service, &ctx, EntityKind::Epic), key);
}

#[test]
fn test_status_in_use_cannot_be_deleted() {
    let (_tmp, service, ctx) = setup();
    let model = default_model_id(&service, &ctx, EntityKind::Epic);

    let err = service.delete_status(&ctx, &model, "Done").unwrap_err();
    assert_eq!(err.code(), ErrorCode::InUse);

    service.add_status(&ctx, &model, status("Parked", false, false)).unwrap();
    let e = epic(&service, &ctx, "Release", None);
    let key = e.reference_id.to_string();
    service
        .reconcile_status(&ctx, EntityKind::Epic, &key, "Parked")
        .unwrap();
    let err = service.delete_status(&ctx, &model, "Parked").unwrap_err();
    assert_eq!(err.code(), ErrorCode::InUse);

    service
        .reconcile_status(&ctx, EntityKind::Epic, &key, "Backlog")
        .unwrap();
    let deleted = service.delete_status(&ctx, &model, "Parked").unwrap();
    assert_eq!(deleted.name, "Parked");
}

#[test]
fn test_renaming_a_default_status_moves_its_entities() {
    let (_tmp, service, ctx) = setup();
    let e = epic(&service, &ctx, "Release", None);
    let key = e.reference_id.to_string();
    let model = default_model_id(&service, &ctx, EntityKind::Epic);

    let renamed = service
        .update_status(
            &ctx,
            &model,
            "Backlog",
            StatusUpdate {
                name: Some("Todo".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(renamed.name, "Todo");
    assert_eq!(service.get_epic(&ctx, &key).unwrap().status, "Todo");
    assert!(service.list_unreconciled(&ctx, EntityKind::Epic).unwrap().is_empty());

    let moved = service.change_epic_status(&ctx, &key, "InProgress").unwrap();
    assert_eq!(moved.status, "InProgress");
}

// ============================================================================
// Reference data
// ============================================================================

#[test]
fn test_types_in_use_cannot_be_deleted() {
    let (_tmp, service, ctx) = setup();
    let e = epic(&service, &ctx, "Checkout", None);
    let s = story(&service, &ctx, &e, "Pay by card");
    let a = requirement(&service, &ctx, &s, "Card form");
    let b = requirement(&service, &ctx, &s, "Card vault");
    service
        .create_relationship(
            &ctx,
            &a.reference_id.to_string(),
            &b.reference_id.to_string(),
            "depends_on",
        )
        .unwrap();

    let err = service
        .delete_type(&ctx, TypeTable::Requirement, "functional")
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InUse);
    let err = service
        .delete_type(&ctx, TypeTable::Relationship, "depends_on")
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InUse);

    service
        .create_type(
            &ctx,
            TypeTable::Requirement,
            NewNamedType {
                name: "Security".to_string(),
                description: None,
            },
        )
        .unwrap();
    let deleted = service
        .delete_type(&ctx, TypeTable::Requirement, "Security")
        .unwrap();
    assert_eq!(deleted.name, "Security");
    assert_eq!(
        service
            .get_type(&ctx, TypeTable::Requirement, "Security")
            .unwrap_err()
            .code(),
        ErrorCode::NotFound
    );
}

// ============================================================================
// Deletion
// ============================================================================

#[test]
fn test_cascading_deletion_report_and_execution() {
    let (_tmp, service, ctx) = setup();
    let e = epic(&service, &ctx, "Checkout", None);
    let us1 = story(&service, &ctx, &e, "Pay by card");
    let us2 = story(&service, &ctx, &e, "Pay by invoice");
    service
        .create_acceptance_criteria(
            &ctx,
            &us1.reference_id.to_string(),
            NewAcceptanceCriteria {
                description: "WHEN the card is declined THE SYSTEM SHALL show a retry option"
                    .to_string(),
            },
        )
        .unwrap();
    let r1 = requirement(&service, &ctx, &us1, "Card form");
    let r2 = requirement(&service, &ctx, &us2, "Invoice PDF");
    service
        .create_relationship(
            &ctx,
            &r1.reference_id.to_string(),
            &r2.reference_id.to_string(),
            "depends_on",
        )
        .unwrap();
    service
        .create_comment(
            &ctx,
            NewComment {
                entity_type: EntityKind::Epic,
                entity: "EP-001".to_string(),
                content: "Scope for Q3".to_string(),
                parent_comment_id: None,
            },
        )
        .unwrap();

    let report = service
        .validate_deletion(&ctx, EntityKind::Epic, "EP-001")
        .unwrap();
    assert!(report.can_delete);
    assert_eq!(report.dependencies.len(), 7);
    assert_eq!(report.count_of(RecordKind::UserStory), 2);
    assert_eq!(report.count_of(RecordKind::AcceptanceCriteria), 1);
    assert_eq!(report.count_of(RecordKind::Requirement), 2);
    assert_eq!(report.count_of(RecordKind::Relationship), 1);
    assert_eq!(report.count_of(RecordKind::Comment), 1);

    let err = service
        .delete_entity(&ctx, EntityKind::Epic, "EP-001", DeleteOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::HasDependencies { .. }));
    assert_eq!(err.code(), ErrorCode::HasDependencies);

    let dry = service
        .delete_entity(
            &ctx,
            EntityKind::Epic,
            "EP-001",
            DeleteOptions {
                cascade: true,
                dry_run: true,
            },
        )
        .unwrap();
    assert!(!dry.committed);
    assert_eq!(dry.total(), 8);
    assert!(service.get_epic(&ctx, "EP-001").is_ok());

    let done = service
        .delete_entity(
            &ctx,
            EntityKind::Epic,
            "EP-001",
            DeleteOptions {
                cascade: true,
                dry_run: false,
            },
        )
        .unwrap();
    assert!(done.committed);
    assert_eq!(done.total(), 8);

    let err = service.get_epic(&ctx, "EP-001").unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
    let err = service
        .get_requirement(&ctx, &r2.reference_id.to_string())
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[test]
fn test_leaf_deletion_needs_no_cascade() {
    let (_tmp, service, ctx) = setup();
    let e = epic(&service, &ctx, "Lonely", None);
    let report = service
        .delete_entity(
            &ctx,
            EntityKind::Epic,
            &e.reference_id.to_string(),
            DeleteOptions::default(),
        )
        .unwrap();
    assert!(report.committed);
    assert_eq!(report.total(), 1);
}

// ============================================================================
// Search
// ============================================================================

#[test]
fn test_search_ranks_title_matches_and_caches_responses() {
    let (_tmp, service, ctx) = setup();
    for i in 0..6 {
        epic(&service, &ctx, &format!("Reporting dashboard {}", i), None);
    }
    let first = epic(&service, &ctx, "Authentication", None);
    let second = epic(&service, &ctx, "Authentication", None);
    let third = epic(&service, &ctx, "Authentication", None);
    let body_only = epic(
        &service,
        &ctx,
        "Login screen",
        Some("Covers authentication for returning users"),
    );

    let mut query = SearchQuery::new("authentication");
    query.entity_types = vec![RecordKind::Epic];
    query.sort_by = SearchSort::Relevance;

    let (body, cache_hit) = service.search_raw(&ctx, &query).unwrap();
    assert!(!cache_hit);
    let response = service.search(&ctx, &query).unwrap();
    assert!(response.cache_hit);
    assert_eq!(response.total_count, 4);
    let order: Vec<_> = response.data.iter().map(|h| h.id).collect();
    assert_eq!(order, vec![third.id, second.id, first.id, body_only.id]);

    let (again, cache_hit) = service.search_raw(&ctx, &query).unwrap();
    assert!(cache_hit);
    assert_eq!(again, body);

    service
        .update_epic(
            &ctx,
            &first.reference_id.to_string(),
            EpicUpdate {
                title: Some("Authentication revamp".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    let (_, cache_hit) = service.search_raw(&ctx, &query).unwrap();
    assert!(!cache_hit);
}

#[test]
fn test_search_offset_far_past_the_end_returns_total() {
    let (_tmp, service, ctx) = setup();
    for i in 0..3 {
        epic(&service, &ctx, &format!("Authentication {}", i), None);
    }
    let mut query = SearchQuery::new("authentication");
    query.page = Page::new(Some(10), Some(i64::MAX)).unwrap();

    let response = service.search(&ctx, &query).unwrap();
    assert!(response.data.is_empty());
    assert_eq!(response.total_count, 3);
    assert_eq!(response.offset, i64::MAX);
}

#[test]
fn test_search_query_page_is_validated_when_deserialized() {
    let mut value = serde_json::to_value(SearchQuery::new("auth")).unwrap();
    value["page"]["limit"] = serde_json::json!(0);
    assert!(serde_json::from_value::<SearchQuery>(value.clone()).is_err());

    value["page"]["limit"] = serde_json::json!(20);
    let query: SearchQuery = serde_json::from_value(value).unwrap();
    assert_eq!(query.page.limit(), 20);
}

#[test]
fn test_write_after_cached_search_is_visible() {
    let (_tmp, service, ctx) = setup();
    epic(&service, &ctx, "Authentication", None);
    let query = SearchQuery::new("authentication");

    assert_eq!(service.search(&ctx, &query).unwrap().total_count, 1);
    assert!(service.search(&ctx, &query).unwrap().cache_hit);

    epic(&service, &ctx, "Authentication audit", None);
    let fresh = service.search(&ctx, &query).unwrap();
    assert!(!fresh.cache_hit);
    assert_eq!(fresh.total_count, 2);
}

#[test]
fn test_suggest_needs_two_characters() {
    let (_tmp, service, ctx) = setup();
    epic(&service, &ctx, "Authentication", None);
    assert_eq!(
        service.suggest(&ctx, "a", None).unwrap_err().code(),
        ErrorCode::ValidationError
    );
    let suggestions = service.suggest(&ctx, "Auth", None).unwrap();
    assert_eq!(suggestions.titles.len(), 1);
    let by_ref = service.suggest(&ctx, "EP-0", None).unwrap();
    assert_eq!(by_ref.reference_ids.len(), 1);
}

// ============================================================================
// Paging and roles
// ============================================================================

#[test]
fn test_page_bounds() {
    assert!(Page::new(Some(0), None).is_err());
    assert!(Page::new(Some(101), None).is_err());
    assert!(Page::new(None, Some(-1)).is_err());
    assert!(Page::new(Some(100), Some(0)).is_ok());
}

#[test]
fn test_offset_past_the_end_returns_empty_page_with_total() {
    let (_tmp, service, ctx) = setup();
    for i in 0..3 {
        epic(&service, &ctx, &format!("Epic {}", i), None);
    }
    let query = ListQuery {
        page: Page::new(Some(10), Some(50)).unwrap(),
        ..Default::default()
    };
    let page = service.list_epics(&ctx, &query).unwrap();
    assert!(page.data.is_empty());
    assert_eq!(page.total_count, 3);
}

#[test]
fn test_commenter_cannot_write_entities() {
    let (_tmp, service, ctx) = setup();
    let e = epic(&service, &ctx, "Visible", None);
    service
        .create_user(
            &ctx,
            NewUser {
                username: "carol".to_string(),
                display_name: None,
                email: None,
                role: Role::Commenter,
            },
        )
        .unwrap();
    let carol = service.context_for("carol").unwrap();

    let err = service
        .create_epic(
            &carol,
            NewEpic {
                title: "Nope".to_string(),
                description: None,
                priority: None,
                status: None,
                assignee_id: None,
            },
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InsufficientPermissions);

    assert!(service.get_epic(&carol, &e.reference_id.to_string()).is_ok());
    assert!(service
        .create_comment(
            &carol,
            NewComment {
                entity_type: EntityKind::Epic,
                entity: e.reference_id.to_string(),
                content: "Looks good".to_string(),
                parent_comment_id: None,
            },
        )
        .is_ok());
}

#[test]
fn test_last_administrator_is_protected() {
    let (_tmp, service, ctx) = setup();
    let err = service
        .update_user_role(&ctx, "admin", Role::User)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
}

#[test]
fn test_initialize_is_idempotent() {
    let (_tmp, service, _ctx) = setup();
    let again = service.initialize("admin").unwrap();
    assert!(again.seed.is_empty());
    assert!(!again.admin_created);
}
