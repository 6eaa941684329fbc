//! End-to-end tests for the entity graph against an in-memory database

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use entigraph_core::domain::graph::{
    AliasSpec, AliasType, DetectorConfig, Entity, EntityLinker, EntityRecord, EntityType,
    ExportFormat, GraphOrchestrator, GraphRepository, GraphTable, InsightKind, IntegrityRepository,
    IntegrityValidator, JsonExport, KeywordExtractor, KeywordTerm, LinkedEntity, LinkerConfig,
    MatchKind, MentionRecord, Message, RelationshipCandidate, RelationshipDetector,
    RelationshipRecord, RelationshipType, SearchOptions, ValidationType,
};
use entigraph_core::infrastructure::graph::{SqliteGraphRepository, SqliteMessageSource};
use entigraph_core::storage::Database;
use entigraph_core::Error;

async fn setup() -> (Database, Arc<SqliteGraphRepository>) {
    let db = Database::in_memory().await.unwrap();
    let repo = Arc::new(SqliteGraphRepository::new(db.pool().clone()));
    (db, repo)
}

fn gazetteer() -> KeywordExtractor {
    KeywordExtractor::new(vec![
        KeywordTerm::new("John Doe", EntityType::Person),
        KeywordTerm::new("Alice", EntityType::Person),
        KeywordTerm::new("Bob", EntityType::Person),
        KeywordTerm::new("Carol", EntityType::Person),
        KeywordTerm::new("Acme Corp", EntityType::Organization),
        KeywordTerm::new("Rust", EntityType::Technical),
        KeywordTerm::new("PostgreSQL", EntityType::Technical),
        KeywordTerm::new("Kubernetes", EntityType::Technical),
    ])
}

fn orchestrator(repo: Arc<SqliteGraphRepository>) -> GraphOrchestrator<SqliteGraphRepository> {
    GraphOrchestrator::new(repo, Arc::new(gazetteer()))
}

// ========== Linking ==========

#[tokio::test]
async fn test_same_name_and_type_resolves_to_one_entity() {
    let (_db, repo) = setup().await;
    let linker = EntityLinker::new(repo.clone());

    let first = linker.create_entity("Acme Corp", EntityType::Organization, 0.9).await.unwrap();
    let again = linker.create_entity("  acme   CORP ", EntityType::Organization, 0.9).await.unwrap();
    assert_eq!(first.id, again.id);

    let link = linker.link_entity("ACME corp", EntityType::Organization).await.unwrap();
    assert!(!link.should_create_new);
    assert_eq!(link.linked_entity.unwrap().id, first.id);
    assert_eq!(link.candidates[0].match_kind, MatchKind::Exact);

    // type is part of identity
    let product = linker.create_entity("Acme Corp", EntityType::Product, 0.9).await.unwrap();
    assert_ne!(product.id, first.id);
    assert_eq!(repo.list_entities().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_fuzzy_threshold_boundary() {
    let (_db, repo) = setup().await;
    let mut linker = EntityLinker::new(repo.clone());
    let entity = linker.create_entity("JavaScript", EntityType::Concept, 0.9).await.unwrap();

    let link = linker.link_entity("JavaSkript", EntityType::Concept).await.unwrap();
    assert_eq!(link.linked_entity.as_ref().map(|e| e.id.as_str()), Some(entity.id.as_str()));
    assert_eq!(link.candidates[0].match_kind, MatchKind::Fuzzy);

    // three edits out of ten sits exactly on the default 0.7 threshold
    let link = linker.link_entity("JavaSxxxpt", EntityType::Concept).await.unwrap();
    assert!(!link.should_create_new);
    let link = linker.link_entity("JavaXxxxpt", EntityType::Concept).await.unwrap();
    assert!(link.should_create_new);
    assert!(link.linked_entity.is_none());

    linker.set_config(LinkerConfig {
        similarity_threshold: 0.9,
        ..Default::default()
    });
    let link = linker.link_entity("JavaSkript", EntityType::Concept).await.unwrap();
    assert!(!link.should_create_new);
    let link = linker.link_entity("JavaSkripd", EntityType::Concept).await.unwrap();
    assert!(link.should_create_new);
}

#[tokio::test]
async fn test_alias_resolution_is_case_insensitive() {
    let (_db, repo) = setup().await;
    let linker = EntityLinker::new(repo.clone());
    let entity = linker.create_entity("PostgreSQL", EntityType::Technical, 0.9).await.unwrap();
    linker
        .create_alias(&entity.id, "pg", entigraph_core::domain::graph::AliasType::Abbreviation, 0.8)
        .await
        .unwrap();

    let link = linker.link_entity("PG", EntityType::Technical).await.unwrap();
    assert_eq!(link.candidates[0].match_kind, MatchKind::Alias);
    assert_eq!(link.linked_entity.unwrap().id, entity.id);

    let link = linker.link_entity("pg", EntityType::Organization).await.unwrap();
    assert!(link.should_create_new);
}

// ========== Relationships ==========

#[tokio::test]
async fn test_relationship_triple_folds_and_strength_stays_bounded() {
    let (_db, repo) = setup().await;
    let linker = EntityLinker::new(repo.clone());
    let detector = RelationshipDetector::new(repo.clone());
    let john = linker.create_entity("John Doe", EntityType::Person, 0.9).await.unwrap();
    let acme = linker.create_entity("Acme Corp", EntityType::Organization, 0.9).await.unwrap();

    let candidate = RelationshipCandidate::new(&john.id, &acme.id, RelationshipType::WorksFor, 3.5)
        .with_message("m1");
    let stored = detector.store_relationship(&candidate).await.unwrap();
    assert!((0.0..=1.0).contains(&stored.strength));
    assert_eq!(stored.mention_count, 1);

    let candidate = RelationshipCandidate::new(&john.id, &acme.id, RelationshipType::WorksFor, -2.0)
        .with_message("m2");
    let folded = detector.store_relationship(&candidate).await.unwrap();
    assert_eq!(folded.id, stored.id);
    assert_eq!(folded.mention_count, 2);
    assert!((0.0..=1.0).contains(&folded.strength));
    assert_eq!(folded.context_messages, vec!["m1".to_string(), "m2".to_string()]);

    let self_loop = RelationshipCandidate::new(&john.id, &john.id, RelationshipType::RelatedTo, 0.5);
    assert!(matches!(
        detector.store_relationship(&self_loop).await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_co_occurrence_distance_boundary() {
    let (_db, repo) = setup().await;
    let detector = RelationshipDetector::new(repo).with_config(DetectorConfig {
        max_co_occurrence_distance: 50,
        min_relationship_strength: 0.0,
        ..Default::default()
    });
    let content = "x".repeat(120);
    let now = Utc::now();

    let at_limit = [
        LinkedEntity::new("a", EntityType::Person, 0, 5),
        LinkedEntity::new("b", EntityType::Organization, 50, 55),
    ];
    let detection = detector.detect("m1", &content, &at_limit, now).unwrap();
    assert_eq!(detection.co_occurrences.len(), 1);
    assert_eq!(detection.co_occurrences[0].distance, 50);
    assert_eq!(detection.relationships.len(), 1);

    let past_limit = [
        LinkedEntity::new("a", EntityType::Person, 0, 5),
        LinkedEntity::new("b", EntityType::Organization, 51, 56),
    ];
    let detection = detector.detect("m1", &content, &past_limit, now).unwrap();
    assert!(detection.co_occurrences.is_empty());
    assert!(detection.relationships.is_empty());
}

#[tokio::test]
async fn test_confidence_decreases_with_distance() {
    let (_db, repo) = setup().await;
    let detector = RelationshipDetector::new(repo);
    let mut previous = f64::INFINITY;
    for distance in [0, 10, 50, 100, 200] {
        let confidence = detector.confidence(distance, 0);
        assert!(confidence <= previous);
        assert!((0.0..=1.0).contains(&confidence));
        previous = confidence;
    }
    assert!(detector.confidence(0, 10) <= 1.0);
}

#[tokio::test]
async fn test_failed_edge_store_keeps_committed_edges() {
    let (_db, repo) = setup().await;
    let linker = EntityLinker::new(repo.clone());
    let detector = RelationshipDetector::new(repo.clone());
    let john = linker.create_entity("John Doe", EntityType::Person, 0.9).await.unwrap();
    let acme = linker.create_entity("Acme Corp", EntityType::Organization, 0.9).await.unwrap();

    // "Ghost" was linked but its entity is gone by the time edges are stored
    let content = "John Doe works at Acme Corp with Ghost";
    let linked = [
        LinkedEntity::new(&john.id, EntityType::Person, 0, 8),
        LinkedEntity::new(&acme.id, EntityType::Organization, 18, 27),
        LinkedEntity::new("ghost", EntityType::Person, 33, 38),
    ];
    let analysis = detector
        .analyze_message_at("m1", "c1", content, &linked, Utc::now())
        .await
        .unwrap();

    assert_eq!(analysis.co_occurrences.len(), 3);
    assert_eq!(analysis.detected_relationships.len(), 1);
    assert_eq!(analysis.failures.len(), 2);
    assert!(analysis.failures.iter().all(|f| f.contains("ghost")));

    let edge = &analysis.detected_relationships[0];
    assert_eq!(edge.relationship_type, RelationshipType::WorksFor);
    assert_eq!(edge.source_entity_id, john.id);
    assert_eq!(edge.target_entity_id, acme.id);

    let stored = repo.list_relationships().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, edge.id);
}

// ========== Message processing ==========

#[tokio::test]
async fn test_works_for_detected_from_message() {
    let (_db, repo) = setup().await;
    let orchestrator = orchestrator(repo.clone());

    let result = orchestrator
        .process_message("m1", "c1", "John Doe works at Acme Corp")
        .await
        .unwrap();
    assert_eq!(result.entities_extracted, 2);
    assert_eq!(result.entities_created, 2);
    assert!(result.failures.is_empty());

    let works_for = result
        .relationships
        .iter()
        .find(|r| r.relationship_type == RelationshipType::WorksFor)
        .expect("works_for edge");
    assert!(works_for.strength > 0.5);

    let john = result.entities.iter().find(|e| e.name == "John Doe").unwrap();
    let acme = result.entities.iter().find(|e| e.name == "Acme Corp").unwrap();
    assert_eq!(works_for.source_entity_id, john.id);
    assert_eq!(works_for.target_entity_id, acme.id);

    // a second message reuses both entities and folds the edge
    let again = orchestrator
        .process_message("m2", "c1", "Acme Corp hired John Doe last year")
        .await
        .unwrap();
    assert_eq!(again.entities_created, 0);
    let edges = repo.list_relationships().await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].mention_count, 2);

    let john = repo.get_entity(&john.id).await.unwrap().unwrap();
    assert_eq!(john.mention_count, 2);
}

#[tokio::test]
async fn test_collaboration_and_stack_insights() {
    let (_db, repo) = setup().await;
    let orchestrator = orchestrator(repo);

    let result = orchestrator
        .process_message("m1", "c1", "Alice, Bob and Carol paired on the release")
        .await
        .unwrap();
    let collaboration: Vec<_> = result
        .insights
        .iter()
        .filter(|i| i.kind == InsightKind::CollaborationNetwork)
        .collect();
    assert_eq!(collaboration.len(), 1);
    assert_eq!(collaboration[0].entity_ids.len(), 3);

    let result = orchestrator
        .process_message("m2", "c1", "We run Rust services on Kubernetes backed by PostgreSQL")
        .await
        .unwrap();
    assert!(result.insights.iter().any(|i| i.kind == InsightKind::TechnologyStack));
    assert!(!result.insights.iter().any(|i| i.kind == InsightKind::CollaborationNetwork));
}

#[tokio::test]
async fn test_hub_entity_insight() {
    let (_db, repo) = setup().await;
    let orchestrator = orchestrator(repo);

    // three people: two edges each, one short of the default hub threshold
    let result = orchestrator
        .process_message("m1", "c1", "Alice, Bob and Carol met")
        .await
        .unwrap();
    assert_eq!(result.relationships_detected, 3);
    assert!(!result.insights.iter().any(|i| i.kind == InsightKind::HubEntity));

    let result = orchestrator
        .process_message("m2", "c1", "Alice, Bob, Carol and John Doe met")
        .await
        .unwrap();
    let hubs: Vec<_> = result
        .insights
        .iter()
        .filter(|i| i.kind == InsightKind::HubEntity)
        .collect();
    assert_eq!(hubs.len(), 4);
    for hub in hubs {
        assert_eq!(hub.entity_ids.len(), 1);
        assert!((0.0..=1.0).contains(&hub.confidence));
    }
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let (_db, repo) = setup().await;
    let orchestrator = orchestrator(repo);
    assert!(matches!(
        orchestrator.process_message("m1", "c1", "   ").await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_message_without_entities() {
    let (_db, repo) = setup().await;
    let orchestrator = orchestrator(repo);
    let result = orchestrator
        .process_message("m1", "c1", "nothing to see here")
        .await
        .unwrap();
    assert_eq!(result.entities_extracted, 0);
    assert_eq!(result.relationships_detected, 0);
    assert!(result.insights.is_empty());
}

// ========== Conversations ==========

#[tokio::test]
async fn test_conversation_key_person() {
    let (db, repo) = setup().await;
    let messages = Arc::new(SqliteMessageSource::new(db.pool().clone()));
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let contents = [
        "Alice fixed the build",
        "Alice reviewed the patch",
        "Carol joined late",
        "Alice shipped the release",
        "Alice talked to Bob about it",
    ];
    // stored out of order; processing must follow timestamps
    for (i, content) in contents.iter().enumerate().rev() {
        let message = Message::new(
            format!("m{}", i),
            "c1",
            *content,
            base + Duration::minutes(i as i64),
        );
        messages.store_message(&message).await.unwrap();
    }

    let orchestrator = orchestrator(repo.clone()).with_message_source(messages);
    let result = orchestrator.process_conversation("c1").await.unwrap();
    assert_eq!(result.messages_processed, 5);
    assert_eq!(result.messages_failed, 0);

    let key_persons: Vec<_> = result
        .insights
        .iter()
        .filter(|i| i.kind == InsightKind::KeyPerson)
        .collect();
    assert_eq!(key_persons.len(), 1);
    assert_eq!(key_persons[0].entity_names, vec!["Alice".to_string()]);

    let alice = repo
        .find_entity_by_normalized_name("alice", EntityType::Person)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice.mention_count, 4);
    assert_eq!(alice.last_mentioned_at, Some(base + Duration::minutes(4)));
}

#[tokio::test]
async fn test_unknown_conversation() {
    let (db, repo) = setup().await;
    let messages = Arc::new(SqliteMessageSource::new(db.pool().clone()));
    let orchestrator = orchestrator(repo).with_message_source(messages);
    assert!(matches!(
        orchestrator.process_conversation("missing").await,
        Err(Error::ConversationNotFound(_))
    ));
}

// ========== Merge ==========

#[tokio::test]
async fn test_merge_unions_graph_and_redirects_name() {
    let (_db, repo) = setup().await;
    let orchestrator = orchestrator(repo.clone());
    orchestrator
        .process_message("m1", "c1", "John Doe works at Acme Corp")
        .await
        .unwrap();
    orchestrator
        .process_message("m2", "c1", "Alice works at Acme Corp and uses Rust")
        .await
        .unwrap();

    let john = repo
        .find_entity_by_normalized_name("john doe", EntityType::Person)
        .await
        .unwrap()
        .unwrap();
    let alice = repo
        .find_entity_by_normalized_name("alice", EntityType::Person)
        .await
        .unwrap()
        .unwrap();
    let before_target = repo.list_mentions(&alice.id).await.unwrap().len();
    let before_source = repo.list_mentions(&john.id).await.unwrap().len();

    let outcome = orchestrator.linker().merge_entities(&john.id, &alice.id).await.unwrap();
    assert_eq!(outcome.mentions_moved as usize, before_source);
    assert!(repo.get_entity(&john.id).await.unwrap().is_none());

    let merged = repo.get_entity(&alice.id).await.unwrap().unwrap();
    assert_eq!(merged.mention_count as usize, before_target + before_source);
    assert_eq!(
        repo.list_mentions(&alice.id).await.unwrap().len(),
        before_target + before_source
    );

    // both works_for edges collapse into one triple
    let edges = repo.list_relationships_for_entity(&alice.id).await.unwrap();
    let works_for: Vec<_> = edges
        .iter()
        .filter(|r| r.relationship_type == RelationshipType::WorksFor)
        .collect();
    assert_eq!(works_for.len(), 1);
    assert_eq!(works_for[0].mention_count, 2);
    assert!(edges.iter().all(|r| r.source_entity_id != john.id && r.target_entity_id != john.id));

    let link = orchestrator
        .linker()
        .link_entity("John Doe", EntityType::Person)
        .await
        .unwrap();
    assert_eq!(link.linked_entity.unwrap().id, alice.id);
}

#[tokio::test]
async fn test_merge_with_missing_entity_changes_nothing() {
    let (_db, repo) = setup().await;
    let linker = EntityLinker::new(repo.clone());
    let acme = linker.create_entity("Acme Corp", EntityType::Organization, 0.9).await.unwrap();

    let err = linker.merge_entities("missing", &acme.id).await.unwrap_err();
    assert!(matches!(err, Error::MergeSourceNotFound(_)));
    let err = linker.merge_entities(&acme.id, "missing").await.unwrap_err();
    assert!(matches!(err, Error::MergeTargetNotFound(_)));
    let err = linker.merge_entities(&acme.id, &acme.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    assert!(repo.get_entity(&acme.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_merge_uses_detector_context_bound() {
    let (_db, repo) = setup().await;
    let orchestrator = orchestrator(repo.clone()).with_detector_config(DetectorConfig {
        max_context_messages: 2,
        ..Default::default()
    });
    assert_eq!(orchestrator.linker().max_context_messages(), 2);

    let first = orchestrator
        .process_message("m1", "c1", "John Doe works at Acme Corp")
        .await
        .unwrap();
    orchestrator
        .process_message("m2", "c1", "John Doe works at Acme Corp")
        .await
        .unwrap();
    let second = orchestrator
        .process_message("m3", "c1", "Alice works at Acme Corp")
        .await
        .unwrap();
    let john = first.entities.iter().find(|e| e.name == "John Doe").unwrap();
    let alice = second.entities.iter().find(|e| e.name == "Alice").unwrap();

    orchestrator.linker().merge_entities(&john.id, &alice.id).await.unwrap();
    let edges = repo.list_relationships().await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].context_messages.len(), 2);
}

// ========== Queries ==========

#[tokio::test]
async fn test_entity_graph_and_search() {
    let (_db, repo) = setup().await;
    let orchestrator = orchestrator(repo.clone());
    let result = orchestrator
        .process_message("m1", "c1", "John Doe works at Acme Corp")
        .await
        .unwrap();
    let john = result.entities.iter().find(|e| e.name == "John Doe").unwrap();

    let graph = orchestrator.get_entity_graph(&john.id).await.unwrap();
    assert_eq!(graph.entity.as_ref().map(|e| e.id.as_str()), Some(john.id.as_str()));
    assert_eq!(graph.relationships.len(), 1);
    assert_eq!(graph.related_entities.len(), 1);
    assert_eq!(graph.related_entities[0].name, "Acme Corp");

    let empty = orchestrator.get_entity_graph("missing").await.unwrap();
    assert!(empty.entity.is_none());
    assert!(empty.relationships.is_empty());

    let hits = orchestrator
        .search_knowledge_graph("acme", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(hits.entities.len(), 1);
    assert_eq!(hits.entities[0].entity.name, "Acme Corp");

    let filtered = orchestrator
        .search_knowledge_graph("acme", &SearchOptions::default().with_types(vec![EntityType::Person]))
        .await
        .unwrap();
    assert!(filtered.entities.is_empty());
}

#[tokio::test]
async fn test_json_export_counts() {
    let (_db, repo) = setup().await;
    let orchestrator = orchestrator(repo);
    orchestrator
        .process_message("m1", "c1", "John Doe works at Acme Corp and writes Rust")
        .await
        .unwrap();

    let stats = orchestrator.graph_stats().await.unwrap();
    let json = orchestrator.export_knowledge_graph(ExportFormat::Json).await.unwrap();
    let export: JsonExport = serde_json::from_str(&json).unwrap();
    assert_eq!(export.entities.len() as u64, stats.total_entities);
    assert_eq!(export.relationships.len() as u64, stats.total_relationships);
    assert_eq!(export.metadata.entity_count, export.entities.len());
    assert_eq!(export.metadata.relationship_count, export.relationships.len());

    // deterministic for an unchanged graph
    let again = orchestrator.export_knowledge_graph(ExportFormat::Json).await.unwrap();
    assert_eq!(json, again);
}

#[tokio::test]
async fn test_fuzzy_search_covers_aliases_and_threshold() {
    let (_db, repo) = setup().await;
    let orchestrator = orchestrator(repo);
    let linker = orchestrator.linker();
    let acme = linker.create_entity("Acme Corp", EntityType::Organization, 0.9).await.unwrap();
    linker
        .create_aliases(&acme.id, &[AliasSpec::new("Globex Industries", AliasType::Variation, 0.8)])
        .await
        .unwrap();
    let js = linker.create_entity("JavaScript", EntityType::Concept, 0.9).await.unwrap();

    // close to the alias only, and not a substring of anything stored
    let hits = orchestrator
        .search_knowledge_graph("Globex Industrys", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(hits.entities.len(), 1);
    assert_eq!(hits.entities[0].entity.id, acme.id);
    assert!(hits.entities[0].score < 0.75);

    // three edits out of ten sits exactly on the default threshold
    let hits = orchestrator
        .search_knowledge_graph("JavaSxxxpt", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(hits.entities.len(), 1);
    assert_eq!(hits.entities[0].entity.id, js.id);

    let hits = orchestrator
        .search_knowledge_graph("JavaXxxxpt", &SearchOptions::default())
        .await
        .unwrap();
    assert!(hits.entities.is_empty());
}

#[tokio::test]
async fn test_relationship_cluster_density_threshold() {
    let (_db, repo) = setup().await;
    let orchestrator = orchestrator(repo);
    let linker = orchestrator.linker();
    let detector = orchestrator.detector();

    let mut lees: Vec<Entity> = Vec::new();
    for name in ["Ann Lee", "Bo Lee", "Cy Lee", "Di Lee"] {
        lees.push(linker.create_entity(name, EntityType::Person, 0.9).await.unwrap());
    }
    let connect = |a: usize, b: usize| {
        RelationshipCandidate::new(&lees[a].id, &lees[b].id, RelationshipType::DiscussedWith, 0.8)
            .with_message("m1")
    };

    // 2 of 6 possible pairs
    detector.store_relationship(&connect(0, 1)).await.unwrap();
    detector.store_relationship(&connect(2, 3)).await.unwrap();
    let sparse = orchestrator
        .search_knowledge_graph("lee", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(sparse.entities.len(), 4);
    assert!(sparse.insights.is_empty());

    // a reverse edge on a connected pair adds nothing
    detector.store_relationship(&connect(1, 0)).await.unwrap();
    let still_sparse = orchestrator
        .search_knowledge_graph("lee", &SearchOptions::default())
        .await
        .unwrap();
    assert!(still_sparse.insights.is_empty());

    // 3 of 6 reaches the default density of 0.5
    detector.store_relationship(&connect(0, 2)).await.unwrap();
    let dense = orchestrator
        .search_knowledge_graph("lee", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(dense.insights.len(), 1);
    assert_eq!(dense.insights[0].kind, InsightKind::RelationshipCluster);
    assert_eq!(dense.insights[0].entity_ids.len(), 4);
    assert!((dense.insights[0].confidence - 0.5).abs() < 1e-9);

    // fewer hits than the minimum never form a cluster
    let pair = orchestrator
        .search_knowledge_graph("lee", &SearchOptions::default().with_limit(2))
        .await
        .unwrap();
    assert!(pair.insights.is_empty());
}

#[tokio::test]
async fn test_malformed_entity_row_does_not_block_graph_reads() {
    let (db, repo) = setup().await;
    let orchestrator = orchestrator(repo.clone());
    orchestrator
        .process_message("m1", "c1", "John Doe works at Acme Corp")
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO entities (id, name, normalized_name, entity_type, confidence_score, mention_count, created_at, updated_at)
         VALUES ('alien-1', 'Acme Alien', 'acme alien', 'alien', 0.5, 0, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
    )
    .execute(db.pool())
    .await
    .unwrap();

    let json = orchestrator.export_knowledge_graph(ExportFormat::Json).await.unwrap();
    let export: JsonExport = serde_json::from_str(&json).unwrap();
    assert_eq!(export.entities.len(), 2);
    assert_eq!(export.relationships.len(), 1);

    let hits = orchestrator
        .search_knowledge_graph("acme", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(hits.entities.len(), 1);
    assert_eq!(hits.entities[0].entity.name, "Acme Corp");

    let validator = IntegrityValidator::new(repo.clone());
    let report = validator.run_integrity_checks().await.unwrap();
    assert!(report
        .format_errors
        .iter()
        .any(|i| i.record_id == "alien-1" && i.issue.field.as_deref() == Some("entity_type")));

    assert!(orchestrator.export_knowledge_graph(ExportFormat::GraphMl).await.is_ok());
}

// ========== Integrity ==========

#[tokio::test]
async fn test_integrity_checks_and_auto_correct_are_idempotent() {
    let (db, repo) = setup().await;
    let orchestrator = orchestrator(repo.clone());
    let result = orchestrator
        .process_message("m1", "c1", "John Doe works at Acme Corp")
        .await
        .unwrap();
    let john = result.entities.iter().find(|e| e.name == "John Doe").unwrap().clone();
    let edge = result.relationships[0].clone();

    sqlx::query("UPDATE entity_relationships SET strength = 1.7 WHERE id = ?")
        .bind(&edge.id)
        .execute(db.pool())
        .await
        .unwrap();
    sqlx::query("UPDATE entities SET mention_count = 9 WHERE id = ?")
        .bind(&john.id)
        .execute(db.pool())
        .await
        .unwrap();
    sqlx::query("PRAGMA foreign_keys = OFF").execute(db.pool()).await.unwrap();
    sqlx::query(
        "INSERT INTO entity_mentions (id, entity_id, message_id, conversation_id, mention_text, start_position, end_position, confidence_score, extraction_method, created_at)
         VALUES ('orphan', 'gone', 'm9', 'c1', 'Ghost', 0, 5, 0.9, 'keyword', '2024-01-01T00:00:00Z')",
    )
    .execute(db.pool())
    .await
    .unwrap();
    sqlx::query("PRAGMA foreign_keys = ON").execute(db.pool()).await.unwrap();

    let validator = IntegrityValidator::new(repo.clone());
    let report = validator.run_integrity_checks().await.unwrap();
    assert_eq!(report.orphaned_mentions, vec!["orphan".to_string()]);
    assert_eq!(report.inconsistent_counts.len(), 1);
    assert_eq!(report.inconsistent_counts[0].stored, 9);
    assert_eq!(report.inconsistent_counts[0].actual, 1);
    assert_eq!(report.auto_fixed_issues, 1);
    assert!(report.format_errors.iter().any(|i| i.record_id == edge.id));
    assert!(report.total_issues >= 3);

    let john = repo.get_entity(&john.id).await.unwrap().unwrap();
    assert_eq!(john.mention_count, 1);

    let corrections = validator.auto_correct_errors(None).await.unwrap();
    assert!(corrections.successful >= 2);
    assert_eq!(corrections.failed, 0);

    let edges = repo.list_relationships().await.unwrap();
    assert!((edges[0].strength - 1.0).abs() < 1e-9);

    let clean = validator.run_integrity_checks().await.unwrap();
    assert_eq!(clean.total_issues, 0);
    assert_eq!(clean.logged_errors, 0);

    let repeat = validator.auto_correct_errors(None).await.unwrap();
    assert_eq!(repeat.attempted, 0);

    let summary = validator.get_validation_error_summary(None).await.unwrap();
    assert!(summary.total_errors >= 3);
    assert_eq!(summary.uncorrected_errors, 0);
}

#[tokio::test]
async fn test_auto_correct_unknown_id_counts_as_failed() {
    let (_db, repo) = setup().await;
    let validator = IntegrityValidator::new(repo);
    let ids = vec!["nope".to_string()];
    let report = validator.auto_correct_errors(Some(&ids)).await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.successful, 0);
}

#[tokio::test]
async fn test_validate_relationship_flags_dangling_endpoint() {
    let (_db, repo) = setup().await;
    let linker = EntityLinker::new(repo.clone());
    let john = linker.create_entity("John Doe", EntityType::Person, 0.9).await.unwrap();
    let validator = IntegrityValidator::new(repo.clone());

    let record = RelationshipRecord {
        source_entity_id: john.id.clone(),
        target_entity_id: "ghost".to_string(),
        relationship_type: "works_for".to_string(),
        strength: 0.8,
        mention_count: 1,
    };
    let result = validator.validate_relationship("r-new", &record).await.unwrap();
    assert!(!result.is_valid);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].validation_type, ValidationType::ReferentialIntegrity);
    assert_eq!(result.errors[0].field.as_deref(), Some("target_entity_id"));

    let mention = MentionRecord {
        entity_id: "ghost".to_string(),
        mention_text: "Ghost".to_string(),
        start_position: 0,
        end_position: 5,
        confidence_score: 0.9,
    };
    let result = validator.validate_mention("mention-new", &mention).await.unwrap();
    assert!(!result.is_valid);
    assert_eq!(result.errors[0].validation_type, ValidationType::ReferentialIntegrity);

    // referential findings are reported, not logged
    assert!(repo.list_validation_errors(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_validate_relationship_warns_on_duplicate_triple() {
    let (_db, repo) = setup().await;
    let linker = EntityLinker::new(repo.clone());
    let detector = RelationshipDetector::new(repo.clone());
    let john = linker.create_entity("John Doe", EntityType::Person, 0.9).await.unwrap();
    let acme = linker.create_entity("Acme Corp", EntityType::Organization, 0.9).await.unwrap();
    let stored = detector
        .store_relationship(&RelationshipCandidate::new(&john.id, &acme.id, RelationshipType::WorksFor, 0.8))
        .await
        .unwrap();
    let validator = IntegrityValidator::new(repo.clone());

    let record = RelationshipRecord {
        source_entity_id: john.id.clone(),
        target_entity_id: acme.id.clone(),
        relationship_type: "works_for".to_string(),
        strength: 0.8,
        mention_count: 1,
    };

    // the stored row itself is not a duplicate of itself
    let result = validator.validate_relationship(&stored.id, &record).await.unwrap();
    assert!(result.is_valid);
    assert!(result.warnings.is_empty());

    let result = validator.validate_relationship("r-new", &record).await.unwrap();
    assert!(result.is_valid);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].validation_type, ValidationType::Constraint);
    assert!(result.warnings[0].message.contains("duplicate"));
}

#[tokio::test]
async fn test_validate_entity_normalization_mismatch_is_warning_logged_once() {
    let (_db, repo) = setup().await;
    let linker = EntityLinker::new(repo.clone());
    let acme = linker.create_entity("Acme Corp", EntityType::Organization, 0.9).await.unwrap();
    let validator = IntegrityValidator::new(repo.clone());

    let mut record = EntityRecord::from(&acme);
    record.normalized_name = "acme".to_string();

    let result = validator.validate_entity(&acme.id, &record).await.unwrap();
    assert!(result.is_valid);
    assert!(result.errors.is_empty());
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].field.as_deref(), Some("normalized_name"));
    assert!(result.warnings[0].auto_correctable);

    let again = validator.validate_entity(&acme.id, &record).await.unwrap();
    assert_eq!(again.warnings.len(), 1);

    let logged = repo.list_validation_errors(None).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].table_name, GraphTable::Entities.as_str());
    assert_eq!(logged[0].record_id, acme.id);
    assert!(logged[0].corrected_at.is_none());
}
