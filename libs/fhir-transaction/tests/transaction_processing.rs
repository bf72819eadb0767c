use std::sync::Arc;

use http::StatusCode;
use serde_json::json;

use funke_keys::{Key, SingleOrigin};
use funke_transaction::{
    Bundle, EngineResponse, Entry, Error, InteractionHandler, MemoryStore, Method,
    ResourceOperation, SearchResults, SequentialGenerator, TransactionProcessor,
};

const BASE: &str = "http://localhost:8080/fhir";

fn processor(store: &Arc<MemoryStore>) -> TransactionProcessor {
    TransactionProcessor::new(
        Arc::new(SingleOrigin::new(BASE).unwrap()),
        Arc::new(SequentialGenerator::default()),
        store.clone(),
    )
}

fn transaction(entries: serde_json::Value) -> Bundle {
    Bundle::from_json(json!({
        "resourceType": "Bundle",
        "type": "transaction",
        "entry": entries
    }))
    .unwrap()
}

#[tokio::test]
async fn placeholder_references_resolve_across_entries() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let bundle = transaction(json!([
        {
            "fullUrl": "urn:uuid:abc",
            "request": { "method": "POST", "url": "Patient" },
            "resource": { "resourceType": "Patient", "active": true }
        },
        {
            "request": { "method": "POST", "url": "Observation" },
            "resource": {
                "resourceType": "Observation",
                "status": "final",
                "subject": { "reference": "urn:uuid:abc" }
            }
        }
    ]));

    let results = processor(&store).process_bundle(&bundle, store.as_ref()).await?;
    assert_eq!(results.len(), 2);

    let patient_key = results[0].0.key().unwrap().without_version().without_base();
    let observation = results[1].1.resource.as_ref().unwrap();
    assert_eq!(
        observation["subject"]["reference"].as_str().unwrap(),
        patient_key.to_string()
    );
    Ok(())
}

#[tokio::test]
async fn entries_are_processed_in_verb_order() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert("Patient", "1", json!({ "resourceType": "Patient" }));
    store.insert("Observation", "5", json!({ "resourceType": "Observation" }));

    // Bundle order deliberately scrambled: PUT first, DELETE last.
    let bundle = transaction(json!([
        {
            "request": { "method": "PUT", "url": "Observation/5" },
            "resource": {
                "resourceType": "Observation",
                "status": "final",
                "subject": { "reference": "urn:uuid:abc" }
            }
        },
        {
            "fullUrl": "urn:uuid:abc",
            "request": { "method": "POST", "url": "Patient" },
            "resource": { "resourceType": "Patient" }
        },
        { "request": { "method": "DELETE", "url": "Patient/1" } }
    ]));

    let results = processor(&store).process_bundle(&bundle, store.as_ref()).await?;
    let methods: Vec<Method> = results.iter().map(|(e, _)| e.method()).collect();
    assert_eq!(methods, [Method::Delete, Method::Post, Method::Put]);

    // The PUT appears after the POST only because of verb ordering, yet its
    // placeholder reference still resolves to the created patient.
    let created = results[1].0.key().unwrap().without_version().without_base();
    let observation = results[2].1.resource.as_ref().unwrap();
    assert_eq!(
        observation["subject"]["reference"].as_str().unwrap(),
        created.to_string()
    );
    Ok(())
}

#[tokio::test]
async fn patch_entries_run_in_the_update_phase() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert("Patient", "1", json!({ "resourceType": "Patient" }));

    // The PATCH comes first in bundle order but must wait for the POST
    // phase; its Parameters payload is not the target resource and must
    // not have the key mirrored into it.
    let patch_params = json!({
        "resourceType": "Parameters",
        "parameter": [{ "name": "operation" }]
    });
    let bundle = transaction(json!([
        {
            "request": { "method": "PATCH", "url": "Patient/1" },
            "resource": patch_params
        },
        {
            "request": { "method": "POST", "url": "Observation" },
            "resource": { "resourceType": "Observation", "status": "final" }
        }
    ]));

    let results = processor(&store).process_bundle(&bundle, store.as_ref()).await?;
    let methods: Vec<Method> = results.iter().map(|(e, _)| e.method()).collect();
    assert_eq!(methods, [Method::Post, Method::Patch]);

    let (patch_entry, patch_response) = &results[1];
    assert_eq!(patch_response.status, StatusCode::OK);
    assert_eq!(patch_entry.key().unwrap().resource_id(), Some("1"));
    let payload = patch_entry.resource().unwrap();
    assert_eq!(payload["resourceType"], "Parameters");
    assert!(payload.get("id").is_none(), "parameter document gained an id");
    Ok(())
}

#[tokio::test]
async fn conditional_create_with_one_match_reads_instead() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert(
        "Patient",
        "known",
        json!({ "resourceType": "Patient", "identifier": [{ "value": "123" }] }),
    );

    let bundle = transaction(json!([
        {
            "fullUrl": "urn:uuid:pat",
            "request": { "method": "POST", "url": "Patient", "ifNoneExist": "identifier=123" },
            "resource": { "resourceType": "Patient", "identifier": [{ "value": "123" }] }
        },
        {
            "request": { "method": "POST", "url": "Observation" },
            "resource": {
                "resourceType": "Observation",
                "status": "final",
                "subject": { "reference": "urn:uuid:pat" }
            }
        }
    ]));

    let results = processor(&store).process_bundle(&bundle, store.as_ref()).await?;

    // No duplicate was created; the placeholder resolves to the match.
    assert_eq!(results[0].0.method(), Method::Get);
    let observation = results[1].1.resource.as_ref().unwrap();
    assert_eq!(observation["subject"]["reference"], "Patient/known");
    Ok(())
}

#[tokio::test]
async fn ambiguous_conditional_create_fails_with_diagnostics() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    for id in ["a", "b"] {
        store.insert(
            "Patient",
            id,
            json!({ "resourceType": "Patient", "identifier": [{ "value": "123" }] }),
        );
    }

    let bundle = transaction(json!([
        {
            "request": { "method": "POST", "url": "Patient", "ifNoneExist": "identifier=123" },
            "resource": { "resourceType": "Patient" }
        }
    ]));

    let err = processor(&store)
        .process_bundle(&bundle, store.as_ref())
        .await
        .unwrap_err();
    match err {
        Error::PreconditionFailed { matches, used, .. } => {
            assert_eq!(matches, 2);
            assert_eq!(used, ["identifier"]);
        }
        other => panic!("expected PreconditionFailed, got {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn conditional_update_upserts_on_zero_matches() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let bundle = transaction(json!([
        {
            "request": { "method": "PUT", "url": "Patient?identifier=nobody" },
            "resource": { "resourceType": "Patient", "active": true }
        }
    ]));

    let results = processor(&store).process_bundle(&bundle, store.as_ref()).await?;
    assert_eq!(results[0].1.status, StatusCode::CREATED);
    assert_eq!(results[0].0.method(), Method::Post);
    assert_eq!(store.len(), 1);
    Ok(())
}

#[tokio::test]
async fn conditional_update_retargets_on_one_match() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert(
        "Patient",
        "known",
        json!({ "resourceType": "Patient", "identifier": [{ "value": "123" }] }),
    );

    let bundle = transaction(json!([
        {
            "request": { "method": "PUT", "url": "Patient?identifier=123" },
            "resource": { "resourceType": "Patient", "active": false }
        }
    ]));

    let results = processor(&store).process_bundle(&bundle, store.as_ref()).await?;
    assert_eq!(results[0].1.status, StatusCode::OK);
    assert_eq!(
        results[0].0.key().unwrap().resource_id(),
        Some("known"),
        "update must target the matched resource, not a fresh id"
    );
    assert_eq!(store.get("Patient", "known").unwrap()["active"], false);
    Ok(())
}

#[tokio::test]
async fn handler_failure_aborts_remaining_entries() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let bundle = transaction(json!([
        { "request": { "method": "GET", "url": "Patient/missing" } },
        {
            "request": { "method": "POST", "url": "Patient" },
            "resource": { "resourceType": "Patient" }
        }
    ]));

    // GETs run last, so the create succeeds before the read aborts; the
    // engine makes no rollback promises of its own.
    let err = processor(&store)
        .process_bundle(&bundle, store.as_ref())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Aborted { status } if status == StatusCode::NOT_FOUND
    ));
    Ok(())
}

#[tokio::test]
async fn foreign_payload_references_pass_through() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let bundle = transaction(json!([
        {
            "request": { "method": "POST", "url": "Observation" },
            "resource": {
                "resourceType": "Observation",
                "status": "final",
                "subject": { "reference": "http://other.example.org/fhir/Patient/9" }
            }
        }
    ]));

    let results = processor(&store).process_bundle(&bundle, store.as_ref()).await?;
    let observation = results[0].1.resource.as_ref().unwrap();
    assert_eq!(
        observation["subject"]["reference"],
        "http://other.example.org/fhir/Patient/9"
    );
    Ok(())
}

#[tokio::test]
async fn merged_conditional_delete_responses_agree() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert("Patient", "a", json!({ "resourceType": "Patient" }));
    store.insert("Patient", "b", json!({ "resourceType": "Patient" }));

    let operation = ResourceOperation::resolve(
        Method::Delete,
        Key::for_type("Patient"),
        None,
        Some(SearchResults {
            matches: vec!["Patient/a".into(), "Patient/b".into()],
            used_parameters: vec!["identifier".into()],
            unused_parameters: vec![],
        }),
    )?;

    let merged = processor(&store)
        .handle_operation(operation, store.as_ref())
        .await?;
    assert_eq!(merged.status, StatusCode::NO_CONTENT);
    assert!(store.is_empty());
    Ok(())
}

struct DisagreeingHandler;

#[async_trait::async_trait]
impl InteractionHandler for DisagreeingHandler {
    async fn handle_interaction(&self, entry: &Entry) -> funke_transaction::Result<EngineResponse> {
        // First target deletes clean, second reports OK: irreconcilable.
        let status = if entry.key().and_then(|k| k.resource_id()) == Some("a") {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::OK
        };
        Ok(EngineResponse::new(status))
    }
}

#[tokio::test]
async fn incompatible_responses_are_a_hard_failure() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let operation = ResourceOperation::resolve(
        Method::Delete,
        Key::for_type("Patient"),
        None,
        Some(SearchResults {
            matches: vec!["Patient/a".into(), "Patient/b".into()],
            used_parameters: vec![],
            unused_parameters: vec![],
        }),
    )?;

    let err = processor(&store)
        .handle_operation(operation, &DisagreeingHandler)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IncompatibleResponses(_)));
    Ok(())
}
