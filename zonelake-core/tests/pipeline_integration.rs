use regex::Regex;
use std::collections::HashSet;
use std::fs::write;
use tempfile::tempdir;

use zonelake_core::codec::{Content, Record};
use zonelake_core::contract::{Metadata, MockObjectStore, ObjectStore, StoreError};
use zonelake_core::memory::MemoryObjectStore;
use zonelake_core::pipeline::{
    CancelToken, FailureStage, InputOutcome, Pipeline, PipelineOptions, PipelineStep, StepError,
};
use zonelake_core::zone::ZoneRouting;
use zonelake_core::{DataLake, ZoneCatalog};

fn memory_lake() -> (MemoryObjectStore, DataLake<MemoryObjectStore>) {
    let store = MemoryObjectStore::new("test-bucket");
    let lake = DataLake::new(store.clone(), ZoneCatalog::standard());
    (store, lake)
}

fn records(content: Content) -> Result<Vec<Record>, StepError> {
    match content {
        Content::Records(records) => Ok(records),
        other => Err(format!("expected records, got {}", other.shape()).into()),
    }
}

fn dedupe_step() -> PipelineStep {
    PipelineStep::new("dedupe", |content| {
        let mut seen = HashSet::new();
        let kept = records(content)?
            .into_iter()
            .filter(|r| seen.insert(r.get("id").cloned()))
            .collect();
        Ok(Content::Records(kept))
    })
}

fn enrich_step() -> PipelineStep {
    PipelineStep::new("enrich", |content| {
        let enriched = records(content)?
            .into_iter()
            .map(|mut r| {
                r.insert("source".into(), "notes".into());
                r
            })
            .collect();
        Ok(Content::Records(enriched))
    })
}

/// Fails for any content holding a record with `id == "boom"`.
fn explode_on_boom() -> PipelineStep {
    PipelineStep::new("explode", |content| {
        let rows = records(content)?;
        if rows.iter().any(|r| r.get("id").map(String::as_str) == Some("boom")) {
            return Err("refusing to process boom".into());
        }
        Ok(Content::Records(rows))
    })
}

fn csv_lines(lines: &[&str]) -> Vec<u8> {
    let mut out = lines.join("\n");
    out.push('\n');
    out.into_bytes()
}

#[tokio::test]
async fn notes_csv_moves_from_raw_to_curated_with_lineage() {
    let (store, lake) = memory_lake();
    let dir = tempdir().unwrap();
    let notes = dir.path().join("notes.csv");
    write(&notes, "id,text\n1,hello\n2,world\n").unwrap();
    let input = notes.to_string_lossy().to_string();

    let results = lake
        .process_data_pipeline(&[input.clone()], &[dedupe_step(), enrich_step()])
        .await;

    assert_eq!(results.len(), 1);
    let curated = Regex::new(r"^curated/notes_2_\d{8}_\d{6}\.csv$").unwrap();
    assert!(curated.is_match(&results[0].to_string()), "got {}", results[0]);

    let keys = store.keys();
    assert!(keys.contains(&"raw/notes.csv".to_string()));
    let processed = Regex::new(r"^processed/notes_1_\d{8}_\d{6}\.csv$").unwrap();
    let processed_key = keys
        .iter()
        .find(|k| processed.is_match(k))
        .expect("step 1 output in processed zone");
    assert_eq!(keys.len(), 3, "one raw upload plus one write per step: {keys:?}");

    let head = store.head(processed_key).await.unwrap();
    assert_eq!(head.metadata["original_file"], input);
    assert_eq!(head.metadata["processing_step"], "step_1");
    assert_eq!(head.metadata["processor"], "dedupe");

    let final_bytes = store.get(&results[0].to_string()).await.unwrap();
    let final_text = String::from_utf8(final_bytes).unwrap();
    assert!(final_text.starts_with("id,text,source"));
    assert!(final_text.contains("2,world,notes"));

    let mut filters = Metadata::new();
    filters.insert("processor".into(), "dedupe".into());
    let found = lake
        .search_by_metadata(&filters, Some("processed"))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(&found[0].key, processed_key);
}

#[tokio::test]
async fn failing_input_is_isolated_from_the_rest_of_the_batch() {
    let (_store, lake) = memory_lake();
    for (name, id) in [("a.csv", "1"), ("b.csv", "boom"), ("c.csv", "3")] {
        lake.upload_bytes(csv_lines(&["id", id]), "raw", name, Metadata::new())
            .await
            .unwrap();
    }
    let inputs = ["raw/a.csv", "raw/b.csv", "raw/c.csv"];

    let report = Pipeline::new(&lake)
        .run_with_report(&inputs, &[dedupe_step(), explode_on_boom()])
        .await;

    let results: Vec<String> = report.results().iter().map(|k| k.to_string()).collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].starts_with("curated/a_2_"));
    assert!(results[1].starts_with("curated/c_2_"));

    let failed = &report.inputs[1];
    assert_eq!(failed.outcome(), InputOutcome::Failed);
    let failure = failed.failure.as_ref().unwrap();
    assert_eq!(
        failure.stage,
        FailureStage::Step {
            index: 1,
            name: "explode".into()
        }
    );
    assert_eq!(failed.writes.len(), 1);
    assert_eq!(failed.result, None);
}

#[tokio::test]
async fn many_steps_in_one_second_never_collide() {
    let (store, lake) = memory_lake();
    lake.upload_bytes(csv_lines(&["id", "1"]), "raw", "data.csv", Metadata::new())
        .await
        .unwrap();
    let steps: Vec<PipelineStep> = (0..6)
        .map(|i| PipelineStep::new(format!("noop{i}"), Ok))
        .collect();

    let report = Pipeline::new(&lake)
        .run_with_report(&["raw/data.csv"], &steps)
        .await;

    let writes = &report.inputs[0].writes;
    assert_eq!(writes.len(), 6);
    let unique: HashSet<String> = writes.iter().map(|k| k.to_string()).collect();
    assert_eq!(unique.len(), 6);
    // raw input + 6 outputs
    assert_eq!(store.keys().len(), 7);

    let zones: Vec<&str> = writes.iter().map(|k| k.zone().as_str()).collect();
    assert_eq!(
        zones,
        ["processed", "enriched", "enriched", "enriched", "enriched", "curated"]
    );
}

#[tokio::test]
async fn single_step_runs_finish_in_processed_and_are_excluded() {
    let (store, lake) = memory_lake();
    lake.upload_bytes(csv_lines(&["id", "1"]), "raw", "one.csv", Metadata::new())
        .await
        .unwrap();

    let report = Pipeline::new(&lake)
        .run_with_report(&["raw/one.csv"], &[PipelineStep::unnamed(Ok)])
        .await;

    assert!(report.results().is_empty());
    assert_eq!(report.inputs[0].outcome(), InputOutcome::Excluded);
    let written = &report.inputs[0].writes[0];
    assert_eq!(written.zone().as_str(), "processed");
    let head = store.head(&written.to_string()).await.unwrap();
    assert_eq!(head.metadata["processor"], "unknown");
}

#[tokio::test]
async fn explicit_routing_can_place_single_step_output_in_a_result_zone() {
    let (_store, lake) = memory_lake();
    lake.upload_bytes(csv_lines(&["id", "1"]), "raw", "one.csv", Metadata::new())
        .await
        .unwrap();
    let routing = ZoneRouting::explicit(lake.catalog(), ["enriched"]).unwrap();

    let results = Pipeline::new(&lake)
        .with_routing(routing)
        .run(&["raw/one.csv"], &[dedupe_step()])
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].zone().as_str(), "enriched");
}

#[tokio::test]
async fn binary_inputs_pass_through_unchanged() {
    let (store, lake) = memory_lake();
    let payload = vec![0u8, 159, 146, 150, 255];
    lake.upload_bytes(payload.clone(), "raw", "blob.bin", Metadata::new())
        .await
        .unwrap();

    let report = Pipeline::new(&lake)
        .run_with_report(&["raw/blob.bin"], &[PipelineStep::new("identity", Ok)])
        .await;

    let written = &report.inputs[0].writes[0];
    assert!(written.path().starts_with("blob_1_"));
    assert!(written.path().ends_with(".bin"));
    assert_eq!(store.get(&written.to_string()).await.unwrap(), payload);
}

#[tokio::test]
async fn unprocessable_formats_are_skipped_without_writes() {
    let (store, lake) = memory_lake();
    lake.upload_bytes(b"%PDF-1.7".to_vec(), "raw", "doc.pdf", Metadata::new())
        .await
        .unwrap();

    let report = Pipeline::new(&lake)
        .run_with_report(&["raw/doc.pdf", "raw/missing.csv"], &[dedupe_step()])
        .await;

    assert_eq!(
        report.inputs[0].failure.as_ref().unwrap().stage,
        FailureStage::Unprocessable
    );
    assert_eq!(
        report.inputs[1].failure.as_ref().unwrap().stage,
        FailureStage::Resolve
    );
    assert_eq!(store.keys(), vec!["raw/doc.pdf".to_string()]);
}

#[tokio::test]
async fn steps_that_drop_every_row_still_write_an_empty_table() {
    let (store, lake) = memory_lake();
    lake.upload_bytes(csv_lines(&["id,text", "1,a", "2,b"]), "raw", "n.csv", Metadata::new())
        .await
        .unwrap();
    let drop_all = PipelineStep::new("drop_all", |_| Ok(Content::Records(Vec::new())));

    let report = Pipeline::new(&lake)
        .run_with_report(&["raw/n.csv"], &[drop_all, enrich_step()])
        .await;

    let input = &report.inputs[0];
    assert!(input.failure.is_none(), "{:?}", input.failure);
    assert_eq!(input.writes.len(), 2);
    let key = input.result.as_ref().unwrap();
    assert!(key.to_string().starts_with("curated/n_2_"));
    assert!(store.get(&key.to_string()).await.unwrap().is_empty());
    assert_eq!(
        lake.parse_object(&key.to_string()).await.unwrap().unwrap().content,
        Content::Records(Vec::new())
    );
}

#[tokio::test]
async fn keys_outside_the_catalog_and_zone_markers_fail_to_resolve() {
    let (store, lake) = memory_lake();
    store
        .put("archive/x.csv", csv_lines(&["id", "1"]), Metadata::new())
        .await
        .unwrap();
    lake.ensure_layout().await.unwrap();
    let before = store.keys();

    let report = Pipeline::new(&lake)
        .run_with_report(&["archive/x.csv", "raw/"], &[dedupe_step()])
        .await;

    for input in &report.inputs {
        assert_eq!(input.outcome(), InputOutcome::Failed, "{}", input.input);
        assert_eq!(input.failure.as_ref().unwrap().stage, FailureStage::Resolve);
        assert_eq!(input.final_key, None);
        assert!(input.writes.is_empty());
    }
    assert!(report.inputs[0]
        .failure
        .as_ref()
        .unwrap()
        .message
        .contains("archive"));
    assert_eq!(store.keys(), before);
}

#[tokio::test]
async fn keys_without_a_zone_prefix_start_in_the_first_zone() {
    let (store, lake) = memory_lake();
    store
        .put("loose.csv", csv_lines(&["id", "7"]), Metadata::new())
        .await
        .unwrap();

    let report = Pipeline::new(&lake)
        .run_with_report(&["loose.csv"], &[])
        .await;

    let input = &report.inputs[0];
    assert!(input.failure.is_none());
    assert_eq!(input.final_key.as_ref().unwrap().to_string(), "raw/loose.csv");
    assert_eq!(input.outcome(), InputOutcome::Excluded);
}

#[tokio::test]
async fn write_failure_aborts_remaining_steps_for_that_input() {
    let mut store = MockObjectStore::new();
    store
        .expect_get()
        .returning(|_| Ok(b"id\n1\n".to_vec()));
    store
        .expect_put()
        .times(1)
        .returning(|_, _, _| Err(StoreError::other("disk full")));
    let lake = DataLake::new(store, ZoneCatalog::standard());

    let report = Pipeline::new(&lake)
        .run_with_report(&["raw/x.csv"], &[dedupe_step(), enrich_step()])
        .await;

    assert!(report.results().is_empty());
    let failure = report.inputs[0].failure.as_ref().unwrap();
    assert_eq!(failure.stage, FailureStage::Write { index: 0 });
    assert!(failure.message.contains("disk full"));
    assert!(report.inputs[0].writes.is_empty());
}

#[tokio::test]
async fn cancelled_runs_touch_nothing() {
    // No expectations: any store call would panic.
    let store = MockObjectStore::new();
    let lake = DataLake::new(store, ZoneCatalog::standard());
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = Pipeline::new(&lake)
        .with_cancel_token(cancel)
        .run_with_report(&["raw/a.csv", "raw/b.csv"], &[dedupe_step()])
        .await;

    assert_eq!(report.failed(), 2);
    for input in &report.inputs {
        assert_eq!(input.failure.as_ref().unwrap().stage, FailureStage::Cancelled);
    }
}

#[tokio::test]
async fn concurrent_runs_keep_input_order() {
    let (_store, lake) = memory_lake();
    let names = ["d.csv", "a.csv", "c.csv", "b.csv"];
    for name in names {
        lake.upload_bytes(csv_lines(&["id", "1"]), "raw", name, Metadata::new())
            .await
            .unwrap();
    }
    let inputs: Vec<String> = names.iter().map(|n| format!("raw/{n}")).collect();

    let results = Pipeline::new(&lake)
        .with_options(PipelineOptions { concurrency: 3 })
        .run(&inputs, &[dedupe_step(), enrich_step()])
        .await;

    let stems: Vec<String> = results
        .iter()
        .map(|k| k.path().split('_').next().unwrap().to_string())
        .collect();
    assert_eq!(stems, ["d", "a", "c", "b"]);
}
