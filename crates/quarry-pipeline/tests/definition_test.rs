//! Definition files: parsing, validation, and running the bundled crew.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quarry_pipeline::{
    CapabilityRegistry, PipelineError, PipelineFile, PipelineRunner, RunResult, StubCapability,
};

fn bundled() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../pipelines/langgraph_docs.toml")
}

fn stub_registry() -> (CapabilityRegistry, Arc<StubCapability>) {
    let mut registry = CapabilityRegistry::new();
    for name in ["web_search", "scrape_website", "scrape_element", "file_read"] {
        registry.register(StubCapability::new(name));
    }
    let reasoner = Arc::new(StubCapability::new("reason").with_fallback("Final Answer: done"));
    registry.register_arc(reasoner.clone());
    (registry, reasoner)
}

#[test]
fn test_bundled_definition_parses() {
    let file = PipelineFile::from_path(&bundled()).unwrap();
    file.validate().unwrap();

    assert_eq!(file.pipeline.name, "langgraph_docs");
    let agents: Vec<&str> = file.agents.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(
        agents,
        vec![
            "doc_navigator",
            "content_scraper",
            "content_processor",
            "quality_reviewer"
        ]
    );
    assert_eq!(
        file.capability_names(),
        vec![
            "file_read",
            "reason",
            "scrape_element",
            "scrape_website",
            "web_search"
        ]
    );
    assert!(file.pipeline.inputs.contains_key("url"));
}

#[test]
fn test_bundled_definition_builds() {
    let (registry, _) = stub_registry();
    let pipeline = PipelineFile::from_path(&bundled())
        .unwrap()
        .build(&registry)
        .unwrap();

    assert_eq!(
        pipeline.step_ids(),
        vec![
            "map_documentation_structure",
            "extract_documentation_content",
            "process_documentation",
            "review_documentation_quality"
        ]
    );
}

#[tokio::test]
async fn test_bundled_definition_runs() {
    let (registry, reasoner) = stub_registry();
    let file = PipelineFile::from_path(&bundled()).unwrap();
    let inputs = file.pipeline.inputs.clone();
    let pipeline = file.build(&registry).unwrap();

    let report = PipelineRunner::default()
        .run_with_inputs(&pipeline, inputs)
        .await;

    assert_eq!(
        report.result,
        RunResult::Completed {
            output: "done".into()
        }
    );
    assert_eq!(report.context.len(), 4);
    assert!(reasoner.calls()[0].contains("https://langchain-ai.github.io/langgraph/"));
}

#[tokio::test]
async fn test_bundled_definition_needs_inputs() {
    let (registry, _) = stub_registry();
    let pipeline = PipelineFile::from_path(&bundled())
        .unwrap()
        .build(&registry)
        .unwrap();

    let report = PipelineRunner::default()
        .run_with_inputs(&pipeline, HashMap::new())
        .await;
    assert_eq!(
        report.result.failed_step(),
        Some("map_documentation_structure")
    );
    assert!(report.context.is_empty());
}

#[test]
fn test_missing_capability_is_unbound() {
    let mut registry = CapabilityRegistry::new();
    registry.register(StubCapability::new("reason"));
    let err = PipelineFile::from_path(&bundled())
        .unwrap()
        .build(&registry)
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::UnboundCapability { ref actor, .. } if actor == "doc_navigator"
    ));
}

#[test]
fn test_yaml_file_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mini.yml");
    std::fs::write(
        &path,
        r#"
pipeline:
  name: mini
agents:
  - id: reader
    role: Reader
    capabilities: [file_read]
steps:
  - id: read
    agent: reader
    description: Read the notes
    capabilities: [file_read]
"#,
    )
    .unwrap();

    let (registry, _) = stub_registry();
    let pipeline = PipelineFile::from_path(&path)
        .unwrap()
        .build(&registry)
        .unwrap();
    assert_eq!(pipeline.name(), "mini");
    assert_eq!(pipeline.step_ids(), vec!["read"]);
}

#[test]
fn test_missing_file() {
    let err = PipelineFile::from_path(Path::new("/nonexistent/pipeline.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read"));
}
