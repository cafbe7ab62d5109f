//! A small crew running on real capabilities with a scripted LLM.

use std::collections::HashMap;
use std::sync::Arc;

use quarry_llm::MockBackend;
use quarry_pipeline::{ActorSpec, PipelineBuilder, PipelineRunner, RoleConfig, RunResult, StepSpec};
use quarry_tools::{ReasonerConfig, ToolsConfig, build_registry};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_scripted_crew_scrapes_and_processes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/langgraph/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><body><main><h1>Concepts</h1><p>Graphs of nodes and edges.</p></main></body></html>",
            "text/html",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let backend = Arc::new(MockBackend::with_texts([
        format!(
            "Thought: I should read the page.\nAction: scrape_website\nAction Input: {}/langgraph/",
            server.uri()
        ),
        "Thought: I know the structure.\nFinal Answer: Sections: Concepts".to_string(),
        "Final Answer: # Concepts\nGraphs of nodes and edges.".to_string(),
    ]));
    let registry = build_registry(
        &ToolsConfig::default(),
        backend.clone(),
        ReasonerConfig::default(),
    )
    .unwrap();

    let pipeline = PipelineBuilder::new("mini_docs")
        .actor(
            ActorSpec::new("navigator", RoleConfig::new("Documentation Navigator"))
                .with_capabilities(["scrape_website"]),
        )
        .actor(
            ActorSpec::new("writer", RoleConfig::new("Technical Writer"))
                .with_capabilities(["file_read"]),
        )
        .step(
            StepSpec::new("map", "navigator", "Map the documentation at {{input.url}}")
                .with_capabilities(["scrape_website"]),
        )
        .step(StepSpec::new("write", "writer", "Write up the sections").with_context(["map"]))
        .build(&registry)
        .unwrap();

    let inputs = HashMap::from([("url".to_string(), format!("{}/langgraph/", server.uri()))]);
    let report = PipelineRunner::default().run_with_inputs(&pipeline, inputs).await;

    assert_eq!(
        report.result,
        RunResult::Completed {
            output: "# Concepts\nGraphs of nodes and edges.".to_string()
        }
    );
    assert_eq!(report.executed, vec!["map", "write"]);

    let requests = backend.requests();
    assert_eq!(requests.len(), 3);
    let second = &requests[1].messages[0].content;
    assert!(second.contains("Observation:"));
    assert!(second.contains("Graphs of nodes and edges."));
    let third = &requests[2].messages[0].content;
    assert!(third.contains("Sections: Concepts"));
    assert!(third.contains("Write up the sections"));
}

#[tokio::test]
async fn test_scrape_failure_halts_crew() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let backend = Arc::new(MockBackend::with_texts([format!(
        "Action: scrape_website\nAction Input: {}/down",
        server.uri()
    )]));
    let registry = build_registry(
        &ToolsConfig::default(),
        backend.clone(),
        ReasonerConfig::default(),
    )
    .unwrap();

    let pipeline = PipelineBuilder::new("broken")
        .actor(
            ActorSpec::new("navigator", RoleConfig::new("Navigator"))
                .with_capabilities(["scrape_website"]),
        )
        .step(StepSpec::new("map", "navigator", "Map it").with_capabilities(["scrape_website"]))
        .step(StepSpec::new("after", "navigator", "Never runs"))
        .build(&registry)
        .unwrap();

    let result = PipelineRunner::default().run(&pipeline).await;
    assert_eq!(result.failed_step(), Some("map"));
    assert_eq!(backend.request_count(), 1);
}
