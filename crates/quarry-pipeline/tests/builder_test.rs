//! Construction-time validation: actors, steps and the pipeline builder.

use std::sync::Arc;

use quarry_pipeline::{
    Actor, ActorSpec, CapabilityRegistry, InvocationPolicy, Pipeline, PipelineBuilder,
    PipelineError, RoleConfig, RunContext, Step, StepSpec, StubCapability,
};

const ALL_CAPABILITIES: [&str; 4] = ["web_search", "scrape_website", "scrape_element", "file_read"];

fn registry() -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    for name in ALL_CAPABILITIES {
        registry.register(StubCapability::new(name));
    }
    registry.register(StubCapability::new("reason").with_fallback("Final Answer: ok"));
    registry
}

/// Every subset of `items`, including the empty one.
fn subsets<'a>(items: &[&'a str]) -> Vec<Vec<&'a str>> {
    (0..1u32 << items.len())
        .map(|mask| {
            items
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, s)| *s)
                .collect()
        })
        .collect()
}

#[test]
fn test_capability_not_owned_iff_not_subset() {
    let registry = registry();
    for actor_caps in subsets(&ALL_CAPABILITIES) {
        let actor = Arc::new(
            Actor::new("actor", RoleConfig::new("Actor"), &actor_caps, &registry).unwrap(),
        );
        for step_caps in subsets(&ALL_CAPABILITIES) {
            let is_subset = step_caps.iter().all(|c| actor_caps.contains(c));
            let result = Step::new("step", actor.clone(), "Goal", "", step_caps.iter().copied());
            match result {
                Ok(_) => assert!(is_subset, "{step_caps:?} accepted for {actor_caps:?}"),
                Err(PipelineError::CapabilityNotOwned { capability, .. }) => {
                    assert!(!is_subset, "{step_caps:?} rejected for {actor_caps:?}");
                    assert!(!actor_caps.contains(&capability.as_str()));
                }
                Err(other) => panic!("Unexpected error: {other:?}"),
            }
        }
    }
}

#[tokio::test]
async fn test_actor_rejects_step_outside_its_set() {
    let registry = registry();
    let navigator = Arc::new(
        Actor::new("navigator", RoleConfig::new("Navigator"), ["web_search"], &registry).unwrap(),
    );
    let processor =
        Actor::new("processor", RoleConfig::new("Processor"), ["file_read"], &registry).unwrap();

    let step = Step::new("map", navigator, "Map", "", ["web_search"]).unwrap();
    let err = processor
        .invoke(&step, &RunContext::new(), &InvocationPolicy::default())
        .await
        .unwrap_err();
    match err {
        PipelineError::CapabilityNotOwned {
            step,
            actor,
            capability,
        } => {
            assert_eq!(step, "map");
            assert_eq!(actor, "processor");
            assert_eq!(capability, "web_search");
        }
        other => panic!("Expected CapabilityNotOwned, got: {other:?}"),
    }
}

#[test]
fn test_duplicate_step_ids_always_rejected() {
    let registry = registry();
    let variants = [
        StepSpec::new("map", "navigator", "Something else entirely"),
        StepSpec::new("map", "ghost", "Unknown actor"),
        StepSpec::new("map", "navigator", "Bad caps").with_capabilities(["file_read"]),
        StepSpec::new("map", "navigator", "Bad context").with_context(["nowhere"]),
    ];
    for duplicate in variants {
        let err = PipelineBuilder::new("dups")
            .actor(
                ActorSpec::new("navigator", RoleConfig::new("Navigator"))
                    .with_capabilities(["web_search"]),
            )
            .step(StepSpec::new("map", "navigator", "Map"))
            .step(duplicate)
            .build(&registry)
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateStepId(ref id) if id == "map"), "{err:?}");
    }
}

#[test]
fn test_duplicate_step_ids_in_direct_construction() {
    let registry = registry();
    let actor = Arc::new(Actor::new("a", RoleConfig::new("A"), ["web_search"], &registry).unwrap());
    let first = Step::new("review", actor.clone(), "One", "", ["web_search"]).unwrap();
    let second = Step::new("review", actor, "Two", "other", Vec::<String>::new()).unwrap();

    let err = Pipeline::sequential(vec![first.clone(), second.clone()]).unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateStepId(_)));
    let err = Pipeline::grouped(vec![vec![first], vec![second]]).unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateStepId(_)));
}

#[test]
fn test_unbound_capability_fails_before_any_step() {
    let mut registry = CapabilityRegistry::new();
    let reasoner = Arc::new(StubCapability::new("reason"));
    registry.register_arc(reasoner.clone());
    registry.register(StubCapability::new("web_search"));

    let err = PipelineBuilder::new("unbound")
        .actor(
            ActorSpec::new("processor", RoleConfig::new("Processor"))
                .with_capabilities(["pdf_reader"]),
        )
        .step(StepSpec::new("process", "processor", "Process"))
        .build(&registry)
        .unwrap_err();

    match err {
        PipelineError::UnboundCapability { actor, capability } => {
            assert_eq!(actor, "processor");
            assert_eq!(capability, "pdf_reader");
        }
        other => panic!("Expected UnboundCapability, got: {other:?}"),
    }
    assert_eq!(reasoner.call_count(), 0);
}

#[test]
fn test_unbound_reported_before_unknown_actor() {
    let err = PipelineBuilder::new("order")
        .actor(ActorSpec::new("a", RoleConfig::new("A")).with_capabilities(["nope"]))
        .step(StepSpec::new("s", "ghost", "S"))
        .build(&registry())
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnboundCapability { .. }));
}

#[test]
fn test_construction_errors_are_flagged() {
    let err = PipelineBuilder::new("empty").build(&registry()).unwrap_err();
    assert!(err.is_construction_error());
}

#[test]
fn test_actor_shared_between_steps() {
    let pipeline = PipelineBuilder::new("shared")
        .actor(
            ActorSpec::new("reviewer", RoleConfig::new("Reviewer"))
                .with_capabilities(["file_read", "web_search"]),
        )
        .step(StepSpec::new("first", "reviewer", "First").with_capabilities(["file_read"]))
        .step(StepSpec::new("second", "reviewer", "Second").with_capabilities(["web_search"]))
        .build(&registry())
        .unwrap();

    let steps: Vec<&Step> = pipeline.steps().collect();
    assert!(Arc::ptr_eq(steps[0].actor(), steps[1].actor()));
}
