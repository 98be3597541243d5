use std::sync::Arc;
use std::time::Duration;

use hypersig::graph::Graph;
use hypersig::profile::{ResourceKind, ResourceProfile};
use hypersig::router::NoopSubscribeSender;
use hypersig::situation::belief;
use hypersig::{
    vocab, Ability, Context, ExposureOptions, ExposureStream, HandshakeMode, JsonProfileSource, Notification,
    NotificationRouter, ObsProperty, RecommendationRegistry, ResourceDescription, RouterConfig, SharedState,
    Signifier, SignifierExposure, SituationalContextValidator, Term, Triple,
};

const LAMP: &str = "https://example.org/lamp";
const ALICE: &str = "https://example.org/agents/alice";
const ROOM: &str = "https://example.org/room";
const HUB: &str = "https://hub.example.org/";

const TOGGLE: &str = "https://example.org/sig/toggle";
const DIM: &str = "https://example.org/sig/dim";
const DOUSE: &str = "https://example.org/sig/douse";

fn lamp_on() -> Context {
    Context::new(
        vec![
            Triple::new(Term::blank("s"), vocab::shacl::PATH, Term::iri(vocab::HAS_BELIEF)),
            Triple::new(Term::blank("s"), vocab::shacl::HAS_VALUE, Term::literal("lampOn")),
        ]
        .into(),
    )
}

fn toggle(action_types: &[&str]) -> Signifier {
    Signifier::new(TOGGLE, action_types.iter().copied())
        .with_ability(Ability::new(["https://example.org/Pyromancy"]))
        .with_context(lamp_on())
}

fn lamp(signifiers: Vec<Signifier>) -> ResourceDescription {
    ResourceDescription::ResourceProfile(ResourceProfile {
        resource_iri: Some(LAMP.to_string()),
        resource_kind: ResourceKind::Artifact,
        signifiers,
        abilities: Vec::new(),
    })
}

fn alice() -> ResourceDescription {
    ResourceDescription::ResourceProfile(ResourceProfile {
        resource_iri: Some(ALICE.to_string()),
        resource_kind: ResourceKind::Agent,
        signifiers: Vec::new(),
        abilities: vec![Ability::new([vocab::interaction::ABILITY, "https://example.org/Pyromancy"])],
    })
}

/// Signifier IRIs seen until the exposure reports `exposureState("done")`.
fn signifiers_until_done(stream: &ExposureStream) -> Vec<String> {
    let mut seen = Vec::new();
    loop {
        let event = stream.recv_timeout(Duration::from_secs(2)).expect("exposure event");
        match event.deciding_property() {
            Some(ObsProperty::Signifier(p)) => seen.push(p.iri.clone()),
            Some(ObsProperty::Plain { name, values }) if name == "exposureState" && values == &["done"] => {
                return seen;
            }
            _ => {}
        }
    }
}

#[test]
fn pushed_profiles_are_filtered_by_abilities_and_situation() {
    let source = Arc::new(JsonProfileSource::new());
    source
        .insert(LAMP, lamp(vec![toggle(&["https://example.org/ToggleCommand"])]))
        .unwrap();
    source.insert(ALICE, alice()).unwrap();

    let state = SharedState::new();
    state.register_namespace("ex", "https://example.org/").unwrap();

    let router = NotificationRouter::start(
        RouterConfig {
            poll_interval: Duration::from_millis(5),
            ..RouterConfig::default()
        },
        state.clone(),
        Arc::new(NoopSubscribeSender),
    )
    .unwrap();

    let exposure = Arc::new(
        SignifierExposure::open(
            LAMP,
            state.clone(),
            source.clone(),
            ExposureOptions {
                interaction_guidance: true,
                ..ExposureOptions::default()
            },
        )
        .unwrap(),
    );
    let recommendations = Arc::new(RecommendationRegistry::new(
        state.clone(),
        source.clone(),
        SituationalContextValidator::default(),
    ));

    router
        .register_for_topic(LAMP, HUB, HandshakeMode::WebSub, exposure.clone())
        .unwrap();
    router
        .register_for_topic(ROOM, HUB, HandshakeMode::WebSub, recommendations.clone())
        .unwrap();

    let filter = recommendations.add_recommendation_context("alice", LAMP, ALICE).unwrap();
    let stream = exposure.subscribe(Arc::new(filter)).unwrap();

    // The lamp is off: the changed toggle is dropped, the Hydromancy one is
    // not complementary and only the unconstrained dim signifier passes.
    let v2 = lamp(vec![
        toggle(&["https://example.org/ToggleCommand", "https://example.org/SwitchCommand"]),
        Signifier::new(DIM, ["https://example.org/DimCommand"])
            .with_ability(Ability::new(["https://example.org/Pyromancy"])),
        Signifier::new(DOUSE, ["https://example.org/DouseCommand"])
            .with_ability(Ability::new(["https://example.org/Hydromancy"])),
    ]);
    router
        .deliver(Notification::new(LAMP, serde_json::to_string(&v2).unwrap(), "text/turtle"))
        .unwrap();
    assert_eq!(signifiers_until_done(&stream), vec![DIM.to_string()]);

    // The room reports the lamp as on.
    let situation: Graph = vec![belief(Term::iri(ALICE), "lampOn")].into();
    router
        .deliver(Notification::new(ROOM, serde_json::to_string(&situation).unwrap(), "text/turtle"))
        .unwrap();

    let v3 = lamp(vec![
        toggle(&["https://example.org/ToggleCommand"]),
        Signifier::new(DIM, ["https://example.org/DimCommand"])
            .with_ability(Ability::new(["https://example.org/Pyromancy"])),
    ]);
    router
        .deliver(Notification::new(LAMP, serde_json::to_string(&v3).unwrap(), "text/turtle"))
        .unwrap();

    // Toggle changed and is now admitted; douse removal is still not complementary.
    assert_eq!(signifiers_until_done(&stream), vec![TOGGLE.to_string()]);

    router.stop().unwrap();
}

#[test]
fn property_updates_reach_every_subscriber() {
    let source = Arc::new(JsonProfileSource::new());
    source.insert(LAMP, lamp(Vec::new())).unwrap();
    let state = SharedState::new();

    let router = NotificationRouter::start(
        RouterConfig {
            poll_interval: Duration::from_millis(5),
            ..RouterConfig::default()
        },
        state.clone(),
        Arc::new(NoopSubscribeSender),
    )
    .unwrap();
    let exposure = Arc::new(SignifierExposure::open(LAMP, state, source, ExposureOptions::default()).unwrap());
    router
        .register_for_topic(LAMP, HUB, HandshakeMode::WebSub, exposure.clone())
        .unwrap();

    let a = exposure.subscribe(Arc::new(hypersig::AcceptAll)).unwrap();
    let b = exposure.subscribe(Arc::new(hypersig::AcceptAll)).unwrap();

    router
        .deliver(Notification::new(LAMP, "state(on)", "application/json"))
        .unwrap();

    for stream in [&a, &b] {
        let event = stream.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.added, vec![ObsProperty::plain("state", ["on"])]);
    }

    // A malformed update is rejected by the consumer and logged by the router.
    router
        .deliver(Notification::new(LAMP, "not a literal", "application/json"))
        .unwrap();
    router
        .deliver(Notification::new(LAMP, "state(off)", "application/json"))
        .unwrap();
    let event = a.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(event.changed, vec![ObsProperty::plain("state", ["off"])]);

    let snapshot = router.stop().unwrap();
    assert_eq!(snapshot.failed, 1);
}
